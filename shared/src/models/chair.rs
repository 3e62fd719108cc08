//! Chair model (理发椅/工位)
//!
//! A chair is the bookable resource appointments are assigned to. It is
//! owned by a store, by an independent provider, or by both (a store chair
//! with a resident provider).

use serde::{Deserialize, Serialize};

use super::offering::PricingMode;

/// Chair entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chair {
    pub id: String,
    pub name: String,
    /// Owning store, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    /// Resident provider bound to this chair, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// How bookings on this chair are priced
    pub pricing_mode: PricingMode,
    /// Hourly rent (RENT mode) or percentage of service prices (PERCENT mode)
    pub pricing_value: f64,
    pub is_active: bool,
}

impl Chair {
    /// Whether the store side has a say in appointments on this chair
    pub fn store_responsible(&self) -> bool {
        self.store_id.is_some()
    }

    /// Whether the provider side has a say in appointments on this chair
    pub fn provider_responsible(&self) -> bool {
        self.provider_id.is_some()
    }
}

/// Create chair payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChairCreate {
    pub name: String,
    pub store_id: Option<String>,
    pub provider_id: Option<String>,
    pub pricing_mode: PricingMode,
    pub pricing_value: f64,
}

/// Update chair payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChairUpdate {
    pub name: Option<String>,
    pub provider_id: Option<String>,
    pub pricing_mode: Option<PricingMode>,
    pub pricing_value: Option<f64>,
    pub is_active: Option<bool>,
}
