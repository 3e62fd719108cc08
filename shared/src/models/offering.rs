//! Service offering model

use serde::{Deserialize, Serialize};

/// Pricing mode for a chair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingMode {
    /// 按小时租用 - flat hourly rent, total = value x slot count
    #[default]
    Rent,
    /// 按服务抽成 - percentage of the selected services' prices
    Percent,
}

impl std::fmt::Display for PricingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingMode::Rent => write!(f, "RENT"),
            PricingMode::Percent => write!(f, "PERCENT"),
        }
    }
}

/// Service offering entity (a bookable service with a price)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    pub name: String,
    /// Store or provider that owns this offering
    pub owner_id: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub is_active: bool,
}

/// Create offering payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOfferingCreate {
    pub name: String,
    pub owner_id: String,
    pub price: f64,
    pub duration_minutes: Option<u32>,
}
