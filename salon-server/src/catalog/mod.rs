//! Catalog Service - chairs, working hours and service offerings
//!
//! In-memory registry with read-mostly access. The catalog is bootstrapped
//! from a seed file in the work dir and mutated through upserts; every
//! mutation bumps the corresponding resource version so connected clients
//! get a sync signal.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::utils::{AppError, AppResult, time};
use shared::models::{Chair, ServiceOffering, WorkingHours};

/// Seed file content (`<work_dir>/catalog.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub chairs: Vec<Chair>,
    #[serde(default)]
    pub working_hours: Vec<WorkingHours>,
    #[serde(default)]
    pub offerings: Vec<ServiceOffering>,
}

/// Unified catalog service
#[derive(Clone)]
pub struct CatalogService {
    /// Chairs cache: chair id -> Chair
    chairs: Arc<RwLock<HashMap<String, Chair>>>,
    /// Working hours per chair, as supplied upstream (uncanonicalized)
    working_hours: Arc<RwLock<HashMap<String, Vec<WorkingHours>>>>,
    /// Offerings cache: offering id -> ServiceOffering
    offerings: Arc<RwLock<HashMap<String, ServiceOffering>>>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("chairs", &self.chairs.read().len())
            .field("offerings", &self.offerings.read().len())
            .finish()
    }
}

impl Default for CatalogService {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogService {
    pub fn new() -> Self {
        Self {
            chairs: Arc::new(RwLock::new(HashMap::new())),
            working_hours: Arc::new(RwLock::new(HashMap::new())),
            offerings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load a seed into the caches, replacing previous content
    pub fn load_seed(&self, seed: CatalogSeed) {
        let mut chairs = self.chairs.write();
        chairs.clear();
        for chair in seed.chairs {
            chairs.insert(chair.id.clone(), chair);
        }

        let mut hours = self.working_hours.write();
        hours.clear();
        for record in seed.working_hours {
            hours.entry(record.chair_id.clone()).or_default().push(record);
        }

        let mut offerings = self.offerings.write();
        offerings.clear();
        for offering in seed.offerings {
            offerings.insert(offering.id.clone(), offering);
        }
    }

    /// Load the seed file if it exists; missing file is an empty catalog
    pub fn load_seed_file(&self, path: &std::path::Path) -> AppResult<()> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No catalog seed file, starting empty");
            return Ok(());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::internal(format!("Failed to read catalog seed: {e}")))?;
        let seed: CatalogSeed = serde_json::from_str(&raw)?;
        tracing::info!(
            chairs = seed.chairs.len(),
            working_hours = seed.working_hours.len(),
            offerings = seed.offerings.len(),
            "Loaded catalog seed"
        );
        self.load_seed(seed);
        Ok(())
    }

    // ========== Chairs ==========

    pub fn upsert_chair(&self, chair: Chair) {
        self.chairs.write().insert(chair.id.clone(), chair);
    }

    pub fn get_chair(&self, id: &str) -> Option<Chair> {
        self.chairs.read().get(id).cloned()
    }

    pub fn list_active_chairs(&self) -> Vec<Chair> {
        let mut chairs: Vec<Chair> = self
            .chairs
            .read()
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        chairs.sort_by(|a, b| a.name.cmp(&b.name));
        chairs
    }

    // ========== Working hours ==========

    /// Replace the working-hour records for one chair
    pub fn set_working_hours(&self, chair_id: &str, records: Vec<WorkingHours>) {
        self.working_hours
            .write()
            .insert(chair_id.to_string(), records);
    }

    /// The working-hour record for one canonical weekday (0 = Sunday).
    ///
    /// Records are canonicalized on lookup; the same weekday appearing
    /// twice after canonicalization (e.g. both 0 and 7 for Sunday) means
    /// the upstream data mixes conventions and is rejected, never merged.
    /// `Ok(None)` means no record: the chair is closed that day.
    pub fn hours_for_weekday(
        &self,
        chair_id: &str,
        weekday: u8,
    ) -> AppResult<Option<WorkingHours>> {
        let guard = self.working_hours.read();
        let Some(records) = guard.get(chair_id) else {
            return Ok(None);
        };

        let mut by_day: HashMap<u8, &WorkingHours> = HashMap::new();
        for record in records {
            let day = time::canonical_weekday(record.day_of_week)?;
            if by_day.insert(day, record).is_some() {
                return Err(AppError::validation(format!(
                    "Chair {chair_id} has duplicate working hours for weekday {day} \
                     (ambiguous day-of-week convention)"
                )));
            }
        }

        Ok(by_day.get(&weekday).map(|r| (*r).clone()))
    }

    // ========== Offerings ==========

    pub fn upsert_offering(&self, offering: ServiceOffering) {
        self.offerings.write().insert(offering.id.clone(), offering);
    }

    pub fn list_active_offerings(&self) -> Vec<ServiceOffering> {
        let mut offerings: Vec<ServiceOffering> = self
            .offerings
            .read()
            .values()
            .filter(|o| o.is_active)
            .cloned()
            .collect();
        offerings.sort_by(|a, b| a.name.cmp(&b.name));
        offerings
    }

    /// Resolve a set of offering ids, failing on any unknown id
    pub fn offerings_by_ids(&self, ids: &[String]) -> AppResult<Vec<ServiceOffering>> {
        let guard = self.offerings.read();
        ids.iter()
            .map(|id| {
                guard
                    .get(id)
                    .cloned()
                    .ok_or_else(|| AppError::not_found(format!("Service offering {id}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::PricingMode;

    fn chair(id: &str) -> Chair {
        Chair {
            id: id.to_string(),
            name: format!("Chair {id}"),
            store_id: Some("store-1".to_string()),
            provider_id: None,
            pricing_mode: PricingMode::Rent,
            pricing_value: 50.0,
            is_active: true,
        }
    }

    fn hours(chair_id: &str, day: u8, open: &str, close: &str) -> WorkingHours {
        WorkingHours {
            chair_id: chair_id.to_string(),
            day_of_week: day,
            open_time: open.to_string(),
            close_time: close.to_string(),
            is_closed: false,
        }
    }

    #[test]
    fn test_hours_lookup_zero_based() {
        let catalog = CatalogService::new();
        catalog.upsert_chair(chair("c1"));
        catalog.set_working_hours("c1", vec![hours("c1", 0, "10:00", "14:00")]);

        let sunday = catalog.hours_for_weekday("c1", 0).unwrap().unwrap();
        assert_eq!(sunday.open_time, "10:00");
    }

    #[test]
    fn test_hours_lookup_iso_sunday() {
        let catalog = CatalogService::new();
        catalog.set_working_hours("c1", vec![hours("c1", 7, "10:00", "14:00")]);

        // ISO 7 canonicalizes to 0
        let sunday = catalog.hours_for_weekday("c1", 0).unwrap().unwrap();
        assert_eq!(sunday.open_time, "10:00");
    }

    #[test]
    fn test_missing_day_means_closed_not_error() {
        let catalog = CatalogService::new();
        catalog.set_working_hours("c1", vec![hours("c1", 1, "09:00", "17:00")]);

        assert!(catalog.hours_for_weekday("c1", 2).unwrap().is_none());
        // unknown chair is also just closed
        assert!(catalog.hours_for_weekday("nope", 1).unwrap().is_none());
    }

    #[test]
    fn test_mixed_conventions_for_same_day_rejected() {
        let catalog = CatalogService::new();
        catalog.set_working_hours(
            "c1",
            vec![
                hours("c1", 0, "10:00", "14:00"),
                hours("c1", 7, "12:00", "18:00"),
            ],
        );

        let err = catalog.hours_for_weekday("c1", 0).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_invalid_weekday_index_rejected() {
        let catalog = CatalogService::new();
        catalog.set_working_hours("c1", vec![hours("c1", 9, "10:00", "14:00")]);

        assert!(catalog.hours_for_weekday("c1", 1).is_err());
    }

    #[test]
    fn test_offerings_by_ids_fails_on_unknown() {
        let catalog = CatalogService::new();
        catalog.upsert_offering(ServiceOffering {
            id: "cut".to_string(),
            name: "Haircut".to_string(),
            owner_id: "store-1".to_string(),
            price: 25.0,
            duration_minutes: Some(60),
            is_active: true,
        });

        assert_eq!(
            catalog.offerings_by_ids(&["cut".to_string()]).unwrap().len(),
            1
        );
        assert!(
            catalog
                .offerings_by_ids(&["cut".to_string(), "dye".to_string()])
                .is_err()
        );
    }
}
