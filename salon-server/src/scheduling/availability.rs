//! Slot availability projection
//!
//! Combines working hours with the day's stored bookings into the per-chair
//! slot grid clients render. The projection is derived on every query and
//! never persisted, so a pending appointment that lapsed a second ago is
//! already reported as free without waiting for the expiry sweep.
//!
//! A slot is booked when any Pending, Approved or Completed appointment
//! overlaps it; Cancelled, Rejected and lapsed bookings release their block.
//! A slot is past once its end is not after the current time.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;

use super::grid;
use crate::appointments::{AppointmentsManager, reducer};
use crate::catalog::CatalogService;
use crate::utils::{AppError, AppResult, time};
use shared::appointment::AppointmentSnapshot;
use shared::models::{Chair, ChairDay, DayCell, Slot, WorkingHours};

/// Build one chair's slot projection for one day
///
/// Pure: all inputs including the clock come from the caller.
pub fn build_chair_day(
    chair: &Chair,
    date: NaiveDate,
    hours: Option<&WorkingHours>,
    bookings: &[AppointmentSnapshot],
    now_millis: i64,
    tz: Tz,
) -> AppResult<ChairDay> {
    let date_str = date.format("%Y-%m-%d").to_string();

    let slots = match hours {
        Some(h) if !h.is_closed => {
            let open = time::parse_hhmm(&h.open_time)?;
            let close = time::parse_hhmm(&h.close_time)?;
            let blocked: Vec<(i64, i64)> = bookings
                .iter()
                .filter(|b| reducer::blocks_slots_at(b, now_millis))
                .map(|b| (b.scheduled_start_at, b.scheduled_end_at))
                .collect();

            grid::partition_slots(open, close)?
                .into_iter()
                .map(|(start, end)| {
                    let start_at = time::date_time_to_millis(date, start, tz);
                    let end_at = time::date_time_to_millis(date, end, tz);
                    let start_label = time::format_hhmm(start);
                    Slot {
                        slot_id: format!("{}:{}:{}", chair.id, date_str, start_label),
                        start: start_label,
                        end: time::format_hhmm(end),
                        is_booked: blocked.iter().any(|(s, e)| *s < end_at && start_at < *e),
                        is_past: end_at <= now_millis,
                    }
                })
                .collect()
        }
        // Closed or no record for this weekday: the day renders with no slots
        _ => Vec::new(),
    };

    Ok(ChairDay {
        chair_id: chair.id.clone(),
        chair_name: chair.name.clone(),
        provider_id: chair.provider_id.clone(),
        date: date_str,
        slots,
    })
}

/// Availability resolver over the catalog and stored bookings
#[derive(Clone)]
pub struct SlotAvailabilityResolver {
    catalog: Arc<CatalogService>,
    manager: Arc<AppointmentsManager>,
    tz: Tz,
}

impl SlotAvailabilityResolver {
    pub fn new(catalog: Arc<CatalogService>, manager: Arc<AppointmentsManager>, tz: Tz) -> Self {
        Self {
            catalog,
            manager,
            tz,
        }
    }

    /// Rolling 7-day calendar starting today (business timezone)
    pub fn calendar(&self) -> Vec<DayCell> {
        grid::rolling_week(time::today_in_tz(self.tz))
    }

    /// One chair's slot grid for one date
    pub fn resolve_day(&self, chair_id: &str, date: &str) -> AppResult<ChairDay> {
        let chair = self
            .catalog
            .get_chair(chair_id)
            .ok_or_else(|| AppError::not_found(format!("Unknown chair: {}", chair_id)))?;
        self.project(&chair, time::parse_date(date)?)
    }

    /// Slot grids of every active chair for one date
    pub fn resolve_all(&self, date: &str) -> AppResult<Vec<ChairDay>> {
        let parsed = time::parse_date(date)?;
        self.catalog
            .list_active_chairs()
            .iter()
            .map(|chair| self.project(chair, parsed))
            .collect()
    }

    fn project(&self, chair: &Chair, date: NaiveDate) -> AppResult<ChairDay> {
        let hours = self
            .catalog
            .hours_for_weekday(&chair.id, time::weekday_of(date))?;
        let date_str = date.format("%Y-%m-%d").to_string();
        let bookings = self.manager.storage().get_day_bookings(&chair.id, &date_str)?;
        build_chair_day(
            chair,
            date,
            hours.as_ref(),
            &bookings,
            shared::util::now_millis(),
            self.tz,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::AppointmentStorage;
    use chrono::NaiveTime;
    use shared::appointment::AppointmentStatus;
    use shared::models::PricingMode;

    fn d(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
    }

    fn millis(date: &str, hhmm: &str) -> i64 {
        let t = NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap();
        time::date_time_to_millis(d(date), t, chrono_tz::UTC)
    }

    fn test_chair() -> Chair {
        Chair {
            id: "chair-1".to_string(),
            name: "Window Chair".to_string(),
            store_id: Some("store-1".to_string()),
            provider_id: Some("provider-1".to_string()),
            pricing_mode: PricingMode::Rent,
            pricing_value: 50.0,
            is_active: true,
        }
    }

    fn monday_hours() -> WorkingHours {
        WorkingHours {
            chair_id: "chair-1".to_string(),
            day_of_week: 1,
            open_time: "09:00".to_string(),
            close_time: "17:00".to_string(),
            is_closed: false,
        }
    }

    fn booking(id: &str, date: &str, start: &str, end: &str, status: AppointmentStatus) -> AppointmentSnapshot {
        let mut snapshot = AppointmentSnapshot::new(id.to_string());
        snapshot.chair_id = Some("chair-1".to_string());
        snapshot.date = date.to_string();
        snapshot.start_time = start.to_string();
        snapshot.end_time = end.to_string();
        snapshot.scheduled_start_at = millis(date, start);
        snapshot.scheduled_end_at = millis(date, end);
        snapshot.status = status;
        // keep stored Pending bookings current unless a test overrides
        snapshot.pending_expires_at = millis(date, end) + 86_400_000;
        snapshot
    }

    // 2025-06-02 is a Monday; noon the day before as "now"
    const DATE: &str = "2025-06-02";

    fn day_before_noon() -> i64 {
        millis("2025-06-01", "12:00")
    }

    #[test]
    fn test_closed_day_has_no_slots() {
        let day = build_chair_day(
            &test_chair(),
            d(DATE),
            None,
            &[],
            day_before_noon(),
            chrono_tz::UTC,
        )
        .unwrap();
        assert_eq!(day.date, DATE);
        assert!(day.slots.is_empty());
    }

    #[test]
    fn test_open_day_partitions_hours() {
        let day = build_chair_day(
            &test_chair(),
            d(DATE),
            Some(&monday_hours()),
            &[],
            day_before_noon(),
            chrono_tz::UTC,
        )
        .unwrap();

        assert_eq!(day.slots.len(), 8);
        let first = &day.slots[0];
        assert_eq!(first.slot_id, "chair-1:2025-06-02:09:00");
        assert_eq!(first.start, "09:00");
        assert_eq!(first.end, "10:00");
        assert!(!first.is_booked);
        assert!(!first.is_past);
        assert_eq!(day.slots[7].start, "16:00");
    }

    #[test]
    fn test_booked_slots_flagged() {
        let bookings = vec![booking("a1", DATE, "10:00", "12:00", AppointmentStatus::Approved)];
        let day = build_chair_day(
            &test_chair(),
            d(DATE),
            Some(&monday_hours()),
            &bookings,
            day_before_noon(),
            chrono_tz::UTC,
        )
        .unwrap();

        let booked: Vec<&str> = day
            .slots
            .iter()
            .filter(|s| s.is_booked)
            .map(|s| s.start.as_str())
            .collect();
        assert_eq!(booked, vec!["10:00", "11:00"]);
    }

    #[test]
    fn test_pending_blocks_but_cancelled_does_not() {
        let bookings = vec![
            booking("a1", DATE, "09:00", "10:00", AppointmentStatus::Pending),
            booking("a2", DATE, "10:00", "11:00", AppointmentStatus::Cancelled),
            booking("a3", DATE, "11:00", "12:00", AppointmentStatus::Rejected),
        ];
        let day = build_chair_day(
            &test_chair(),
            d(DATE),
            Some(&monday_hours()),
            &bookings,
            day_before_noon(),
            chrono_tz::UTC,
        )
        .unwrap();

        assert!(day.slots[0].is_booked);
        assert!(!day.slots[1].is_booked);
        assert!(!day.slots[2].is_booked);
    }

    #[test]
    fn test_lapsed_pending_releases_slot() {
        let mut lapsed = booking("a1", DATE, "10:00", "11:00", AppointmentStatus::Pending);
        lapsed.pending_expires_at = day_before_noon() - 1;
        let day = build_chair_day(
            &test_chair(),
            d(DATE),
            Some(&monday_hours()),
            &[lapsed],
            day_before_noon(),
            chrono_tz::UTC,
        )
        .unwrap();

        assert!(day.slots.iter().all(|s| !s.is_booked));
    }

    #[test]
    fn test_past_flag_at_slot_boundaries() {
        // now = 10:00 on the day itself: the 09:00 slot just ended
        let now = millis(DATE, "10:00");
        let day = build_chair_day(
            &test_chair(),
            d(DATE),
            Some(&monday_hours()),
            &[],
            now,
            chrono_tz::UTC,
        )
        .unwrap();

        assert!(day.slots[0].is_past);
        // 10:00 slot is underway, not past until it ends
        assert!(!day.slots[1].is_past);
    }

    #[test]
    fn test_resolver_merges_catalog_and_bookings() {
        let catalog = Arc::new(CatalogService::new());
        catalog.upsert_chair(test_chair());
        catalog.set_working_hours("chair-1", vec![monday_hours()]);

        let storage = AppointmentStorage::open_in_memory().unwrap();
        let booked = booking("a1", DATE, "14:00", "15:00", AppointmentStatus::Approved);
        let txn = storage.begin_write().unwrap();
        storage.store_snapshot(&txn, &booked).unwrap();
        storage
            .index_day_booking(&txn, "chair-1", DATE, "a1")
            .unwrap();
        txn.commit().unwrap();

        let manager = Arc::new(AppointmentsManager::with_storage(storage));
        let resolver = SlotAvailabilityResolver::new(catalog, manager, chrono_tz::UTC);

        let day = resolver.resolve_day("chair-1", DATE).unwrap();
        assert_eq!(day.slots.len(), 8);
        let booked_starts: Vec<&str> = day
            .slots
            .iter()
            .filter(|s| s.is_booked)
            .map(|s| s.start.as_str())
            .collect();
        assert_eq!(booked_starts, vec!["14:00"]);

        let all = resolver.resolve_all(DATE).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].chair_id, "chair-1");
    }

    #[test]
    fn test_resolver_unknown_chair() {
        let catalog = Arc::new(CatalogService::new());
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let manager = Arc::new(AppointmentsManager::with_storage(storage));
        let resolver = SlotAvailabilityResolver::new(catalog, manager, chrono_tz::UTC);

        let result = resolver.resolve_day("chair-9", DATE);
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_resolver_calendar_is_rolling_week() {
        let catalog = Arc::new(CatalogService::new());
        let storage = AppointmentStorage::open_in_memory().unwrap();
        let manager = Arc::new(AppointmentsManager::with_storage(storage));
        let resolver = SlotAvailabilityResolver::new(catalog, manager, chrono_tz::UTC);

        let week = resolver.calendar();
        assert_eq!(week.len(), 7);
        assert!(week[0].is_today);
    }
}
