use chrono::NaiveDate;
use duckdb::Connection;
use std::collections::HashSet;

use crate::db::{slot_hours, BookingService};
use crate::tools::args::CheckAvailabilityArgs;
use crate::tools::INVALID_DATE;

/// Free one-hour slots on the requested date, as text for the model.
pub fn check_availability(conn: &Connection, args: &CheckAvailabilityArgs) -> String {
    let date_str = args.date.trim();
    let target_date = match NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return INVALID_DATE.to_string(),
    };

    let bookings = match BookingService::bookings_on(conn, target_date) {
        Ok(b) => b,
        Err(e) => return format!("Error checking availability: {}", e),
    };

    let booked_hours: HashSet<u32> = bookings.iter().map(|b| b.hour()).collect();
    let available: Vec<String> = slot_hours()
        .filter(|h| !booked_hours.contains(h))
        .map(|h| format!("{}:00-{}:00", h, h + 1))
        .collect();

    if available.is_empty() {
        return format!(
            "No slots available on {}. All hours from 9 AM to 5 PM are booked.",
            date_str
        );
    }

    format!("Available slots on {}: {}", date_str, available.join(", "))
}
