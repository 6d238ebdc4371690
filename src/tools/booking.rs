use chrono::{NaiveDate, Timelike};
use duckdb::Connection;
use tracing::warn;

use crate::db::{is_bookable_hour, slot_start, BookingError, BookingService};
use crate::tools::args::BookSlotArgs;
use crate::tools::INVALID_DATE;

pub const INVALID_HOUR: &str = "Invalid hour. Please choose between 9 AM (9) and 4 PM (16).";

/// Reserves one slot; every outcome, including storage failure, is reported as text.
pub fn book_slot(conn: &Connection, args: &BookSlotArgs) -> String {
    if !is_bookable_hour(args.hour) {
        return INVALID_HOUR.to_string();
    }

    let user_name = args.user_name.trim();
    if user_name.is_empty() {
        return "Missing user name. Please ask who the booking is for.".to_string();
    }

    let date_str = args.date.trim();
    let target_date = match NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return INVALID_DATE.to_string(),
    };

    let hour = args.hour as u32;
    let Some(start_time) = slot_start(target_date, hour) else {
        return INVALID_HOUR.to_string();
    };

    match BookingService::reserve(conn, user_name, start_time) {
        Ok(booking) => format!(
            "Booking confirmed! Confirmation ID: {}. {} booked from {}:00 to {}:00 on {}.",
            booking.id,
            booking.user_name,
            hour,
            hour + 1,
            date_str
        ),
        Err(BookingError::Conflict(existing)) => format!(
            "Time slot conflicts with existing booking at {:02}:{:02}.",
            existing.hour(),
            existing.minute()
        ),
        Err(e) => {
            warn!("Booking {} at {} failed: {}", user_name, start_time, e);
            format!("Error booking slot: {}", e)
        }
    }
}
