use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// First bookable start hour.
pub const OPENING_HOUR: u32 = 9;
/// Last bookable start hour; the slot ends at 17:00.
pub const LAST_START_HOUR: u32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_name: String,
    pub start_time: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl Booking {
    pub fn hour(&self) -> u32 {
        self.start_time.hour()
    }
}

/// Every start hour a slot may begin at, in order.
pub fn slot_hours() -> impl Iterator<Item = u32> {
    OPENING_HOUR..=LAST_START_HOUR
}

pub fn is_bookable_hour(hour: i64) -> bool {
    (OPENING_HOUR as i64..=LAST_START_HOUR as i64).contains(&hour)
}

/// Exact start timestamp of the slot beginning at `hour` on `date`.
pub fn slot_start(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    NaiveTime::from_hms_opt(hour, 0, 0).map(|t| date.and_time(t))
}
