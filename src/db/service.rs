use crate::db::models::Booking;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use duckdb::{params, Connection, Result as DbResult, Row};
use thiserror::Error;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("slot starting at {0} is already booked")]
    Conflict(NaiveDateTime),
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

pub struct BookingService;

impl BookingService {
    fn row_to_booking(row: &Row) -> DbResult<Booking> {
        // Timestamps are selected AS VARCHAR; DuckDB's native timestamp type needs a driver feature we don't enable.
        let start_str: String = row.get(2)?;
        let created_str: String = row.get(3)?;

        Ok(Booking {
            id: row.get(0)?,
            user_name: row.get(1)?,
            start_time: parse_timestamp(&start_str).unwrap_or_default(),
            created_at: parse_timestamp(&created_str).unwrap_or_default(),
        })
    }

    /// Bookings with `from <= start_time < to`, earliest first.
    pub fn bookings_between(
        conn: &Connection,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<Vec<Booking>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_name, CAST(start_time AS VARCHAR), CAST(created_at AS VARCHAR)
             FROM bookings
             WHERE start_time >= CAST(? AS TIMESTAMP) AND start_time < CAST(? AS TIMESTAMP)
             ORDER BY start_time ASC",
        )?;
        let rows = stmt.query_map(
            params![format_timestamp(from), format_timestamp(to)],
            Self::row_to_booking,
        )?;

        let mut bookings = Vec::new();
        for row in rows {
            bookings.push(row?);
        }
        Ok(bookings)
    }

    pub fn bookings_on(conn: &Connection, date: NaiveDate) -> DbResult<Vec<Booking>> {
        let start = date.and_time(NaiveTime::MIN);
        let end = start + chrono::Duration::days(1);
        Self::bookings_between(conn, start, end)
    }

    pub fn find_by_start(conn: &Connection, start_time: NaiveDateTime) -> DbResult<Option<Booking>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_name, CAST(start_time AS VARCHAR), CAST(created_at AS VARCHAR)
             FROM bookings
             WHERE start_time = CAST(? AS TIMESTAMP)",
        )?;
        let mut rows = stmt.query_map(params![format_timestamp(start_time)], Self::row_to_booking)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Inserts a booking unless one already starts at `start_time`.
    ///
    /// The exact-match lookup and the insert run in one transaction; the
    /// `UNIQUE(start_time)` constraint backs the lookup up, so a duplicate
    /// surfaces as [`BookingError::Conflict`] either way and the transaction
    /// is rolled back.
    pub fn reserve(
        conn: &Connection,
        user_name: &str,
        start_time: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        Self::in_transaction(conn, |conn| Self::insert_if_free(conn, user_name, start_time))
    }

    /// Runs `body` between `BEGIN` and `COMMIT`. Any error after `BEGIN`,
    /// including a failed `COMMIT`, rolls back so the shared connection never
    /// stays inside a transaction.
    fn in_transaction<T>(
        conn: &Connection,
        body: impl FnOnce(&Connection) -> Result<T, BookingError>,
    ) -> Result<T, BookingError> {
        conn.execute("BEGIN TRANSACTION", [])?;

        let result = body(conn).and_then(|value| {
            conn.execute("COMMIT", [])?;
            Ok(value)
        });

        if result.is_err() {
            if let Err(e) = conn.execute("ROLLBACK", []) {
                warn!("Rollback after failed booking transaction also failed: {}", e);
            }
        }
        result
    }

    fn insert_if_free(
        conn: &Connection,
        user_name: &str,
        start_time: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        if let Some(existing) = Self::find_by_start(conn, start_time)? {
            return Err(BookingError::Conflict(existing.start_time));
        }

        let created_at = Local::now().naive_local();
        let inserted = conn.query_row(
            "INSERT INTO bookings (user_name, start_time, created_at)
             VALUES (?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
             RETURNING id",
            params![user_name, format_timestamp(start_time), format_timestamp(created_at)],
            |row| row.get::<_, i64>(0),
        );

        match inserted {
            Ok(id) => Ok(Booking {
                id,
                user_name: user_name.to_string(),
                start_time,
                created_at,
            }),
            Err(e) if is_constraint_violation(&e) => Err(BookingError::Conflict(start_time)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count(conn: &Connection) -> DbResult<i64> {
        conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))
    }
}

fn is_constraint_violation(err: &duckdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("Constraint Error") || msg.contains("Duplicate key")
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duckdb_timestamp_text() {
        let plain = parse_timestamp("2026-01-20 09:00:00").unwrap();
        assert_eq!(format_timestamp(plain), "2026-01-20 09:00:00");

        let fractional = parse_timestamp("2026-01-20 09:00:00.123456").unwrap();
        assert_eq!(format_timestamp(fractional), "2026-01-20 09:00:00");

        assert!(parse_timestamp("yesterday").is_none());
    }

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::connection::init_schema(&conn).unwrap();
        conn
    }

    fn slot(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 20).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    #[test]
    fn failure_after_begin_rolls_back_and_frees_the_connection() {
        let conn = memory_conn();

        let failed = BookingService::in_transaction(&conn, |conn| {
            BookingService::insert_if_free(conn, "Ana", slot(9))?;
            conn.execute("SELECT * FROM no_such_table", [])?;
            Ok(())
        });
        assert!(matches!(failed, Err(BookingError::Database(_))));
        assert_eq!(BookingService::count(&conn).unwrap(), 0);

        let booking = BookingService::reserve(&conn, "Ana", slot(9)).unwrap();
        assert_eq!(booking.start_time, slot(9));
        assert_eq!(BookingService::count(&conn).unwrap(), 1);
    }

    #[test]
    fn conflict_leaves_no_open_transaction() {
        let conn = memory_conn();
        BookingService::reserve(&conn, "Ana", slot(10)).unwrap();

        let clash = BookingService::reserve(&conn, "Ben", slot(10));
        assert!(matches!(clash, Err(BookingError::Conflict(t)) if t == slot(10)));

        BookingService::reserve(&conn, "Ben", slot(11)).unwrap();
        assert_eq!(BookingService::count(&conn).unwrap(), 2);
    }
}
