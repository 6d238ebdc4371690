use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckAvailabilityArgs {
    #[serde(alias = "date_str")]
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookSlotArgs {
    pub user_name: String,
    #[serde(alias = "date_str")]
    pub date: String,
    #[serde(deserialize_with = "lenient_hour")]
    pub hour: i64,
}

/// Models are loose with integer arguments: accept `10`, `10.0` and `"10"`.
fn lenient_hour<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(de::Error::custom(format!("hour must be a whole number, got {}", n))),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("hour must be a whole number, got {:?}", s))),
        other => Err(de::Error::custom(format!("hour must be a whole number, got {}", other))),
    }
}

/// Parses a model-supplied JSON argument string. Some providers send an
/// empty string for tools without arguments.
pub fn parse_args<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, serde_json::Error> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_accepts_integers_floats_and_strings() {
        for raw in [
            r#"{"user_name":"Ana","date":"2026-01-20","hour":10}"#,
            r#"{"user_name":"Ana","date":"2026-01-20","hour":10.0}"#,
            r#"{"user_name":"Ana","date_str":"2026-01-20","hour":" 10 "}"#,
        ] {
            let args: BookSlotArgs = parse_args(raw).unwrap();
            assert_eq!(args.hour, 10);
            assert_eq!(args.date, "2026-01-20");
        }
    }

    #[test]
    fn fractional_or_missing_hour_is_rejected() {
        assert!(parse_args::<BookSlotArgs>(r#"{"user_name":"Ana","date":"2026-01-20","hour":9.5}"#).is_err());
        assert!(parse_args::<BookSlotArgs>(r#"{"user_name":"Ana","date":"2026-01-20"}"#).is_err());
        assert!(parse_args::<CheckAvailabilityArgs>("").is_err());
    }
}
