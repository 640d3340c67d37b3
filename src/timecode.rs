use serde_json::Value;

use crate::error::CoreError;

/// Normalizes an agent-supplied timestamp into whole seconds.
///
/// Accepted shapes:
/// - null -> 0
/// - number -> truncated toward zero
/// - "HH:MM:SS" / "MM:SS" -> clock math
/// - any other string -> parsed as a float, truncated
pub fn normalize_timestamp(value: &Value) -> Result<i64, CoreError> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => {
            let f = n
                .as_f64()
                .ok_or_else(|| CoreError::Parse(format!("non-finite timestamp: {n}")))?;
            Ok(f as i64)
        }
        Value::String(s) => normalize_str(s.trim()),
        other => Err(CoreError::Parse(format!(
            "unsupported timestamp value: {other}"
        ))),
    }
}

fn normalize_str(s: &str) -> Result<i64, CoreError> {
    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        let nums = parts
            .iter()
            .map(|p| p.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CoreError::Parse(format!("bad clock timestamp: {s:?}")))?;
        return match nums.as_slice() {
            [h, m, sec] => Ok(h * 3600 + m * 60 + sec),
            [m, sec] => Ok(m * 60 + sec),
            _ => Err(CoreError::Parse(format!("bad clock timestamp: {s:?}"))),
        };
    }

    let f: f64 = s
        .parse()
        .map_err(|_| CoreError::Parse(format!("bad timestamp: {s:?}")))?;
    if !f.is_finite() {
        return Err(CoreError::Parse(format!("bad timestamp: {s:?}")));
    }
    Ok(f as i64)
}

/// Lenient form used on ingest paths: a missing or unparseable timestamp
/// degrades to 0 with a logged warning instead of failing the entity.
pub fn normalize_or_zero(value: Option<&Value>) -> i64 {
    let Some(v) = value else {
        return 0;
    };
    match normalize_timestamp(v) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("timestamp degraded to 0: {e}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clock_formats() {
        assert_eq!(normalize_timestamp(&json!("01:02:03")).unwrap(), 3723);
        assert_eq!(normalize_timestamp(&json!("02:05")).unwrap(), 125);
        assert_eq!(normalize_timestamp(&json!("00:00")).unwrap(), 0);
        assert_eq!(normalize_timestamp(&json!(" 10:00 ")).unwrap(), 600);
    }

    #[test]
    fn numeric_inputs_truncate() {
        assert_eq!(normalize_timestamp(&json!(90)).unwrap(), 90);
        assert_eq!(normalize_timestamp(&json!(90.9)).unwrap(), 90);
        assert_eq!(normalize_timestamp(&json!("90.5")).unwrap(), 90);
        assert_eq!(normalize_timestamp(&json!("120")).unwrap(), 120);
    }

    #[test]
    fn null_is_zero() {
        assert_eq!(normalize_timestamp(&Value::Null).unwrap(), 0);
        assert_eq!(normalize_or_zero(None), 0);
        assert_eq!(normalize_or_zero(Some(&Value::Null)), 0);
    }

    #[test]
    fn garbage_degrades_to_zero() {
        assert!(normalize_timestamp(&json!("garbage")).is_err());
        assert!(normalize_timestamp(&json!("1:2:3:4")).is_err());
        assert!(normalize_timestamp(&json!(true)).is_err());
        assert_eq!(normalize_or_zero(Some(&json!("garbage"))), 0);
    }
}
