//! Destination key generation.

use chrono::Utc;
use uuid::Uuid;

/// `{prefix}{app}/{YYYY-MM-DD}/{uuid}.jsonl[.gz]`, date in UTC at flush time.
/// Keys are unique per batch; nothing may rely on key ordering.
pub(crate) fn build_object_key(prefix: &str, app_name: &str, gzipped: bool) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    let suffix = if gzipped { ".jsonl.gz" } else { ".jsonl" };
    format!("{}{}/{}/{}{}", prefix, app_name, date, Uuid::new_v4(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn assert_key_shape(key: &str, prefix: &str, app: &str, suffix: &str) {
        let rest = key
            .strip_prefix(prefix)
            .unwrap_or_else(|| panic!("missing prefix in {}", key));
        let rest = rest
            .strip_prefix(app)
            .and_then(|r| r.strip_prefix('/'))
            .unwrap_or_else(|| panic!("missing app segment in {}", key));
        let (date, file) = rest.split_once('/').expect("missing date segment");
        assert!(NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
        let stem = file
            .strip_suffix(suffix)
            .unwrap_or_else(|| panic!("unexpected suffix in {}", key));
        assert!(Uuid::parse_str(stem).is_ok(), "not a uuid: {}", stem);
    }

    #[test]
    fn gzipped_key_shape() {
        let key = build_object_key("logs/", "app", true);
        assert_key_shape(&key, "logs/", "app", ".jsonl.gz");
    }

    #[test]
    fn plain_key_shape() {
        let key = build_object_key("test/", "demo", false);
        assert_key_shape(&key, "test/", "demo", ".jsonl");
    }

    #[test]
    fn keys_are_unique() {
        let a = build_object_key("logs/", "app", true);
        let b = build_object_key("logs/", "app", true);
        assert_ne!(a, b);
    }
}
