use gvault_sync::catalog::split_stored_name;
use gvault_sync::transfer::{sanitize_name, stored_path_for};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_sanitized_names_are_single_segments(name in ".{0,64}") {
        let clean = sanitize_name(&name);
        prop_assert!(!clean.is_empty());
        prop_assert!(!clean.contains('/'));
        prop_assert!(!clean.contains('\\'));
        prop_assert!(!clean.chars().any(char::is_control));
        prop_assert!(clean != "." && clean != "..");
    }

    #[test]
    fn test_stored_path_recovers_timestamp(name in "[a-zA-Z0-9 _-]{1,32}", ts in 1u64..=4_102_444_800_000, encrypted: bool) {
        let path = stored_path_for("files", &name, ts, encrypted);
        prop_assert!(path.starts_with("files/"));
        prop_assert_eq!(path.ends_with(".encrypted"), encrypted);

        let object = path.trim_start_matches("files/");
        let (parsed_ts, base) = split_stored_name(object);
        prop_assert_eq!(parsed_ts, Some(ts));
        prop_assert_eq!(base, sanitize_name(&name));
    }
}
