//! Container name normalization.

/// Minimum container name length.
pub const MIN_CONTAINER_NAME_LEN: usize = 3;
/// Maximum container name length.
pub const MAX_CONTAINER_NAME_LEN: usize = 63;

const REPLACEMENT: char = '-';
const LEADING: char = 'c';
const PADDING: char = '0';

/// Normalize a caller-supplied container key into a backend-safe name.
///
/// Output is lowercase ASCII from `[a-z0-9-]`, starts with an alphanumeric
/// character and is 3 to 63 characters long. Empty input stays empty.
/// The function is idempotent.
pub fn normalize_container_name(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }

    let mut name: String = key
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == REPLACEMENT {
                c
            } else {
                REPLACEMENT
            }
        })
        .collect();

    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        name.replace_range(..1, &LEADING.to_string());
    }

    while name.len() < MIN_CONTAINER_NAME_LEN {
        name.push(PADDING);
    }
    name.truncate(MAX_CONTAINER_NAME_LEN);

    name
}

/// Normalize a container listing prefix.
///
/// Same character rules as [`normalize_container_name`] but without padding,
/// so a short prefix still matches longer names.
pub fn normalize_container_prefix(prefix: &str) -> String {
    let mut normalized = normalize_container_name(prefix);
    let kept = prefix.chars().count().min(MAX_CONTAINER_NAME_LEN);
    normalized.truncate(kept);
    normalized
}

/// Whether `name` is already a valid normalized container name.
pub fn is_valid_container_name(name: &str) -> bool {
    !name.is_empty() && normalize_container_name(name) == name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(name: &str) {
        assert!(
            (MIN_CONTAINER_NAME_LEN..=MAX_CONTAINER_NAME_LEN).contains(&name.len()),
            "{name:?} length"
        );
        assert!(name.starts_with(|c: char| c.is_ascii_alphanumeric()), "{name:?} first char");
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "{name:?} charset"
        );
    }

    #[test]
    fn short_names_are_padded() {
        assert_eq!(normalize_container_name("AB"), "ab0");
        assert_eq!(normalize_container_name("x"), "x00");
    }

    #[test]
    fn invalid_characters_are_replaced() {
        assert_eq!(normalize_container_name("study!one"), "study-one");
        assert_eq!(normalize_container_name("1.2.840.10008"), "1-2-840-10008");
        assert_eq!(normalize_container_name("Ünïcode"), "cn-code");
    }

    #[test]
    fn leading_non_alphanumeric_is_replaced() {
        assert_eq!(normalize_container_name("-abc"), "cabc");
        assert_eq!(normalize_container_name("_"), "c00");
    }

    #[test]
    fn long_names_are_truncated() {
        let name = normalize_container_name(&"a".repeat(100));
        assert_eq!(name.len(), MAX_CONTAINER_NAME_LEN);
    }

    #[test]
    fn prefixes_are_not_padded() {
        assert_eq!(normalize_container_prefix("A"), "a");
        assert_eq!(normalize_container_prefix("1.2"), "1-2");
        assert_eq!(normalize_container_prefix("_x"), "cx");
        assert_eq!(normalize_container_prefix(""), "");
        assert!(normalize_container_name("abc").starts_with(&normalize_container_prefix("AB")));
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_container_name(""), "");
        assert!(!is_valid_container_name(""));
    }

    #[test]
    fn normalization_is_idempotent_and_well_formed() {
        let samples = [
            "AB",
            "!",
            "a",
            "Study_1.2.3",
            "---",
            "  spaced out  ",
            "ÄÖÜ",
            "日本語",
            "1.2.840.113619.2.55.3.604688119.969.1268071029.320",
            &"Z!".repeat(50),
        ];
        for sample in samples {
            let once = normalize_container_name(sample);
            assert_eq!(normalize_container_name(&once), once, "input {sample:?}");
            assert_well_formed(&once);
            assert!(is_valid_container_name(&once));
        }
    }
}
