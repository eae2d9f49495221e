//! # Phone Number Normalisation
//!
//! SMS providers expect Ghanaian numbers in the international form
//! `233xxxxxxxxx` without a plus sign.
//!
//! ```text
//! "024 123-4567"     ─► strip ─► "0241234567"   ─► 0→233 ─► "233241234567"
//! "+233 24 123 4567" ─► strip ─► "233241234567" ─► as is ─► "233241234567"
//! "241234567"        ─► strip ─► "241234567"    ─► +233  ─► "233241234567"
//! ```

/// Ghana's country calling code.
pub const GHANA_COUNTRY_CODE: &str = "233";

/// Normalises a Ghanaian phone number to `233xxxxxxxxx`.
///
/// Whitespace, dashes, dots, parentheses and a leading `+` are removed.
/// A leading `0` is replaced by `233`; a number without the country code
/// gets `233` prepended.
///
/// ## Example
/// ```rust
/// use swapsync_core::phone::normalize_ghana_number;
///
/// assert_eq!(normalize_ghana_number("024-123 4567"), "233241234567");
/// assert_eq!(normalize_ghana_number("233241234567"), "233241234567");
/// ```
pub fn normalize_ghana_number(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\t'))
        .collect();

    if let Some(local) = cleaned.strip_prefix('0') {
        format!("{}{}", GHANA_COUNTRY_CODE, local)
    } else if cleaned.starts_with(GHANA_COUNTRY_CODE) {
        cleaned
    } else {
        format!("{}{}", GHANA_COUNTRY_CODE, cleaned)
    }
}

/// True if the normalised number looks deliverable (233 + 9 digits).
///
/// The all-zero subscriber number belongs to the walk-in customer and is
/// never deliverable.
pub fn is_deliverable(normalised: &str) -> bool {
    let Some(subscriber) = normalised.strip_prefix(GHANA_COUNTRY_CODE) else {
        return false;
    };
    subscriber.len() == 9
        && subscriber.bytes().all(|b| b.is_ascii_digit())
        && subscriber.bytes().any(|b| b != b'0')
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_format() {
        assert_eq!(normalize_ghana_number("0241234567"), "233241234567");
        assert_eq!(normalize_ghana_number(" 024 123 4567 "), "233241234567");
        assert_eq!(normalize_ghana_number("(024) 123-4567"), "233241234567");
    }

    #[test]
    fn test_international_format() {
        assert_eq!(normalize_ghana_number("233241234567"), "233241234567");
        assert_eq!(normalize_ghana_number("+233 24 123 4567"), "233241234567");
    }

    #[test]
    fn test_missing_country_code() {
        assert_eq!(normalize_ghana_number("241234567"), "233241234567");
    }

    #[test]
    fn test_deliverable() {
        assert!(is_deliverable("233241234567"));
        assert!(!is_deliverable("2330000000000"));
        assert!(!is_deliverable(&normalize_ghana_number("0000000000")));
    }
}
