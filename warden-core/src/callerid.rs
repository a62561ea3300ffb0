//! Caller-ID line parsing. Modems report the calling number in several
//! incompatible vendor dialects; each dialect is an independent matcher,
//! tried in a fixed precedence order. Pure and total: malformed input is
//! "no number", never an error.

/// Minimum digit count for a bare-number line.
const MIN_BARE_DIGITS: usize = 10;

type Matcher = fn(&str) -> Option<String>;

/// Ordered vendor matchers; first match wins.
const MATCHERS: &[Matcher] = &[match_nmbr, match_caller_number, match_clip, match_bare_number];

/// Extract a phone number from one raw modem line, if any dialect matches.
pub fn parse_caller_id(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    MATCHERS.iter().find_map(|matcher| matcher(line))
}

/// `NMBR = 5551234567` (US Robotics and most Rockwell-based modems).
fn match_nmbr(line: &str) -> Option<String> {
    if !line.to_ascii_uppercase().contains("NMBR") {
        return None;
    }
    let (_, rest) = line.split_once('=')?;
    non_empty(rest)
}

/// `CALLER NUMBER: 5551112222` (verbose dialects).
fn match_caller_number(line: &str) -> Option<String> {
    let upper = line.to_ascii_uppercase();
    if !(upper.contains("CALLER") && upper.contains("NUMBER")) {
        return None;
    }
    let (_, rest) = line.split_once(':')?;
    non_empty(rest)
}

/// `+CLIP: "5559876543",129` (GSM/ETSI-style modems): first quoted substring.
fn match_clip(line: &str) -> Option<String> {
    if !line.to_ascii_uppercase().contains("+CLIP") {
        return None;
    }
    let quoted = line.split('"').nth(1)?;
    non_empty(quoted)
}

/// A line that is nothing but digits, at least ten of them.
fn match_bare_number(line: &str) -> Option<String> {
    if line.len() >= MIN_BARE_DIGITS && line.bytes().all(|b| b.is_ascii_digit()) {
        Some(line.to_string())
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmbr_format() {
        assert_eq!(
            parse_caller_id("NMBR = 5551234567").as_deref(),
            Some("5551234567")
        );
    }

    #[test]
    fn caller_number_format() {
        assert_eq!(
            parse_caller_id("CALLER NUMBER: 5551112222").as_deref(),
            Some("5551112222")
        );
    }

    #[test]
    fn clip_format() {
        assert_eq!(
            parse_caller_id("+CLIP: \"5559876543\",129").as_deref(),
            Some("5559876543")
        );
    }

    #[test]
    fn bare_ten_digit_line() {
        assert_eq!(
            parse_caller_id("5551234567").as_deref(),
            Some("5551234567")
        );
    }

    #[test]
    fn ring_is_not_a_number() {
        assert_eq!(parse_caller_id("RING"), None);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            parse_caller_id("nmbr = 2125551234").as_deref(),
            Some("2125551234")
        );
        assert_eq!(
            parse_caller_id("caller number: 2125551234").as_deref(),
            Some("2125551234")
        );
        assert_eq!(
            parse_caller_id("+clip: \"2125551234\",129").as_deref(),
            Some("2125551234")
        );
    }

    #[test]
    fn nmbr_takes_precedence_over_clip() {
        assert_eq!(
            parse_caller_id("+CLIP: \"5559876543\" NMBR = 5551234567").as_deref(),
            Some("5551234567")
        );
    }

    #[test]
    fn missing_delimiter_degrades_to_no_number() {
        // Token matched but no delimiter: the matcher declines and nothing
        // downstream matches either.
        assert_eq!(parse_caller_id("NMBR 5551234567 RING"), None);
        assert_eq!(parse_caller_id("+CLIP: 5559876543,129"), None);
    }

    #[test]
    fn empty_value_after_delimiter_is_no_number() {
        assert_eq!(parse_caller_id("NMBR ="), None);
        assert_eq!(parse_caller_id("CALLER NUMBER:   "), None);
        assert_eq!(parse_caller_id("+CLIP: \"\",129"), None);
    }

    #[test]
    fn short_digit_runs_are_ignored() {
        assert_eq!(parse_caller_id("555123456"), None);
        assert_eq!(parse_caller_id("OK"), None);
        assert_eq!(parse_caller_id("   "), None);
    }

    #[test]
    fn mixed_digit_lines_are_ignored() {
        assert_eq!(parse_caller_id("555-123-4567"), None);
        assert_eq!(parse_caller_id("ERROR 1234567890x"), None);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            parse_caller_id("  NMBR =  5551234567  \r").as_deref(),
            Some("5551234567")
        );
        assert_eq!(
            parse_caller_id("  5551234567  ").as_deref(),
            Some("5551234567")
        );
    }
}
