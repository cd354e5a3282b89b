//! Query-name cleanup ahead of external lookup.

use std::sync::LazyLock;

use regex::Regex;

/// Facility-type token that hurts lookup hit rate when left in the name
pub const NOISE_TOKEN: &str = "CHC";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(^|\s){}(\s|$)", regex::escape(NOISE_TOKEN)))
        .expect("noise token pattern is valid")
});

static MULTI_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"));

/// Remove the standalone noise token from the first comma-separated segment.
///
/// `"Adelaide River CHC, NT, Australia"` becomes `"Adelaide River, NT, Australia"`.
/// The token is matched case-insensitively and only between whitespace or the
/// segment edges, so words that merely contain it are left alone. Names without
/// the token, or made up of nothing else, are returned unchanged.
pub fn strip_noise_token(place: &str) -> String {
    let (first, rest) = match place.split_once(',') {
        Some((first, rest)) => (first, Some(rest)),
        None => (place, None),
    };

    if !TOKEN_RE.is_match(first) {
        return place.to_string();
    }

    // Adjacent tokens share a separator, so a single pass can leave one behind
    let mut cleaned = first.to_string();
    loop {
        let next = TOKEN_RE.replace_all(&cleaned, "$1$2").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    let cleaned = MULTI_SPACE_RE.replace_all(cleaned.trim(), " ");
    if cleaned.is_empty() {
        return place.to_string();
    }

    match rest {
        Some(rest) => format!("{}, {}", cleaned, rest.trim_start()),
        None => cleaned.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_token_from_first_segment() {
        assert_eq!(
            strip_noise_token("Adelaide River CHC, NT, Australia"),
            "Adelaide River, NT, Australia"
        );
        assert_eq!(
            strip_noise_token("Example River CHC, NT, Australia"),
            "Example River, NT, Australia"
        );
    }

    #[test]
    fn matches_case_insensitively_anywhere_in_segment() {
        assert_eq!(strip_noise_token("chc Ali Curung, NT"), "Ali Curung, NT");
        assert_eq!(strip_noise_token("Ali  Chc  Curung, NT"), "Ali Curung, NT");
        assert_eq!(strip_noise_token("Batchelor CHC"), "Batchelor");
    }

    #[test]
    fn removes_repeated_tokens() {
        assert_eq!(strip_noise_token("Angurugu CHC CHC, NT"), "Angurugu, NT");
    }

    #[test]
    fn leaves_embedded_token_alone() {
        let name = "CHCentre Angurugu, NT, Australia";
        assert_eq!(strip_noise_token(name), name);
        let name = "Angurugu XCHC, NT";
        assert_eq!(strip_noise_token(name), name);
    }

    #[test]
    fn only_first_segment_is_touched() {
        assert_eq!(
            strip_noise_token("Areyonga CHC, CHC Region, Australia"),
            "Areyonga, CHC Region, Australia"
        );
        let name = "Areyonga, CHC Region";
        assert_eq!(strip_noise_token(name), name);
    }

    #[test]
    fn names_without_token_are_unchanged() {
        for name in ["Darwin, NT", "  Katherine ,NT", "Alice Springs", ""] {
            assert_eq!(strip_noise_token(name), name);
        }
    }

    #[test]
    fn token_only_segment_is_kept() {
        assert_eq!(strip_noise_token("CHC, NT, Australia"), "CHC, NT, Australia");
        assert_eq!(strip_noise_token("chc CHC, NT"), "chc CHC, NT");
        assert_eq!(strip_noise_token("  CHC  "), "  CHC  ");
    }

    #[test]
    fn untouched_names_keep_their_whitespace() {
        let name = "  Katherine  Hospital, NT";
        assert_eq!(strip_noise_token(name), name);
    }
}
