//! Shared case-insensitive phrase matching.
//!
//! Every keyword category (skills, sponsorship, culture, titles, remote
//! detection) goes through this one matcher so word-boundary semantics
//! stay consistent: a phrase matches only when the characters adjacent
//! to the matched span are not alphanumeric, so "Java" never matches
//! inside "JavaScript" while "C#" still matches "C# developer".

/// Lowercase a haystack once before repeated `contains_phrase` calls.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// True when `needle` occurs in `haystack` on word boundaries.
/// Both sides are compared case-insensitively; callers that loop over
/// many needles should pre-fold the haystack with [`fold`].
pub fn contains_phrase(haystack_folded: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    for (start, _) in haystack_folded.match_indices(&needle) {
        let before_ok = haystack_folded[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack_folded[start + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

/// Count how many distinct needles match; used by the capped signal
/// categories (sponsorship, culture).
pub fn count_matches<'a, I>(haystack_folded: &str, needles: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    needles
        .into_iter()
        .filter(|needle| contains_phrase(haystack_folded, needle))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_case_insensitive() {
        let hay = fold("Experience with TypeScript and React required");
        assert!(contains_phrase(&hay, "typescript"));
        assert!(contains_phrase(&hay, "REACT"));
    }

    #[test]
    fn word_boundaries_are_enforced() {
        let hay = fold("We use JavaScript heavily");
        assert!(!contains_phrase(&hay, "java"));
        assert!(contains_phrase(&hay, "javascript"));
    }

    #[test]
    fn symbols_in_needles_are_allowed() {
        let hay = fold("Backend roles: C# or C++ welcome");
        assert!(contains_phrase(&hay, "c#"));
        assert!(contains_phrase(&hay, "c++"));
    }

    #[test]
    fn multi_word_phrases_match_across_spaces() {
        let hay = fold("Visa sponsorship available for the right candidate");
        assert!(contains_phrase(&hay, "visa sponsorship available"));
        assert!(!contains_phrase(&hay, "sponsorship unavailable"));
    }

    #[test]
    fn empty_needle_never_matches() {
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn count_matches_counts_distinct_needles() {
        let hay = fold("equity package, flexible hours, flexible hours");
        let n = count_matches(&hay, ["equity", "flexible hours", "learning budget"]);
        assert_eq!(n, 2);
    }
}
