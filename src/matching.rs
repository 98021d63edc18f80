use tracing::debug;

use crate::record::CandidateContact;
use crate::TARGET_PIPELINE;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 80.0;

fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Indel similarity: twice the longest common subsequence over the combined length.
fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_length(a, b) as f64 / total as f64
}

/// Whole-string similarity on a 0-100 scale.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    indel_ratio(&a, &b)
}

/// Best alignment of `needle` against `haystack`, which is at least as long.
/// Windows are the needle-length slices of the haystack plus its shorter
/// prefixes and suffixes. A window is only scored when its open edge holds a
/// character of the needle.
fn best_alignment(needle: &[char], haystack: &[char]) -> f64 {
    let width = needle.len();
    let last_start = haystack.len() - width;
    let mut best: f64 = 0.0;

    for end in 1..width {
        if needle.contains(&haystack[end - 1]) {
            best = best.max(indel_ratio(needle, &haystack[..end]));
        }
    }
    for start in 0..last_start {
        if needle.contains(&haystack[start + width - 1]) {
            best = best.max(indel_ratio(needle, &haystack[start..start + width]));
        }
    }
    for start in last_start..haystack.len() {
        if needle.contains(&haystack[start]) {
            best = best.max(indel_ratio(needle, &haystack[start..]));
        }
    }
    best
}

/// Best [`ratio`] of the shorter string against any window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let score = if a.len() <= b.len() {
        best_alignment(&a, &b)
    } else {
        best_alignment(&b, &a)
    };
    if score >= 100.0 || a.len() != b.len() {
        return score;
    }
    // Equal lengths: either side can serve as the needle.
    score.max(best_alignment(&b, &a))
}

/// [`ratio`] after sorting the whitespace-separated tokens of both strings.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Maximum of the three metrics for two already-normalized names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    ratio(a, b)
        .max(partial_ratio(a, b))
        .max(token_sort_ratio(a, b))
}

/// The winning candidate of a match, with its position and score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMatch<'a> {
    pub contact: &'a CandidateContact,
    pub index: usize,
    pub score: f64,
}

/// Maps a discovered owner name onto the closest candidate contact.
#[derive(Debug, Clone, Copy)]
pub struct IdentityMatcher {
    threshold: f64,
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        IdentityMatcher {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl IdentityMatcher {
    pub fn new(threshold: f64) -> Self {
        IdentityMatcher { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Highest-scoring candidate at or above the threshold. Ties go to the
    /// candidate listed first.
    pub fn best_match<'a>(
        &self,
        target: &str,
        candidates: &'a [CandidateContact],
    ) -> Option<ContactMatch<'a>> {
        let target = normalize(target);
        if target.is_empty() {
            return None;
        }

        let mut best: Option<ContactMatch<'a>> = None;
        for (index, contact) in candidates.iter().enumerate() {
            let name = normalize(&contact.name);
            if name.is_empty() {
                continue;
            }

            let score = name_similarity(&target, &name);
            debug!(target: TARGET_PIPELINE, "Similarity '{}' vs '{}' = {}", target, name, score);

            if best.map_or(true, |current| score > current.score) {
                best = Some(ContactMatch {
                    contact,
                    index,
                    score,
                });
            }
        }

        best.filter(|candidate| candidate.score >= self.threshold)
    }
}

/// Convenience form of [`IdentityMatcher::best_match`].
pub fn match_contact<'a>(
    target: &str,
    candidates: &'a [CandidateContact],
    threshold: f64,
) -> Option<&'a CandidateContact> {
    IdentityMatcher::new(threshold)
        .best_match(target, candidates)
        .map(|found| found.contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contacts(names: &[&str]) -> Vec<CandidateContact> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| CandidateContact::new(name, i + 1))
            .collect()
    }

    #[test]
    fn test_exact_name_scores_100() {
        let candidates = contacts(&["John Smith"]);
        let found = IdentityMatcher::default()
            .best_match("John Smith", &candidates)
            .unwrap();
        assert_eq!(found.score, 100.0);
        assert_eq!(found.contact.name, "John Smith");
    }

    #[test]
    fn test_normalization_ignores_case_and_padding() {
        let candidates = contacts(&["  JOHN SMITH "]);
        let found = IdentityMatcher::default()
            .best_match("john smith", &candidates)
            .unwrap();
        assert_eq!(found.score, 100.0);
    }

    #[test]
    fn test_ratio_counts_insertions_against_both_lengths() {
        assert_eq!(ratio("abc", "abc"), 100.0);
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", ""), 0.0);
        // Five inserted letters: 2 * 10 / (10 + 15).
        assert_eq!(ratio("john smith", "johnathan smith"), 80.0);
    }

    #[test]
    fn test_threshold_boundary() {
        // One substitution in five characters scores exactly 80 on every metric.
        let eighty = contacts(&["abxde"]);
        assert_eq!(name_similarity("abcde", "abxde"), 80.0);
        assert!(match_contact("abcde", &eighty, 80.0).is_some());
        assert!(match_contact("abcde", &eighty, 80.5).is_none());

        let below = contacts(&["Bill Jones"]);
        let score = name_similarity("william jones", "bill jones");
        assert!(score > 78.0 && score < 80.0, "score was {}", score);
        assert!(match_contact("William Jones", &below, 80.0).is_none());
        assert!(match_contact("William Jones", &below, 78.0).is_some());
    }

    #[test]
    fn test_scores_are_compared_unrounded() {
        // The prefix window "abcd" aligns 4 of 9 characters: 88.9 points.
        let score = name_similarity("abcde", "abcdx");
        assert!((score - 800.0 / 9.0).abs() < 1e-9, "score was {}", score);

        let candidates = contacts(&["abcdx"]);
        assert!(match_contact("abcde", &candidates, 88.8).is_some());
        assert!(match_contact("abcde", &candidates, 89.0).is_none());
    }

    #[test]
    fn test_full_first_name_matches_short_form() {
        let candidates = contacts(&["Johnathan Smith"]);
        assert!(name_similarity("john smith", "johnathan smith") >= 80.0);
        assert!(match_contact("John Smith", &candidates, 80.0).is_some());
    }

    #[test]
    fn test_misspelled_name_matches() {
        let candidates = contacts(&["John Smith"]);
        let score = name_similarity("jon smyth", "john smith");
        assert!((score - 1600.0 / 19.0).abs() < 1e-9, "score was {}", score);
        assert!(match_contact("Jon Smyth", &candidates, 80.0).is_some());
        assert!(match_contact("Jon Smyth", &candidates, 85.0).is_none());
    }

    #[test]
    fn test_reordered_tokens_match() {
        let candidates = contacts(&["Smith John"]);
        assert_eq!(token_sort_ratio("john smith", "smith john"), 100.0);
        assert!(match_contact("John Smith", &candidates, 80.0).is_some());
    }

    #[test]
    fn test_partial_name_matches_through_substring() {
        assert_eq!(partial_ratio("mike lata", "chef mike lata"), 100.0);
        let candidates = contacts(&["Chef Mike Lata"]);
        assert!(match_contact("Mike Lata", &candidates, 80.0).is_some());
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let candidates = contacts(&["Jane Doe", "John Smith", "john smith"]);
        let found = IdentityMatcher::default()
            .best_match("John Smith", &candidates)
            .unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.contact.rank, 2);
    }

    #[test]
    fn test_highest_score_wins_over_order() {
        let candidates = contacts(&["Jon Smyth", "John Smith"]);
        let found = IdentityMatcher::default()
            .best_match("John Smith", &candidates)
            .unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.score, 100.0);
    }

    #[test]
    fn test_empty_names_never_match() {
        let candidates = contacts(&["", "John Smith"]);
        assert!(match_contact("   ", &candidates, 0.0).is_none());
        let found = IdentityMatcher::new(0.0)
            .best_match("Jane", &candidates)
            .unwrap();
        assert_eq!(found.index, 1);
    }

    #[test]
    fn test_unrelated_name_is_absent() {
        let candidates = contacts(&["Maria Lopez", "Bob Jones"]);
        assert!(match_contact("John Smith", &candidates, 80.0).is_none());
        assert!(match_contact("John Smith", &[], 80.0).is_none());
    }
}
