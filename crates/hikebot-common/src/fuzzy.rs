//! Fuzzy string scoring for trail-name matching.
//!
//! Scores are integers in `0..=100`. `wratio` blends several scorers the way
//! the common "weighted ratio" heuristic does: plain similarity for strings
//! of similar length, substring similarity when one is much shorter, and
//! token-order-insensitive similarity in both cases.

use std::collections::BTreeSet;

use rapidfuzz::distance::indel;

const UNBASE_SCALE: f64 = 0.95;

/// Lowercase, replace non-alphanumerics with spaces, trim.
pub fn default_process(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    mapped.trim().to_string()
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    100.0 * indel::normalized_similarity(a.iter().copied(), b.iter().copied())
}

fn ratio_f(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

fn partial_ratio_f(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let m = short.len();
    let n = long.len();

    let mut best: f64 = 0.0;
    // Windows hanging off the left and right edges of the long string.
    for i in 1..m {
        best = best.max(ratio_chars(&short, &long[..i.min(n)]));
        best = best.max(ratio_chars(&short, &long[n.saturating_sub(i)..]));
    }
    for start in 0..=(n - m) {
        best = best.max(ratio_chars(&short, &long[start..start + m]));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn tokens(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

fn sorted_tokens(s: &str) -> String {
    let mut t = tokens(s);
    t.sort_unstable();
    t.join(" ")
}

struct TokenSets {
    intersection: String,
    diff_ab: String,
    diff_ba: String,
}

fn token_sets(a: &str, b: &str) -> TokenSets {
    let set_a: BTreeSet<&str> = tokens(a).into_iter().collect();
    let set_b: BTreeSet<&str> = tokens(b).into_iter().collect();
    let join = |it: Vec<&str>| it.join(" ");
    TokenSets {
        intersection: join(set_a.intersection(&set_b).copied().collect()),
        diff_ab: join(set_a.difference(&set_b).copied().collect()),
        diff_ba: join(set_b.difference(&set_a).copied().collect()),
    }
}

fn token_sort_ratio_f(a: &str, b: &str) -> f64 {
    ratio_f(&sorted_tokens(a), &sorted_tokens(b))
}

fn token_set_ratio_f(a: &str, b: &str) -> f64 {
    let sets = token_sets(a, b);
    if sets.intersection.is_empty() {
        return ratio_f(&sets.diff_ab, &sets.diff_ba);
    }
    if sets.diff_ab.is_empty() || sets.diff_ba.is_empty() {
        return 100.0;
    }
    let combined_ab = format!("{} {}", sets.intersection, sets.diff_ab);
    let combined_ba = format!("{} {}", sets.intersection, sets.diff_ba);
    ratio_f(&sets.intersection, &combined_ab)
        .max(ratio_f(&sets.intersection, &combined_ba))
        .max(ratio_f(&combined_ab, &combined_ba))
}

fn partial_token_ratio_f(a: &str, b: &str) -> f64 {
    let sets = token_sets(a, b);
    let set_score = if !sets.intersection.is_empty() {
        100.0
    } else {
        partial_ratio_f(&sets.diff_ab, &sets.diff_ba)
    };
    set_score.max(partial_ratio_f(&sorted_tokens(a), &sorted_tokens(b)))
}

fn to_score(v: f64) -> u8 {
    v.round().clamp(0.0, 100.0) as u8
}

/// Plain similarity of the two raw strings.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    to_score(ratio_f(a, b))
}

/// Best similarity of the shorter string against any same-length slice of
/// the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    to_score(partial_ratio_f(a, b))
}

pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    to_score(token_sort_ratio_f(&default_process(a), &default_process(b)))
}

pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    to_score(token_set_ratio_f(&default_process(a), &default_process(b)))
}

/// Weighted blend of the scorers above. Both inputs are normalized with
/// [`default_process`] first; an input that normalizes to nothing scores 0.
pub fn wratio(a: &str, b: &str) -> u8 {
    let p1 = default_process(a);
    let p2 = default_process(b);
    if p1.is_empty() || p2.is_empty() {
        return 0;
    }

    let len1 = p1.chars().count() as f64;
    let len2 = p2.chars().count() as f64;
    let len_ratio = len1.max(len2) / len1.min(len2);

    let mut end = ratio_f(&p1, &p2);
    if len_ratio < 1.5 {
        let token = token_sort_ratio_f(&p1, &p2).max(token_set_ratio_f(&p1, &p2));
        return to_score(end.max(token * UNBASE_SCALE));
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    end = end.max(partial_ratio_f(&p1, &p2) * partial_scale);
    to_score(end.max(partial_token_ratio_f(&p1, &p2) * UNBASE_SCALE * partial_scale))
}

/// Return the first choice with the highest [`wratio`] against `query`.
pub fn extract_one<'a, I>(query: &str, choices: I) -> Option<(&'a str, u8)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, u8)> = None;
    for choice in choices {
        let score = wratio(query, choice);
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((choice, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_process_strips_punctuation_and_case() {
        assert_eq!(default_process("  Mailbox-Peak! "), "mailbox peak");
        assert_eq!(default_process("!!!"), "");
    }

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(ratio("abc", "abc"), 100);
        assert_eq!(wratio("Rattlesnake Ledge", "rattlesnake ledge"), 100);
    }

    #[test]
    fn ratio_uses_indel_similarity() {
        // indel distance 2 over 8 chars
        assert_eq!(ratio("abcd", "abed"), 75);
        assert_eq!(ratio("abc", ""), 0);
    }

    #[test]
    fn partial_ratio_finds_substring() {
        assert_eq!(partial_ratio("ledge", "rattlesnake ledge"), 100);
        assert_eq!(partial_ratio("", "anything"), 0);
    }

    #[test]
    fn token_ratios_ignore_order() {
        assert_eq!(token_sort_ratio("peak mailbox", "Mailbox Peak"), 100);
        assert_eq!(token_set_ratio("mailbox peak trail", "mailbox peak"), 100);
    }

    #[test]
    fn wratio_reordered_tokens_are_scaled() {
        assert_eq!(wratio("peak mailbox", "Mailbox Peak"), 95);
    }

    #[test]
    fn wratio_short_query_uses_partial_scale() {
        assert_eq!(wratio("mailbox", "Mailbox Peak"), 90);
    }

    #[test]
    fn wratio_empty_input_scores_zero() {
        assert_eq!(wratio("", "Mailbox Peak"), 0);
        assert_eq!(wratio("???", "Mailbox Peak"), 0);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(wratio("Mount Si", "Mailbox Peak") < 50);
    }

    #[test]
    fn extract_one_picks_best_choice() {
        let choices = ["Mailbox Peak", "Rattlesnake Ledge"];
        let (best, score) = extract_one("rattlesnake", choices.iter().copied()).unwrap();
        assert_eq!(best, "Rattlesnake Ledge");
        assert!(score > 50);
    }

    #[test]
    fn extract_one_keeps_first_on_ties() {
        let choices = ["Mailbox Peak", "Mailbox Peak"];
        let (best, _) = extract_one("mailbox", choices.iter().copied()).unwrap();
        assert_eq!(best, "Mailbox Peak");
        assert!(extract_one("x", std::iter::empty::<&str>()).is_none());
    }

    #[test]
    fn long_query_against_many_names_stays_fast() {
        let query = "tell me about a nice walk with views ".repeat(6);
        let names: Vec<String> = (0..300).map(|i| format!("Ridge Loop Trail {}", i)).collect();
        let started = std::time::Instant::now();
        let best = extract_one(&query, names.iter().map(String::as_str));
        assert!(best.is_some());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
