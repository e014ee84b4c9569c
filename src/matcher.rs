//! Fuzzy name matching between template entities and existing server
//! entities.
//!
//! Discord template names are full of emoji and decorative unicode that the
//! Revolt side may or may not have kept, so candidates are compared on a
//! normalized key with an edit-distance similarity score on top.

/// Normalizes a channel or role name for comparison.
///
/// Only alphanumeric characters survive, lowercased. Emoji, punctuation and
/// whitespace all vanish, so `"⚙️Channel⚙️"` and `"channel"` normalize to the
/// same key.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Finds the best-scoring candidate for `name` above `threshold`.
///
/// Returns the index of the winner, or `None` if nothing scores high enough.
/// Ties are broken by the first-listed candidate. Candidates are compared on
/// their normalized names; callers normalize once and pass the keys in.
pub fn best_match(name: &str, candidates: &[String], threshold: f64) -> Option<usize> {
    let name = normalize(name);

    let mut best: Option<(usize, f64)> = None;

    for (idx, candidate) in candidates.iter().enumerate() {
        let score = similarity(&name, candidate);

        if score < threshold {
            continue;
        }

        match best {
            // strict comparison keeps the first-listed winner on ties
            Some((_, best_score)) if score <= best_score => (),
            _ => best = Some((idx, score)),
        }
    }

    best.map(|(idx, _)| idx)
}

/// Normalized Levenshtein similarity between two keys, in `0.0..=1.0`.
///
/// `1.0` is an exact match; the distance is scaled by the longer key so short
/// names aren't unfairly punished.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let len = a.chars().count().max(b.chars().count());

    if len == 0 {
        return 1.0;
    }

    1.0 - levenshtein(a, b) as f64 / len as f64
}

/// Levenshtein edit distance over unicode scalars.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }

    // single-row dynamic programming
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;

        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { prev } else { prev + 1 };
            prev = row[j + 1];
            row[j + 1] = cost.min(prev + 1).min(row[j] + 1);
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_emoji_and_case() {
        assert_eq!(normalize("⚙️Channel⚙️"), normalize("channel"));
        assert_eq!(normalize("📢 Announcements"), "announcements");
        assert_eq!(normalize("general-chat"), normalize("General Chat"));
    }

    #[test]
    fn exact_match_wins() {
        let candidates = vec![
            normalize("general"),
            normalize("memes"),
            normalize("off-topic"),
        ];

        assert_eq!(best_match("🔥memes🔥", &candidates, 0.8), Some(1));
    }

    #[test]
    fn close_names_match_above_threshold() {
        let candidates = vec![normalize("anouncements")];

        // one edit away after normalization
        assert_eq!(best_match("announcements", &candidates, 0.8), Some(0));
    }

    #[test]
    fn unrelated_names_do_not_match() {
        let candidates = vec![normalize("general"), normalize("voice chat")];

        assert_eq!(best_match("rules", &candidates, 0.8), None);
    }

    #[test]
    fn ties_go_to_first_listed() {
        let candidates = vec![normalize("general"), normalize("general")];

        assert_eq!(best_match("general", &candidates, 0.8), Some(0));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
    }
}
