//! Free-text excerpt selection for the gold comments artifact.

use crate::domain::CanonicalRecord;

/// Default number of excerpts kept per run
pub const DEFAULT_EXCERPT_LIMIT: usize = 200;
/// Excerpts must be strictly longer than this many characters
pub const DEFAULT_MIN_CHARS: usize = 5;

const SENTINELS: &[&str] = &["nan", "none", "na", "n/a"];

/// Trim, collapse internal whitespace runs to one space and drop sentinel tokens
pub fn clean_comment(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || SENTINELS.contains(&collapsed.to_lowercase().as_str()) {
        None
    } else {
        Some(collapsed)
    }
}

/// Pick the longest cleaned comments, longest first.
///
/// Length is counted in characters. Equal lengths are ordered lexicographically
/// so the selection does not depend on record order.
pub fn select_excerpts<'a, I>(comments: I, min_chars: usize, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut kept: Vec<(usize, String)> = comments
        .into_iter()
        .flatten()
        .filter_map(clean_comment)
        .map(|c| (c.chars().count(), c))
        .filter(|(len, _)| *len > min_chars)
        .collect();

    kept.sort_by(|(la, a), (lb, b)| lb.cmp(la).then_with(|| a.cmp(b)));
    kept.truncate(limit);
    kept.into_iter().map(|(_, c)| c).collect()
}

/// Excerpts drawn from the `comments` field of each record
pub fn record_excerpts(records: &[CanonicalRecord], min_chars: usize, limit: usize) -> Vec<String> {
    select_excerpts(records.iter().map(|r| r.comments.as_deref()), min_chars, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_comment() {
        assert_eq!(clean_comment("  a   b\t\nc "), Some("a b c".to_string()));
        assert_eq!(clean_comment("N/A"), None);
        assert_eq!(clean_comment(" none "), None);
        assert_eq!(clean_comment("   "), None);
    }

    #[test]
    fn test_excerpts_longest_first_with_threshold() {
        let input = vec![
            Some("short"),
            Some("sixsix"),
            None,
            Some("a much longer comment"),
            Some("   padded    out  "),
            Some("nan"),
        ];
        let excerpts = select_excerpts(input, DEFAULT_MIN_CHARS, DEFAULT_EXCERPT_LIMIT);
        assert_eq!(
            excerpts,
            vec!["a much longer comment", "padded out", "sixsix"]
        );
    }

    #[test]
    fn test_excerpts_limit_and_ties() {
        let input = vec![Some("bbbbbbb"), Some("aaaaaaa"), Some("ccccccccc")];
        assert_eq!(select_excerpts(input.clone(), 5, 2), vec!["ccccccccc", "aaaaaaa"]);

        let mut reversed = input;
        reversed.reverse();
        assert_eq!(select_excerpts(reversed, 5, 2), vec!["ccccccccc", "aaaaaaa"]);
    }

    #[test]
    fn test_length_counts_characters() {
        // Five characters, more than five bytes
        assert!(select_excerpts(vec![Some("ação!")], 5, 10).is_empty());
        assert_eq!(select_excerpts(vec![Some("ações!")], 5, 10).len(), 1);
    }
}
