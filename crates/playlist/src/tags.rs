//! Tag extraction from path segments.
//!
//! Each segment is tokenized on whitespace after `_`, `-` and `.` are turned
//! into spaces. Tokens are matched against a fixed table; some tags only count
//! inside a bracketed group (`(Live)`, `[Demo]`), and a preceding `non` token
//! suppresses the next one (`Non-Album`).

use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    Anywhere,
    InsideBracket,
    OutsideBracket,
}

pub static TAG_RULES: Lazy<HashMap<&'static str, TagScope>> = Lazy::new(|| {
    use TagScope::*;
    HashMap::from([
        ("instrumental", Anywhere),
        ("instr", Anywhere),
        ("acoustic", Anywhere),
        ("interview", Anywhere),
        ("orchestral", Anywhere),
        ("orch", Anywhere),
        ("mix", Anywhere),
        ("remix", Anywhere),
        ("remixes", Anywhere),
        ("demo", InsideBracket),
        ("capella", InsideBracket),
        ("acapella", InsideBracket),
        ("synthesis", InsideBracket),
        ("live", InsideBracket),
        ("album", InsideBracket),
        ("bonus", InsideBracket),
        ("radio", InsideBracket),
        ("original", InsideBracket),
        ("full", InsideBracket),
        ("heavy", InsideBracket),
    ])
});

const NEGATION: &str = "non";

/// Tags found across all `segments`, deduplicated.
pub fn extract_tags<S: AsRef<str>>(segments: &[S]) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for segment in segments {
        extract_segment(segment.as_ref(), &TAG_RULES, &mut tags);
    }
    tags
}

/// True when any tag is in `blocked`.
pub fn overlap(tags: &BTreeSet<String>, blocked: &HashSet<String>) -> bool {
    !blocked.is_empty() && tags.iter().any(|tag| blocked.contains(tag))
}

fn extract_segment(
    segment: &str,
    rules: &HashMap<&'static str, TagScope>,
    out: &mut BTreeSet<String>,
) {
    let line: String = segment
        .chars()
        .map(|c| if matches!(c, '_' | '-' | '.') { ' ' } else { c })
        .collect();

    let mut inside = false;
    let mut negated = false;

    for raw in line.split_whitespace() {
        let token = raw.to_lowercase();
        let opens = token.starts_with('(') || token.starts_with('[');
        if opens {
            inside = true;
        }

        if negated {
            negated = false;
            continue;
        }
        if token == NEGATION {
            negated = true;
            continue;
        }

        let key: String = token
            .chars()
            .filter(|c| !matches!(c, '-' | '(' | '[' | ')' | ']' | '.'))
            .collect();

        if let Some(scope) = rules.get(key.as_str()) {
            let emit = match scope {
                TagScope::Anywhere => true,
                TagScope::InsideBracket => inside,
                TagScope::OutsideBracket => !inside,
            };
            if emit {
                out.insert(key);
            }
        }

        if !opens && (token.ends_with(')') || token.ends_with(']')) {
            inside = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(segments: &[&str]) -> Vec<String> {
        extract_tags(segments).into_iter().collect()
    }

    #[test]
    fn test_bracketed_live() {
        assert_eq!(tags(&["Artist - Song (Live)"]), vec!["live"]);
    }

    #[test]
    fn test_non_negates_next_token() {
        assert!(tags(&["Artist - Song (Studio) Non-Album"]).is_empty());
        assert!(tags(&["Song (Studio Non Album)"]).is_empty());
    }

    #[test]
    fn test_inside_tag_ignored_outside_brackets() {
        assert!(tags(&["Live at Wembley"]).is_empty());
        assert!(tags(&["Bonus Track"]).is_empty());
    }

    #[test]
    fn test_anywhere_tags_and_dedup() {
        assert_eq!(
            tags(&["Remix", "Song (Remix)", "acoustic_version"]),
            vec!["acoustic", "remix"]
        );
    }

    #[test]
    fn test_scope_spans_tokens_until_close() {
        assert_eq!(tags(&["Song (Radio Edit Demo)"]), vec!["demo", "radio"]);
        // Closed by `edit)`, so `bonus` is outside.
        assert_eq!(tags(&["Song (Radio Edit) Bonus"]), vec!["radio"]);
        // A token that opens and closes leaves the scope open.
        assert_eq!(tags(&["Song (Edit) Bonus"]), vec!["bonus"]);
        assert_eq!(tags(&["[Heavy Version]"]), vec!["heavy"]);
    }

    #[test]
    fn test_outside_scope_rule() {
        let rules = HashMap::from([("cover", TagScope::OutsideBracket)]);
        let mut out = BTreeSet::new();
        extract_segment("Cover (Cover)", &rules, &mut out);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), vec!["cover"]);

        let mut out = BTreeSet::new();
        extract_segment("(Cover)", &rules, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_overlap() {
        let found = extract_tags(&["Song (Live)"]);
        let blocked: HashSet<String> = ["live".to_string()].into();
        assert!(overlap(&found, &blocked));
        assert!(!overlap(&found, &HashSet::new()));
        assert!(!overlap(&BTreeSet::new(), &blocked));
    }
}
