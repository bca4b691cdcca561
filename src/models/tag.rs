//! Tag set helpers shared by topics and meetings.

use std::collections::HashSet;

/// Merge two tag lists into a set union.
///
/// Order is first occurrence: every tag of `existing` in its original order,
/// followed by the tags of `incoming` not seen yet. Duplicates on either side
/// are dropped, so repeated meeting edits never grow a topic's tag list.
pub fn union_tags(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(existing.len() + incoming.len());
    existing
        .iter()
        .chain(incoming)
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

/// Trim tags and drop empty ones.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_union_contains_both_sides() {
        let a = tags(&["systems", "async"]);
        let b = tags(&["memory-safety", "async", "ffi"]);
        let merged = union_tags(&a, &b);

        for tag in a.iter().chain(&b) {
            assert!(merged.contains(tag), "missing {}", tag);
        }
        assert_eq!(merged, tags(&["systems", "async", "memory-safety", "ffi"]));
    }

    #[test]
    fn test_union_is_idempotent() {
        let a = tags(&["systems"]);
        let b = tags(&["memory-safety"]);
        let once = union_tags(&a, &b);
        let twice = union_tags(&once, &b);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_union_drops_duplicates_within_one_side() {
        let merged = union_tags(&tags(&["a", "a", "b"]), &[]);
        assert_eq!(merged, tags(&["a", "b"]));
    }

    #[test]
    fn test_union_of_empty_lists() {
        assert!(union_tags(&[], &[]).is_empty());
        assert_eq!(union_tags(&[], &tags(&["x"])), tags(&["x"]));
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(
            normalize_tags(&tags(&[" rust ", "", "  ", "web"])),
            tags(&["rust", "web"])
        );
    }
}
