//! Comment tree reconstruction
//!
//! Comment batches for one article arrive from three paths (the article page,
//! numbered comment pages and incremental "load more" responses) and may name
//! the same comment by different id encodings: a canonical element id such as
//! `wpd-comm-123_0` or the bare numeric id `123`. [`merge`] resolves parents
//! across both encodings, computes depths, drops duplicates and puts the set
//! into canonical `(timestamp, depth)` order.

use crate::model::Comment;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Result of merging comment batches
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub comments: Vec<Comment>,
    /// Comments whose parent could not be resolved and became roots
    pub demoted: usize,
    /// Later copies of an id already seen, dropped
    pub duplicates: usize,
}

/// One line of the display-only threaded listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry {
    /// Position in the canonical comment slice
    pub index: usize,
    pub display_depth: u32,
}

/// Numeric core of a comment id
///
/// Accepts an optional alphabetic/dash prefix, the digits, and an optional
/// `_N` suffix: `wpd-comm-123_0`, `comment-123` and `123` all yield `123`.
pub fn short_id(id: &str) -> Option<&str> {
    let rest = id.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '-');
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }

    let (digits, tail) = rest.split_at(end);
    let valid_tail = tail.is_empty()
        || tail
            .strip_prefix('_')
            .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    valid_tail.then_some(digits)
}

/// Two-key lookup from comment id to the index of its first occurrence
struct IdIndex<'a> {
    canonical: HashMap<&'a str, usize>,
    short: HashMap<&'a str, usize>,
}

impl<'a> IdIndex<'a> {
    fn build(comments: &'a [Comment]) -> Self {
        let mut canonical = HashMap::with_capacity(comments.len());
        let mut short = HashMap::with_capacity(comments.len());
        for (i, comment) in comments.iter().enumerate() {
            canonical.entry(comment.id.as_str()).or_insert(i);
            if let Some(key) = short_id(&comment.id) {
                short.entry(key).or_insert(i);
            }
        }
        Self { canonical, short }
    }

    fn resolve(&self, reference: &str) -> Option<usize> {
        self.canonical
            .get(reference)
            .or_else(|| short_id(reference).and_then(|key| self.short.get(key)))
            .copied()
    }

    fn is_first(&self, index: usize, id: &str) -> bool {
        self.canonical.get(id) == Some(&index)
    }
}

/// Merges concatenated comment batches into the canonical set
pub fn merge(comments: Vec<Comment>) -> Vec<Comment> {
    merge_with_report(comments).comments
}

/// [`merge`], also reporting demotions and dropped duplicates
pub fn merge_with_report(mut comments: Vec<Comment>) -> MergeReport {
    let n = comments.len();
    let mut demoted = 0;

    let mut parents: Vec<Option<usize>> = {
        let index = IdIndex::build(&comments);
        comments
            .iter()
            .enumerate()
            .map(|(i, comment)| {
                let reference = comment.parent_id.as_deref()?;
                match index.resolve(reference) {
                    Some(p) if p != i => Some(p),
                    _ => {
                        if index.is_first(i, &comment.id) {
                            debug!(
                                "Comment {} references missing parent {}; treating as root",
                                comment.id, reference
                            );
                            demoted += 1;
                        }
                        None
                    }
                }
            })
            .collect()
    };

    // Depths follow resolved parents; a reference cycle is broken at the
    // node where it is detected, which becomes a root.
    let mut depths: Vec<Option<u32>> = vec![None; n];
    let mut on_path = vec![false; n];
    for start in 0..n {
        let mut path = Vec::new();
        let mut current = start;
        while depths[current].is_none() {
            if on_path[current] {
                warn!("Comment {} is part of a reply cycle; treating as root", comments[current].id);
                parents[current] = None;
                depths[current] = Some(0);
                demoted += 1;
                break;
            }
            on_path[current] = true;
            path.push(current);
            match parents[current] {
                Some(parent) => current = parent,
                None => depths[current] = Some(0),
            }
        }
        while let Some(node) = path.pop() {
            on_path[node] = false;
            if depths[node].is_none() {
                let parent_depth = parents[node].and_then(|p| depths[p]);
                depths[node] = Some(parent_depth.map_or(0, |d| d + 1));
            }
        }
    }

    let parent_ids: Vec<Option<String>> = parents
        .iter()
        .map(|p| p.map(|p| comments[p].id.clone()))
        .collect();

    let mut seen = HashSet::with_capacity(n);
    let mut merged = Vec::with_capacity(n);
    for (i, mut comment) in comments.drain(..).enumerate() {
        if !seen.insert(comment.id.clone()) {
            continue;
        }
        comment.parent_id = parent_ids[i].clone();
        comment.depth = depths[i].unwrap_or(0);
        merged.push(comment);
    }
    let duplicates = n - merged.len();

    // Stable: equal keys keep input order, so earlier batches stay first
    merged.sort_by_key(|c| (c.timestamp, c.depth));

    if demoted > 0 {
        debug!("{} comment(s) demoted to root after parent resolution", demoted);
    }

    MergeReport {
        comments: merged,
        demoted,
        duplicates,
    }
}

/// Depth-first reading order for human-readable threading
///
/// Replies are grouped under their parent, roots and siblings keep canonical
/// order. This listing is for display only and never feeds back into stored
/// order or depth.
pub fn threaded_order(comments: &[Comment]) -> Vec<ThreadEntry> {
    let positions: HashMap<&str, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut roots = Vec::new();
    for (i, comment) in comments.iter().enumerate() {
        match comment
            .parent_id
            .as_deref()
            .and_then(|p| positions.get(p))
            .filter(|&&p| p != i)
        {
            Some(&parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    let mut order = Vec::with_capacity(comments.len());
    let mut visited = vec![false; comments.len()];
    let mut walk = |root: usize, order: &mut Vec<ThreadEntry>, visited: &mut Vec<bool>| {
        let mut stack = vec![(root, 0u32)];
        while let Some((node, depth)) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            order.push(ThreadEntry {
                index: node,
                display_depth: depth,
            });
            for &child in children[node].iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    };

    for &root in &roots {
        walk(root, &mut order, &mut visited);
    }
    // Anything left sits on a parent cycle; list it flat
    for i in 0..comments.len() {
        if !visited[i] {
            walk(i, &mut order, &mut visited);
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    const ARTICLE: &str = "https://e.com/a/";

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 14, 12, minute, 0).unwrap()
    }

    fn c(id: &str, parent: Option<&str>, minute: Option<u32>) -> Comment {
        let mut comment = Comment::new(id, ARTICLE);
        comment.parent_id = parent.map(str::to_string);
        comment.timestamp = minute.map(at);
        comment
    }

    fn find<'a>(comments: &'a [Comment], id: &str) -> &'a Comment {
        comments.iter().find(|c| c.id == id).unwrap()
    }

    fn assert_invariants(comments: &[Comment]) {
        let ids: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), comments.len(), "duplicate ids");

        for comment in comments {
            match &comment.parent_id {
                None => assert_eq!(comment.depth, 0),
                Some(parent) => {
                    let parent = find(comments, parent);
                    assert_eq!(comment.depth, parent.depth + 1);
                }
            }
        }

        for pair in comments.windows(2) {
            assert!((pair[0].timestamp, pair[0].depth) <= (pair[1].timestamp, pair[1].depth));
        }
    }

    #[test]
    fn test_short_id_forms() {
        assert_eq!(short_id("wpd-comm-123_0"), Some("123"));
        assert_eq!(short_id("comment-5"), Some("5"));
        assert_eq!(short_id("9"), Some("9"));
        assert_eq!(short_id("123_45"), Some("123"));
        assert_eq!(short_id("abc"), None);
        assert_eq!(short_id("12ab"), None);
        assert_eq!(short_id("5f3a9c0d1e2b"), None);
    }

    #[test]
    fn test_parent_across_batches() {
        let batch_a = vec![c("5", None, Some(1))];
        let batch_b = vec![c("9", Some("5"), Some(2))];
        let merged = merge(batch_a.into_iter().chain(batch_b).collect());

        assert_eq!(find(&merged, "5").depth, 0);
        assert_eq!(find(&merged, "9").depth, 1);
        assert_invariants(&merged);
    }

    #[test]
    fn test_overlapping_batches_keep_earlier_record() {
        let mut from_pages = c("9", None, Some(3));
        from_pages.text_clean = "from pagination".to_string();
        let mut from_load_more = c("9", None, Some(3));
        from_load_more.text_clean = "from load more".to_string();

        let report = merge_with_report(vec![c("1", None, Some(1)), from_pages, from_load_more]);

        let nines: Vec<&Comment> = report.comments.iter().filter(|c| c.id == "9").collect();
        assert_eq!(nines.len(), 1);
        assert_eq!(nines[0].text_clean, "from pagination");
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn test_short_and_canonical_ids_resolve_each_other() {
        let comments = vec![
            c("wpd-comm-5_0", None, Some(1)),
            c("9", Some("5"), Some(2)),
            c("wpd-comm-12_9", Some("wpd-comm-9_5"), Some(3)),
        ];
        let merged = merge(comments);

        let reply = find(&merged, "9");
        assert_eq!(reply.parent_id.as_deref(), Some("wpd-comm-5_0"));
        assert_eq!(reply.depth, 1);

        let nested = find(&merged, "wpd-comm-12_9");
        assert_eq!(nested.parent_id.as_deref(), Some("9"));
        assert_eq!(nested.depth, 2);
        assert_invariants(&merged);
    }

    #[test]
    fn test_dangling_parent_demoted() {
        let report = merge_with_report(vec![c("9", Some("404"), Some(1)), c("10", Some("9"), Some(2))]);

        let orphan = find(&report.comments, "9");
        assert_eq!(orphan.parent_id, None);
        assert_eq!(orphan.depth, 0);
        assert_eq!(find(&report.comments, "10").depth, 1);
        assert_eq!(report.demoted, 1);
    }

    #[test]
    fn test_missing_timestamp_sorts_first() {
        let merged = merge(vec![c("2", None, Some(5)), c("1", None, None), c("3", None, Some(1))]);
        let order: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["1", "3", "2"]);
    }

    #[test]
    fn test_equal_timestamps_sorted_by_depth_then_input() {
        let merged = merge(vec![
            c("20", Some("10"), Some(1)),
            c("10", None, Some(1)),
            c("11", None, Some(1)),
        ]);
        let order: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["10", "11", "20"]);
    }

    #[test]
    fn test_self_and_cyclic_parents_become_roots() {
        let report = merge_with_report(vec![
            c("1", Some("1"), Some(1)),
            c("2", Some("3"), Some(2)),
            c("3", Some("2"), Some(3)),
        ]);
        assert_eq!(find(&report.comments, "1").depth, 0);
        assert_invariants(&report.comments);
        assert!(report.demoted >= 2);
    }

    #[test]
    fn test_deep_chain_depths() {
        let mut comments = vec![c("0", None, Some(0))];
        for i in 1..50u32 {
            let parent = (i - 1).to_string();
            comments.push(c(&i.to_string(), Some(&parent), Some(i.min(59))));
        }
        // Reverse so children precede parents in input
        comments.reverse();
        let merged = merge(comments);
        assert_eq!(find(&merged, "49").depth, 49);
        assert_invariants(&merged);
    }

    #[test]
    fn test_threaded_order_groups_replies() {
        let merged = merge(vec![
            c("1", None, Some(1)),
            c("2", None, Some(2)),
            c("3", Some("1"), Some(3)),
            c("4", Some("3"), Some(4)),
        ]);
        let listing: Vec<(&str, u32)> = threaded_order(&merged)
            .iter()
            .map(|e| (merged[e.index].id.as_str(), e.display_depth))
            .collect();

        assert_eq!(listing, vec![("1", 0), ("3", 1), ("4", 2), ("2", 0)]);
        // Canonical order is untouched
        let canonical: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(canonical, vec!["1", "2", "3", "4"]);
    }
}
