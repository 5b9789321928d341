//! Nested comment ordering keys
//!
//! Every comment gets a fixed-width token built from its block time and its
//! position in the block. A top-level comment's key is its token; a reply's
//! key is `parent_key + "-" + token`. Ascending lexicographic order of keys
//! is thread display order because `-` sorts before every digit.
//!
//! Depth is capped: once the parent sits at `max_depth` or deeper, its key is
//! truncated to `max_depth` segments before the new token is appended, so
//! deep replies become later siblings at the capped depth.

use chrono::{DateTime, Utc};

use crate::db::schemas::OrderingKeys;

const SEPARATOR: char = '-';

/// Fixed-width token: 13 digits of milliseconds, 6 digits of action sequence
pub fn token(block_time: DateTime<Utc>, action_seq: u32) -> String {
    let millis = block_time.timestamp_millis().max(0);
    format!("{:013}{:06}", millis, action_seq)
}

#[derive(Debug, Clone, Copy)]
pub struct NestedOrdering {
    max_depth: u32,
}

impl NestedOrdering {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Keys and nesting level of a comment replying directly to a post
    pub fn top_level(&self, token: &str) -> (OrderingKeys, u32) {
        (keys_from(token.to_string()), 1)
    }

    /// Keys and nesting level of a reply to a comment
    pub fn reply(&self, parent: &OrderingKeys, parent_level: u32, token: &str) -> (OrderingKeys, u32) {
        let prefix = if parent_level >= self.max_depth {
            truncate_segments(&parent.by_time, self.max_depth as usize)
        } else {
            parent.by_time.as_str()
        };

        let by_time = format!("{}{}{}", prefix, SEPARATOR, token);
        let level = (parent_level + 1).min(self.max_depth + 1);
        (keys_from(by_time), level)
    }
}

fn truncate_segments(key: &str, segments: usize) -> &str {
    match key.match_indices(SEPARATOR).nth(segments.saturating_sub(1)) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

fn keys_from(by_time: String) -> OrderingKeys {
    let (root, child) = match by_time.split_once(SEPARATOR) {
        Some((root, child)) => (root.to_string(), child.to_string()),
        None => (by_time.clone(), String::new()),
    };
    OrderingKeys {
        by_time,
        root,
        child,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tok(n: u32) -> String {
        token(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), n)
    }

    #[test]
    fn test_token_width() {
        let t = tok(7);
        assert_eq!(t.len(), 19);
        assert!(t.ends_with("000007"));
        assert!(tok(8) > t);
    }

    #[test]
    fn test_creation_order_within_depth() {
        let ordering = NestedOrdering::new(3);
        let (a, la) = ordering.top_level(&tok(1));
        let (b, _) = ordering.top_level(&tok(2));
        let (a1, la1) = ordering.reply(&a, la, &tok(3));
        let (a1x, _) = ordering.reply(&a1, la1, &tok(4));
        let (a2, _) = ordering.reply(&a, la, &tok(5));

        let mut keys = vec![
            b.by_time.clone(),
            a2.by_time.clone(),
            a1x.by_time.clone(),
            a.by_time.clone(),
            a1.by_time.clone(),
        ];
        keys.sort();
        assert_eq!(keys, vec![a.by_time, a1.by_time, a1x.by_time, a2.by_time, b.by_time]);
    }

    #[test]
    fn test_depth_cap_makes_siblings() {
        let ordering = NestedOrdering::new(2);
        let (l1, lv1) = ordering.top_level(&tok(1));
        let (l2, lv2) = ordering.reply(&l1, lv1, &tok(2));
        assert_eq!(lv2, 2);

        let (l3, lv3) = ordering.reply(&l2, lv2, &tok(3));
        assert_eq!(lv3, 3);
        assert_eq!(l3.by_time.split('-').count(), 3);

        // Replying below the cap truncates to the capped prefix
        let (l4, lv4) = ordering.reply(&l3, lv3, &tok(4));
        assert_eq!(lv4, 3);
        assert_eq!(l4.by_time.split('-').count(), 3);
        assert!(l4.by_time.starts_with(&l2.by_time));
        assert!(l4.by_time > l3.by_time);
    }

    #[test]
    fn test_root_and_child_split() {
        let ordering = NestedOrdering::new(5);
        let (top, lv) = ordering.top_level(&tok(1));
        assert_eq!(top.root, top.by_time);
        assert_eq!(top.child, "");

        let (reply, _) = ordering.reply(&top, lv, &tok(2));
        assert_eq!(reply.root, top.by_time);
        assert_eq!(reply.child, tok(2));
    }
}
