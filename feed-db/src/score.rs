//! Ranking formulas. Every function here is pure in `(item, now)`.

use feed_msg::FeedItem;
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::Error;

pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;
pub const PINNED_BONUS: f64 = 100.0;
pub const DECAY_FLOOR: f64 = 0.1;
pub const TRENDING_WINDOW_HOURS: f64 = 24.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortStrategy {
    #[default]
    Chronological,
    Top,
    Trending,
}

impl SortStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortStrategy::Chronological => "chronological",
            SortStrategy::Top => "top",
            SortStrategy::Trending => "trending",
        }
    }
}

impl FromStr for SortStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chronological" | "recent" | "latest" => Ok(SortStrategy::Chronological),
            "top" => Ok(SortStrategy::Top),
            "trending" => Ok(SortStrategy::Trending),
            other => Err(Error::InvalidArgument(format!("unknown sort {:?}", other))),
        }
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age in hours, clamped at zero for items stamped in the future.
pub fn age_hours(item: &FeedItem, now: i64) -> f64 {
    (now.saturating_sub(item.timestamp) as f64 / MILLIS_PER_HOUR).max(0.0)
}

/// Logarithmic decay, floored so old items never reach zero.
pub fn decay(age_hours: f64) -> f64 {
    (1.0 / (1.0 + (1.0 + age_hours).ln())).max(DECAY_FLOOR)
}

pub fn engagement(item: &FeedItem) -> f64 {
    2.0 * item.likes.len() as f64
        + 3.0 * item.comments.len() as f64
        + 4.0 * item.shares.len() as f64
        + 0.01 * item.views as f64
}

pub fn chronological_score(item: &FeedItem) -> f64 {
    item.timestamp as f64
}

pub fn top_score(item: &FeedItem, now: i64) -> f64 {
    let bonus = if item.pinned { PINNED_BONUS } else { 0.0 };
    engagement(item) * decay(age_hours(item, now)) + bonus
}

pub fn trending_score(item: &FeedItem, now: i64) -> f64 {
    let recent = item.likes.len() as f64
        + 2.0 * item.comments.len() as f64
        + 3.0 * item.shares.len() as f64;
    if age_hours(item, now) < TRENDING_WINDOW_HOURS {
        2.0 * recent
    } else {
        recent
    }
}

pub fn score(strategy: SortStrategy, item: &FeedItem, now: i64) -> f64 {
    match strategy {
        SortStrategy::Chronological => chronological_score(item),
        SortStrategy::Top => top_score(item, now),
        SortStrategy::Trending => trending_score(item, now),
    }
}

/// An item paired with the score of one ranking pass.
#[derive(Clone, Copy, Debug)]
pub struct Scored<'a> {
    pub item: &'a FeedItem,
    pub score: f64,
}

impl<'a> Scored<'a> {
    pub fn new(strategy: SortStrategy, item: &'a FeedItem, now: i64) -> Self {
        Scored {
            item,
            score: score(strategy, item, now),
        }
    }
}

/// Score descending, then newer first, then id so the order is total.
pub fn compare(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.item.timestamp.cmp(&a.item.timestamp))
        .then_with(|| a.item.id.cmp(&b.item.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_msg::{FeedComment, ItemContent};
    use feed_ref::{CommentId, UserId};

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn item(id: &str, age_hours: i64, likes: usize) -> FeedItem {
        let mut item = FeedItem::new(id.parse().unwrap(), None, NOW - age_hours * HOUR, ItemContent::Post);
        for n in 0..likes {
            item.likes.insert(format!("u{}", n).parse::<UserId>().unwrap());
        }
        item
    }

    #[test]
    fn decay_shape() {
        assert_eq!(decay(0.0), 1.0);
        assert!((decay(1.0) - 1.0 / (1.0 + 2f64.ln())).abs() < 1e-12);
        assert_eq!(decay(1e9), DECAY_FLOOR);
    }

    #[test]
    fn future_items_do_not_get_negative_age() {
        let fresh = item("f", -5, 0);
        assert_eq!(age_hours(&fresh, NOW), 0.0);
    }

    #[test]
    fn top_score_weights() {
        let mut it = item("x", 0, 1);
        it.shares.insert("s".parse().unwrap());
        it.comments.push(FeedComment::new(CommentId::generate(), "c".parse().unwrap(), "hi", NOW));
        it.views = 100;
        // 2 + 3 + 4 + 1, no decay at age zero
        assert!((top_score(&it, NOW) - 10.0).abs() < 1e-9);
        it.pinned = true;
        assert!((top_score(&it, NOW) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn top_score_decays_monotonically() {
        let mut previous = f64::MAX;
        for age in [0, 1, 2, 5, 10, 24, 100, 1_000, 100_000] {
            let current = top_score(&item("x", age, 7), NOW);
            assert!(current <= previous, "age {} scored {} > {}", age, current, previous);
            previous = current;
        }
    }

    #[test]
    fn pinned_item_beats_higher_engagement_when_decay_is_strong_enough() {
        // raw 50 pinned vs raw 150 unpinned, both two hours old
        let mut pinned = item("pinned", 2, 25);
        pinned.pinned = true;
        let unpinned = item("viral", 2, 75);
        let d = decay(2.0);
        assert!(50.0 * d + PINNED_BONUS > 150.0 * d);
        assert!(top_score(&pinned, NOW) > top_score(&unpinned, NOW));
    }

    #[test]
    fn viral_item_can_override_pin() {
        // raw 50 pinned vs raw 400 unpinned, one hour old: 29.5 + 100 < 236
        let mut pinned = item("pinned", 1, 25);
        pinned.pinned = true;
        let viral = item("viral", 1, 200);
        assert!(top_score(&viral, NOW) > top_score(&pinned, NOW));
    }

    #[test]
    fn trending_doubles_inside_the_window() {
        let fresh = item("fresh", 23, 3);
        let stale = item("stale", 25, 3);
        assert_eq!(trending_score(&fresh, NOW), 6.0);
        assert_eq!(trending_score(&stale, NOW), 3.0);
    }

    #[test]
    fn ties_break_on_timestamp_then_id() {
        let older = item("a", 5, 0);
        let newer = item("b", 1, 0);
        let twin = item("c", 1, 0);
        let mut scored = vec![
            Scored::new(SortStrategy::Trending, &older, NOW),
            Scored::new(SortStrategy::Trending, &twin, NOW),
            Scored::new(SortStrategy::Trending, &newer, NOW),
        ];
        scored.sort_by(compare);
        let ids: Vec<&str> = scored.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn parse_sort_names() {
        assert_eq!("Top".parse::<SortStrategy>().unwrap(), SortStrategy::Top);
        assert_eq!("recent".parse::<SortStrategy>().unwrap(), SortStrategy::Chronological);
        assert!("hot".parse::<SortStrategy>().is_err());
    }
}
