use feed_msg::FeedItem;
use feed_ref::{ItemId, UserId};
use log::trace;
use std::collections::HashSet;

use crate::{
    directory::{FeedEntry, Linked},
    plan::{FeedFilter, Page, PageRequest},
    score::SortStrategy,
    suppress::Suppression,
};

/// Client-visible state of the feed screen. Holds no ranking logic; it only
/// merges what the planner, the reconciler and the realtime layer hand it.
#[derive(Clone, Debug, Default)]
pub struct FeedView {
    entries: Vec<FeedEntry>,
    sort: SortStrategy,
    filter: FeedFilter,
    page: usize,
    has_more: bool,
    loading: bool,
    error: Option<String>,
}

impl FeedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id().as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&FeedEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    pub fn sort(&self) -> SortStrategy {
        self.sort
    }

    pub fn filter(&self) -> FeedFilter {
        self.filter
    }

    /// Last page merged, zero before the first load.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the shown entries were ranked with `sort` and `filter`.
    pub fn is_ranked_by(&self, sort: SortStrategy, filter: FeedFilter) -> bool {
        self.sort == sort && self.filter == filter
    }

    pub fn begin_load(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// Page one replaces the list; later pages append whatever is not
    /// already shown. The request's sort and filter become the view's.
    pub fn apply_page(&mut self, request: &PageRequest, result: Page) {
        let page = request.page;
        if page <= 1 {
            self.entries = result.entries;
        } else {
            let shown: HashSet<ItemId> = self.entries.iter().map(|e| e.id().clone()).collect();
            self.entries.extend(
                result
                    .entries
                    .into_iter()
                    .filter(|entry| !shown.contains(entry.id())),
            );
        }
        self.sort = request.sort;
        self.filter = request.filter;
        self.page = page;
        self.has_more = result.has_more;
        self.loading = false;
        trace!("view holds {} entries after page {}", self.entries.len(), page);
    }

    pub fn fail_load(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
    }

    /// Put an entry at the head unless it is already shown.
    pub fn prepend(&mut self, entry: FeedEntry) -> bool {
        if self.contains(entry.id()) {
            return false;
        }
        self.entries.insert(0, entry);
        true
    }

    /// Replace the shown copy of an item, keeping its position and score.
    /// Comments hidden by `suppression` are left out.
    pub fn refresh(&mut self, item: &FeedItem, suppression: &Suppression) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id() == &item.id) {
            Some(entry) => {
                entry.item = suppression.visible(item);
                if let Some(Linked::SharedPost(original)) = entry.linked.as_mut() {
                    original
                        .comments
                        .retain(|comment| !suppression.is_comment_suppressed(comment));
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_item(&mut self, id: &ItemId) -> bool {
        self.retain(|entry| entry.id() != id) > 0
    }

    pub fn remove_author(&mut self, author: &UserId) -> usize {
        self.retain(|entry| entry.item.author_id.as_ref() != Some(author))
    }

    /// Keep entries matching the predicate; returns how many were removed.
    pub fn retain(&mut self, keep: impl FnMut(&FeedEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(keep);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_msg::{FeedComment, ItemContent};
    use feed_ref::CommentId;

    fn entry(id: &str, author: &str) -> FeedEntry {
        FeedEntry {
            item: FeedItem::new(id.parse().unwrap(), Some(author.parse().unwrap()), 0, ItemContent::Post),
            score: 0.0,
            author: None,
            linked: None,
        }
    }

    fn request(page: usize, sort: SortStrategy, filter: FeedFilter) -> PageRequest {
        PageRequest {
            page,
            page_size: 2,
            sort,
            filter,
        }
    }

    fn page(entries: Vec<FeedEntry>, has_more: bool) -> Page {
        Page {
            total: entries.len(),
            entries,
            has_more,
        }
    }

    #[test]
    fn later_pages_append_without_duplicates() {
        let mut view = FeedView::new();
        view.begin_load();
        assert!(view.is_loading());
        let top = |n| request(n, SortStrategy::Top, FeedFilter::All);
        view.apply_page(&top(1), page(vec![entry("a", "x"), entry("b", "x")], true));
        view.apply_page(&top(2), page(vec![entry("b", "x"), entry("c", "y")], false));
        assert_eq!(view.ids(), vec!["a", "b", "c"]);
        assert!(!view.has_more());
        assert!(!view.is_loading());
        assert_eq!(view.page(), 2);

        view.apply_page(&top(1), page(vec![entry("z", "x")], false));
        assert_eq!(view.ids(), vec!["z"]);
    }

    #[test]
    fn prepend_refresh_and_removal() {
        let mut view = FeedView::new();
        view.apply_page(
            &request(1, SortStrategy::Top, FeedFilter::All),
            page(vec![entry("a", "x"), entry("b", "y")], false),
        );

        assert!(view.prepend(entry("n", "y")));
        assert!(!view.prepend(entry("a", "x")));
        assert_eq!(view.ids(), vec!["n", "a", "b"]);

        let mut updated = entry("a", "x").item;
        updated.body = "edited".into();
        assert!(view.refresh(&updated, &Suppression::default()));
        assert_eq!(view.get(&"a".parse().unwrap()).unwrap().item.body, "edited");
        assert_eq!(view.ids(), vec!["n", "a", "b"]);

        assert_eq!(view.remove_author(&"y".parse().unwrap()), 2);
        assert_eq!(view.ids(), vec!["a"]);
        assert!(view.remove_item(&"a".parse().unwrap()));
        assert!(view.is_empty());
    }

    #[test]
    fn failed_load_keeps_entries_and_ranking() {
        let mut view = FeedView::new();
        view.apply_page(
            &request(1, SortStrategy::Top, FeedFilter::Jobs),
            page(vec![entry("a", "x")], true),
        );
        view.begin_load();
        view.fail_load("page must be at least 1");
        assert_eq!(view.error(), Some("page must be at least 1"));
        assert_eq!(view.len(), 1);
        assert!(view.is_ranked_by(SortStrategy::Top, FeedFilter::Jobs));
        assert!(!view.is_ranked_by(SortStrategy::Chronological, FeedFilter::Jobs));
        assert_eq!(view.page(), 1);
    }

    #[test]
    fn refresh_leaves_out_muted_comments() {
        let mut view = FeedView::new();
        view.apply_page(
            &request(1, SortStrategy::Top, FeedFilter::All),
            page(vec![entry("a", "x")], false),
        );
        let mut updated = entry("a", "x").item;
        updated.comments = vec![
            FeedComment::new(CommentId::generate(), "y".parse().unwrap(), "nice", 1),
            FeedComment::new(CommentId::generate(), "troll".parse().unwrap(), "spam", 2),
        ];
        let mut suppression = Suppression::default();
        suppression.mute_author("troll".parse().unwrap());

        assert!(view.refresh(&updated, &suppression));
        let shown = &view.get(&"a".parse().unwrap()).unwrap().item.comments;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "nice");
    }
}
