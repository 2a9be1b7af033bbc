use feed_msg::{FeedItem, ItemKind};
use itertools::Itertools;
use log::trace;
use std::{fmt, str::FromStr};

use crate::{
    catalog::Catalog,
    directory::{FeedEntry, Lookup},
    score::{compare, Scored, SortStrategy},
    suppress::Suppression,
    Error,
};

/// Classification filter selected in the feed's tab bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FeedFilter {
    #[default]
    All,
    Posts,
    Events,
    Jobs,
    Media,
}

impl FeedFilter {
    pub fn matches(&self, item: &FeedItem) -> bool {
        match self {
            FeedFilter::All => true,
            FeedFilter::Posts => matches!(
                item.kind(),
                ItemKind::Post
                    | ItemKind::GroupPost
                    | ItemKind::GroupAnnouncement
                    | ItemKind::SharedPost
            ),
            FeedFilter::Events => {
                matches!(item.kind(), ItemKind::EventInvitation | ItemKind::EventUpdate)
            }
            FeedFilter::Jobs => item.kind() == ItemKind::JobPosting,
            FeedFilter::Media => item.has_media(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFilter::All => "all",
            FeedFilter::Posts => "posts",
            FeedFilter::Events => "events",
            FeedFilter::Jobs => "jobs",
            FeedFilter::Media => "media",
        }
    }
}

impl FromStr for FeedFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(FeedFilter::All),
            "posts" => Ok(FeedFilter::Posts),
            "events" => Ok(FeedFilter::Events),
            "jobs" => Ok(FeedFilter::Jobs),
            "media" => Ok(FeedFilter::Media),
            other => Err(Error::InvalidArgument(format!("unknown filter {:?}", other))),
        }
    }
}

impl fmt::Display for FeedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// One-based.
    pub page: usize,
    pub page_size: usize,
    pub sort: SortStrategy,
    pub filter: FeedFilter,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub entries: Vec<FeedEntry>,
    pub has_more: bool,
    /// Size of the filtered set the page was cut from.
    pub total: usize,
}

impl Page {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id().as_str()).collect()
    }
}

/// Select, classify, suppress, score, sort and slice the catalog.
pub fn plan(
    catalog: &Catalog,
    request: &PageRequest,
    suppression: &Suppression,
    lookup: &dyn Lookup,
    now: i64,
) -> Result<Page, Error> {
    if request.page < 1 {
        return Err(Error::InvalidArgument(format!(
            "page must be at least 1, got {}",
            request.page
        )));
    }
    if request.page_size < 1 {
        return Err(Error::InvalidArgument("page size must be at least 1".into()));
    }

    let ranked: Vec<Scored<'_>> = catalog
        .iter()
        .filter(|item| request.filter.matches(item))
        .filter(|item| !suppression.is_suppressed(item))
        .map(|item| Scored::new(request.sort, item, now))
        .sorted_by(compare)
        .collect();

    let total = ranked.len();
    let start = (request.page - 1).saturating_mul(request.page_size);
    let end = start.saturating_add(request.page_size);
    trace!(
        "plan page {} ({} {}): {}..{} of {}",
        request.page,
        request.sort,
        request.filter,
        start,
        end,
        total
    );

    let entries = ranked
        .iter()
        .skip(start)
        .take(request.page_size)
        .map(|scored| FeedEntry::enrich(scored.item, scored.score, catalog, lookup, suppression))
        .collect();

    Ok(Page {
        entries,
        has_more: end < total,
        total,
    })
}
