//! Local (optimistic) application of user actions to the catalog.
//!
//! Each function here is one synchronous transition of the catalog. The
//! remote echo and its confirmation are driven by [`crate::Feed`].

use feed_msg::{FeedComment, FeedItem, ItemContent, PollOption};
use feed_ref::{CommentId, ItemId, OptionId, UserId};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

use crate::{catalog::Catalog, Error};

/// Toggle the user's like. Returns the new like set and whether the user
/// now likes the item.
pub fn like(
    catalog: &mut Catalog,
    item_id: &ItemId,
    user: &UserId,
) -> Result<(BTreeSet<UserId>, bool), Error> {
    let likes = catalog.toggle_like(item_id, user)?;
    let liked = likes.contains(user);
    Ok((likes.clone(), liked))
}

/// Append a comment under a fresh temporary id.
pub fn comment(
    catalog: &mut Catalog,
    item_id: &ItemId,
    author: &UserId,
    body: &str,
    now: i64,
) -> Result<FeedComment, Error> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::InvalidArgument("comment body is empty".into()));
    }

    let comment = FeedComment::new(CommentId::temporary(), author.clone(), body, now);
    catalog.append_comment(item_id, comment.clone())?;
    Ok(comment)
}

/// Add the sharer to the original's share set and create the derivative
/// shared-post item authored by the sharer.
pub fn share(
    catalog: &mut Catalog,
    item_id: &ItemId,
    sharer: &UserId,
    body: Option<&str>,
    now: i64,
) -> Result<FeedItem, Error> {
    let first_share = catalog.add_share(item_id, sharer)?;
    if !first_share {
        debug!("{} shared {} again", sharer, item_id);
    }

    let shared = FeedItem::new(
        ItemId::generate(),
        Some(sharer.clone()),
        now,
        ItemContent::SharedPost {
            shared_post_id: item_id.clone(),
        },
    )
    .with_body(body.map(str::trim).unwrap_or_default());

    catalog.upsert(shared.clone())?;
    Ok(shared)
}

/// Apply a vote. Returns the updated options and whether anything changed
/// (a repeat vote for the same option changes nothing).
pub fn vote(
    catalog: &mut Catalog,
    item_id: &ItemId,
    option_id: &OptionId,
    user: &UserId,
) -> Result<(Vec<PollOption>, bool), Error> {
    let already = catalog
        .get(item_id)
        .ok_or_else(|| Error::not_found("Item", item_id))?
        .voted_option(user)
        .is_some();
    let options = catalog.toggle_vote(item_id, option_id, user)?.to_vec();
    Ok((options, !already))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub item_id: ItemId,
    pub reporter: UserId,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Recorded,
    AlreadyReported,
}

/// Side table of reports, one per (item, reporter). Reports never touch
/// the item itself.
#[derive(Clone, Debug, Default)]
pub struct ReportLog {
    reports: BTreeMap<(ItemId, UserId), Report>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: Report) -> ReportOutcome {
        let key = (report.item_id.clone(), report.reporter.clone());
        if self.reports.contains_key(&key) {
            trace!("{} already reported {}", report.reporter, report.item_id);
            return ReportOutcome::AlreadyReported;
        }
        debug!("{} reported {}", report.reporter, report.item_id);
        self.reports.insert(key, report);
        ReportOutcome::Recorded
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn for_item<'a>(&'a self, item_id: &'a ItemId) -> impl Iterator<Item = &'a Report> + 'a {
        self.reports
            .values()
            .filter(move |report| &report.item_id == item_id)
    }
}
