//! Push-event subscription and the merge of pushed events into local state.

use feed_msg::{EventKind, FeedComment, FeedItem, PushEvent, PushPayload};
use feed_ref::{ItemId, UserId};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{task::JoinHandle, time::interval};

use crate::{
    catalog::{Catalog, Upserted},
    directory::{FeedEntry, Lookup},
    score,
    suppress::Suppression,
    view::FeedView,
};

type Handler = Box<dyn FnMut(&PushEvent) + Send>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// In-process push-event source. Whatever transport delivers the events
/// (timer, socket, long-poll) calls [`PushHub::emit`].
///
/// Handlers run while the hub is locked and must not emit or subscribe.
#[derive(Clone, Default)]
pub struct PushHub {
    inner: Arc<Mutex<HubInner>>,
}

/// Registration handle. Unsubscribes when consumed or dropped.
pub struct Subscription {
    hub: Weak<Mutex<HubInner>>,
    kind: EventKind,
    id: u64,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: FnMut(&PushEvent) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Deliver one event to every handler of its kind. Returns how many ran.
    pub fn emit(&self, event: &PushEvent) -> usize {
        let mut inner = self.inner.lock();
        match inner.handlers.get_mut(&event.kind()) {
            Some(handlers) => {
                for (_, handler) in handlers.iter_mut() {
                    handler(event);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            if let Some(handlers) = inner.lock().handlers.get_mut(&self.kind) {
                handlers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// Emit `events` through the hub one at a time, one per `period`.
pub fn replay(hub: PushHub, events: Vec<PushEvent>, period: Duration) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut delivered = 0;
        for event in events {
            ticker.tick().await;
            trace!("replay {:?} event", event.kind());
            hub.emit(&event);
            delivered += 1;
        }
        delivered
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New to the catalog and surfaced at the head of the view.
    Inserted,
    /// Catalog changed; the view's copy was refreshed if shown.
    Updated,
    /// Already reflected in the catalog.
    Duplicate,
    /// Referenced item unknown, or the pushed item was invalid.
    Dropped,
    /// Folded into the catalog but kept out of the view (muted author or keyword).
    Suppressed,
    /// Folded into the catalog but outside the view's classification filter.
    Filtered,
}

pub struct MergeContext<'a> {
    pub catalog: &'a mut Catalog,
    pub view: &'a mut FeedView,
    pub suppression: &'a Suppression,
    pub lookup: &'a dyn Lookup,
    pub now: i64,
}

/// Fold one pushed event into the catalog and the view.
pub fn merge(ctx: &mut MergeContext<'_>, event: PushEvent) -> MergeOutcome {
    let outcome = match event.payload {
        PushPayload::NewItem(item) => merge_item(ctx, item),
        PushPayload::Like {
            item_id,
            user_id,
            liked,
        } => merge_like(ctx, &item_id, &user_id, liked),
        PushPayload::Comment { item_id, comment } => merge_comment(ctx, &item_id, comment),
        PushPayload::Share {
            item_id,
            user_id,
            shared_item,
        } => merge_share(ctx, &item_id, &user_id, shared_item),
    };
    debug!("merged push event stamped {}: {:?}", event.timestamp, outcome);
    outcome
}

fn merge_item(ctx: &mut MergeContext<'_>, item: FeedItem) -> MergeOutcome {
    let id = item.id.clone();
    let upserted = match ctx.catalog.upsert(item) {
        Ok(upserted) => upserted,
        Err(err) => {
            warn!("dropping pushed item {}, cause: {}", id, err);
            return MergeOutcome::Dropped;
        }
    };
    let stored = match ctx.catalog.get(&id) {
        Some(stored) => stored,
        None => return MergeOutcome::Dropped,
    };

    match upserted {
        Upserted::Unchanged => MergeOutcome::Duplicate,
        Upserted::Replaced => {
            if ctx.suppression.is_suppressed(stored) {
                ctx.view.remove_item(&id);
                return MergeOutcome::Suppressed;
            }
            ctx.view.refresh(stored, ctx.suppression);
            MergeOutcome::Updated
        }
        Upserted::Inserted => {
            if ctx.suppression.is_suppressed(stored) {
                return MergeOutcome::Suppressed;
            }
            if !ctx.view.filter().matches(stored) {
                return MergeOutcome::Filtered;
            }
            // realtime arrivals go to the head whatever the active sort
            let score = score::score(ctx.view.sort(), stored, ctx.now);
            let entry =
                FeedEntry::enrich(stored, score, ctx.catalog, ctx.lookup, ctx.suppression);
            if ctx.view.prepend(entry) {
                MergeOutcome::Inserted
            } else {
                MergeOutcome::Duplicate
            }
        }
    }
}

fn merge_like(ctx: &mut MergeContext<'_>, item_id: &ItemId, user: &UserId, liked: bool) -> MergeOutcome {
    if !ctx.catalog.contains(item_id) {
        return MergeOutcome::Dropped;
    }
    match ctx.catalog.set_like(item_id, user, liked) {
        Ok(true) => surface(ctx, item_id, user),
        Ok(false) => MergeOutcome::Duplicate,
        Err(_) => MergeOutcome::Dropped,
    }
}

fn merge_comment(ctx: &mut MergeContext<'_>, item_id: &ItemId, comment: FeedComment) -> MergeOutcome {
    if !ctx.catalog.contains(item_id) {
        return MergeOutcome::Dropped;
    }
    let hidden = ctx.suppression.is_comment_suppressed(&comment);
    let author = comment.author_id.clone();
    match ctx.catalog.append_comment(item_id, comment) {
        Ok(true) if hidden => MergeOutcome::Suppressed,
        Ok(true) => surface(ctx, item_id, &author),
        Ok(false) => MergeOutcome::Duplicate,
        Err(_) => MergeOutcome::Dropped,
    }
}

fn merge_share(
    ctx: &mut MergeContext<'_>,
    item_id: &ItemId,
    user: &UserId,
    shared_item: Option<FeedItem>,
) -> MergeOutcome {
    if !ctx.catalog.contains(item_id) {
        return MergeOutcome::Dropped;
    }
    let outcome = match ctx.catalog.add_share(item_id, user) {
        Ok(true) => surface(ctx, item_id, user),
        Ok(false) => MergeOutcome::Duplicate,
        Err(_) => return MergeOutcome::Dropped,
    };

    match shared_item.map(|item| merge_item(ctx, item)) {
        Some(MergeOutcome::Inserted) => MergeOutcome::Inserted,
        Some(derived) if outcome == MergeOutcome::Duplicate => derived,
        _ => outcome,
    }
}

/// Refresh the view's copy of an item after `actor` changed it, unless
/// the actor is muted.
fn surface(ctx: &mut MergeContext<'_>, item_id: &ItemId, actor: &UserId) -> MergeOutcome {
    if ctx.suppression.is_muted(actor) {
        return MergeOutcome::Suppressed;
    }
    if let Some(item) = ctx.catalog.get(item_id) {
        ctx.view.refresh(item, ctx.suppression);
    }
    MergeOutcome::Updated
}
