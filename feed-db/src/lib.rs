use feed_msg::{EventKind, FeedComment, FeedItem, MsgError, PollOption, PushEvent};
use feed_ref::{CommentId, ItemId, OptionId, RefError, UserId};
use log::{debug, info, trace, warn};
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error as ThisError;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};

pub mod catalog;
pub mod clock;
pub mod config;
pub mod directory;
pub mod outbox;
pub mod plan;
pub mod realtime;
pub mod reconcile;
pub mod remote;
pub mod score;
pub mod suppress;
pub mod view;

pub use catalog::Catalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, RemoteConfig};
pub use directory::{Directory, DirectorySeed, FeedEntry, Linked, Lookup};
pub use outbox::{MutationId, MutationState, Outbox, PendingMutation};
pub use plan::{FeedFilter, Page, PageRequest};
pub use realtime::{MergeOutcome, PushHub, Subscription};
pub use reconcile::{Report, ReportLog, ReportOutcome};
pub use remote::{Confirmation, Mutation, Remote, RemoteError, SimulatedRemote};
pub use score::SortStrategy;
pub use suppress::Suppression;
pub use view::FeedView;

use realtime::MergeContext;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{user} already voted on {item}")]
    AlreadyVoted { item: ItemId, user: UserId },
    #[error("Mutation {mutation} failed, cause: {cause}")]
    TransientFailure {
        mutation: MutationId,
        #[source]
        cause: RemoteError,
    },
    #[error("Config error, cause: {0}")]
    Config(#[from] ConfigError),
    #[error("Item error, cause: {0}")]
    Msg(#[from] MsgError),
    #[error("Ref error, cause: {0}")]
    Ref(#[from] RefError),
}

impl Error {
    pub(crate) fn not_found(what: &'static str, id: impl fmt::Display) -> Self {
        Error::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Whether the failure came from the remote and the mutation may be
    /// retried through [`Feed::retry`].
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientFailure { .. })
    }
}

struct RealtimeLink {
    // dropping these unsubscribes
    _subscriptions: Vec<Subscription>,
    events: UnboundedReceiver<PushEvent>,
}

/// The feed of one signed-in user: canonical catalog, the visible view, and
/// the optimistic mutation pipeline towards the remote.
pub struct Feed<R: Remote> {
    user: UserId,
    config: Config,
    catalog: Catalog,
    view: FeedView,
    suppression: Suppression,
    reports: ReportLog,
    outbox: Outbox,
    directory: Directory,
    remote: R,
    clock: Arc<dyn Clock>,
    realtime: Option<RealtimeLink>,
}

impl<R: Remote> Feed<R> {
    pub fn new(user: UserId, config: Config, remote: R) -> Result<Self, Error> {
        config.validate()?;
        let suppression = Suppression::new(
            config.muted_authors.iter().cloned(),
            config.muted_keywords.iter().cloned(),
        )?;

        Ok(Feed {
            user,
            config,
            catalog: Catalog::new(),
            view: FeedView::new(),
            suppression,
            reports: ReportLog::new(),
            outbox: Outbox::new(),
            directory: Directory::new(),
            remote,
            clock: Arc::new(SystemClock),
            realtime: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_directory(mut self, directory: Directory) -> Self {
        self.directory = directory;
        self
    }

    /// Load items into the catalog. Returns how many were new.
    pub fn seed(&mut self, items: impl IntoIterator<Item = FeedItem>) -> Result<usize, Error> {
        let mut inserted = 0;
        for item in items {
            if self.catalog.upsert(item)? == catalog::Upserted::Inserted {
                inserted += 1;
            }
        }
        info!("seeded {} items, catalog holds {}", inserted, self.catalog.len());
        Ok(inserted)
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn view(&self) -> &FeedView {
        &self.view
    }

    pub fn suppression(&self) -> &Suppression {
        &self.suppression
    }

    pub fn reports(&self) -> &ReportLog {
        &self.reports
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    // paging

    pub fn get_page(
        &mut self,
        page: usize,
        sort: SortStrategy,
        filter: FeedFilter,
    ) -> Result<Page, Error> {
        if page > 1 && !self.view.is_ranked_by(sort, filter) {
            return Err(Error::InvalidArgument(format!(
                "page {} requested with {} {}, but the view is ranked by {} {}; load page 1 first",
                page,
                sort,
                filter,
                self.view.sort(),
                self.view.filter()
            )));
        }

        self.view.begin_load();
        let request = PageRequest {
            page,
            page_size: self.config.page_size,
            sort,
            filter,
        };

        match plan::plan(
            &self.catalog,
            &request,
            &self.suppression,
            &self.directory,
            self.now(),
        ) {
            Ok(result) => {
                self.view.apply_page(&request, result.clone());
                Ok(result)
            }
            Err(err) => {
                self.view.fail_load(err.to_string());
                Err(err)
            }
        }
    }

    /// Fetch the page after the last one merged, if there is one.
    pub fn load_more(&mut self) -> Result<Page, Error> {
        if !self.view.has_more() {
            return Ok(Page::empty());
        }
        self.get_page(self.view.page() + 1, self.view.sort(), self.view.filter())
    }

    /// Reload the first page with the current sort and filter.
    pub fn refresh(&mut self) -> Result<Page, Error> {
        self.get_page(1, self.view.sort(), self.view.filter())
    }

    // optimistic mutations

    pub async fn like_toggle(&mut self, item_id: &ItemId) -> Result<BTreeSet<UserId>, Error> {
        let (likes, liked) = reconcile::like(&mut self.catalog, item_id, &self.user)?;
        self.refresh_view(item_id);

        self.send(Mutation::Like {
            item_id: item_id.clone(),
            user_id: self.user.clone(),
            liked,
        })
        .await?;
        Ok(likes)
    }

    /// Append a comment locally under a temporary id and swap in the
    /// authoritative id once the remote confirms.
    pub async fn add_comment(&mut self, item_id: &ItemId, body: &str) -> Result<FeedComment, Error> {
        let now = self.now();
        let local = reconcile::comment(&mut self.catalog, item_id, &self.user, body, now)?;
        self.refresh_view(item_id);

        let confirmation = self
            .send(Mutation::Comment {
                item_id: item_id.clone(),
                comment_id: local.id.clone(),
                author_id: self.user.clone(),
                body: local.body.clone(),
            })
            .await?;

        match confirmation {
            Confirmation::Comment(id) => self
                .catalog
                .get(item_id)
                .and_then(|item| item.comment(&id))
                .cloned()
                .ok_or_else(|| Error::not_found("Comment", id)),
            Confirmation::Ack => Ok(local),
        }
    }

    /// Share an item. The derivative shared-post goes to the head of the
    /// view whatever the active sort.
    pub async fn share(&mut self, item_id: &ItemId, body: Option<&str>) -> Result<FeedItem, Error> {
        let now = self.now();
        let shared = reconcile::share(&mut self.catalog, item_id, &self.user, body, now)?;
        self.refresh_view(item_id);

        if self.view.filter().matches(&shared) && !self.suppression.is_suppressed(&shared) {
            let score = score::score(self.view.sort(), &shared, now);
            let entry = FeedEntry::enrich(
                &shared,
                score,
                &self.catalog,
                &self.directory,
                &self.suppression,
            );
            self.view.prepend(entry);
        }

        self.send(Mutation::Share {
            item_id: item_id.clone(),
            user_id: self.user.clone(),
            shared_item_id: shared.id.clone(),
        })
        .await?;
        Ok(shared)
    }

    /// Vote on a poll or survey option. A repeat vote for the same option
    /// changes nothing and is not sent.
    pub async fn vote(&mut self, item_id: &ItemId, option_id: &OptionId) -> Result<Vec<PollOption>, Error> {
        let (options, changed) = reconcile::vote(&mut self.catalog, item_id, option_id, &self.user)?;
        if !changed {
            return Ok(options);
        }
        self.refresh_view(item_id);

        self.send(Mutation::Vote {
            item_id: item_id.clone(),
            option_id: option_id.clone(),
            user_id: self.user.clone(),
        })
        .await?;
        Ok(options)
    }

    pub async fn report(&mut self, item_id: &ItemId, reason: Option<&str>) -> Result<ReportOutcome, Error> {
        if !self.catalog.contains(item_id) {
            return Err(Error::not_found("Item", item_id));
        }
        let outcome = self.reports.record(Report {
            item_id: item_id.clone(),
            reporter: self.user.clone(),
            reason: reason.map(str::to_owned),
            timestamp: self.now(),
        });
        if outcome == ReportOutcome::AlreadyReported {
            return Ok(outcome);
        }

        self.send(Mutation::Report {
            item_id: item_id.clone(),
            user_id: self.user.clone(),
            reason: reason.map(str::to_owned),
        })
        .await?;
        Ok(outcome)
    }

    /// Resubmit a failed mutation. Local state was never rolled back, so
    /// nothing is re-applied.
    pub async fn retry(&mut self, id: MutationId) -> Result<Confirmation, Error> {
        let mutation = self.outbox.retry(id)?.clone();
        debug!("retry {} ({})", id, mutation.name());
        self.dispatch(id, &mutation).await
    }

    async fn send(&mut self, mutation: Mutation) -> Result<Confirmation, Error> {
        let id = self.outbox.begin(mutation.clone());
        self.dispatch(id, &mutation).await
    }

    async fn dispatch(&mut self, id: MutationId, mutation: &Mutation) -> Result<Confirmation, Error> {
        let limit = self.config.remote.timeout();
        match remote::submit_with_timeout(&self.remote, mutation, limit).await {
            Ok(confirmation) => {
                self.outbox.confirm(id);
                self.apply_confirmation(mutation, &confirmation)?;
                Ok(confirmation)
            }
            Err(cause) => {
                warn!("{} {} on {} failed: {}", id, mutation.name(), mutation.item_id(), cause);
                self.outbox.fail(id, cause.to_string());
                Err(Error::TransientFailure { mutation: id, cause })
            }
        }
    }

    fn apply_confirmation(&mut self, mutation: &Mutation, confirmation: &Confirmation) -> Result<(), Error> {
        if let (
            Mutation::Comment {
                item_id,
                comment_id,
                ..
            },
            Confirmation::Comment(authoritative),
        ) = (mutation, confirmation)
        {
            self.catalog
                .replace_comment_id(item_id, comment_id, authoritative)?;
            self.refresh_view(item_id);
        }
        Ok(())
    }

    // local-only actions

    /// Hide an author now and in every later page.
    pub fn mute_author(&mut self, author: UserId) -> usize {
        let removed = self.view.remove_author(&author);
        self.suppression.mute_author(author);
        self.refresh_shown();
        removed
    }

    pub fn unmute_author(&mut self, author: &UserId) -> bool {
        self.suppression.unmute_author(author)
    }

    /// Replace the muted keywords and drop matching entries from the view.
    pub fn set_muted_keywords(&mut self, keywords: impl IntoIterator<Item = String>) -> Result<usize, Error> {
        self.suppression.set_keywords(keywords)?;
        let suppression = &self.suppression;
        let removed = self.view.retain(|entry| !suppression.is_suppressed(&entry.item));
        self.refresh_shown();
        Ok(removed)
    }

    pub fn pin(&mut self, item_id: &ItemId, pinned: bool) -> Result<(), Error> {
        self.catalog.set_pinned(item_id, pinned)?;
        self.refresh_view(item_id);
        Ok(())
    }

    pub fn edit(&mut self, item_id: &ItemId, body: &str) -> Result<(), Error> {
        let now = self.now();
        self.catalog.edit_body(item_id, body.to_owned(), now)?;
        self.refresh_view(item_id);
        Ok(())
    }

    pub fn record_view(&mut self, item_id: &ItemId) -> Result<u64, Error> {
        let views = self.catalog.record_view(item_id)?;
        self.refresh_view(item_id);
        Ok(views)
    }

    pub fn remove_item(&mut self, item_id: &ItemId) -> Result<FeedItem, Error> {
        let removed = self.catalog.remove(item_id)?;
        self.view.remove_item(item_id);
        Ok(removed)
    }

    pub fn toggle_comment_like(
        &mut self,
        item_id: &ItemId,
        comment_id: &CommentId,
    ) -> Result<BTreeSet<UserId>, Error> {
        let likes = self
            .catalog
            .toggle_comment_like(item_id, comment_id, &self.user)?
            .clone();
        self.refresh_view(item_id);
        Ok(likes)
    }

    fn refresh_view(&mut self, item_id: &ItemId) {
        if let Some(item) = self.catalog.get(item_id) {
            self.view.refresh(item, &self.suppression);
        }
    }

    /// Re-project every shown entry after the suppression rules changed.
    fn refresh_shown(&mut self) {
        let shown: Vec<ItemId> = self
            .view
            .entries()
            .iter()
            .map(|entry| entry.id().clone())
            .collect();
        for item_id in &shown {
            self.refresh_view(item_id);
        }
    }

    // realtime

    /// Subscribe to every push-event kind of `hub`. Events queue until
    /// [`Feed::pump_realtime`] or [`Feed::recv_realtime`] merges them.
    pub fn connect_realtime(&mut self, hub: &PushHub) {
        self.disconnect_realtime();
        let (sender, events) = mpsc::unbounded_channel();
        let subscriptions = EventKind::ALL
            .iter()
            .map(|kind| {
                let sender = sender.clone();
                hub.subscribe(*kind, move |event| {
                    if sender.send(event.clone()).is_err() {
                        trace!("realtime receiver gone, dropping {:?} event", event.kind());
                    }
                })
            })
            .collect();
        self.realtime = Some(RealtimeLink {
            _subscriptions: subscriptions,
            events,
        });
        info!("realtime connected");
    }

    /// Unsubscribe. Events not yet merged are discarded; merged state stays.
    pub fn disconnect_realtime(&mut self) -> bool {
        match self.realtime.take() {
            Some(_) => {
                info!("realtime disconnected");
                true
            }
            None => false,
        }
    }

    pub fn is_realtime_connected(&self) -> bool {
        self.realtime.is_some()
    }

    /// Merge every queued event, in arrival order.
    pub fn pump_realtime(&mut self) -> Vec<MergeOutcome> {
        let now = self.now();
        let link = match self.realtime.as_mut() {
            Some(link) => link,
            None => return Vec::new(),
        };

        let mut ctx = MergeContext {
            catalog: &mut self.catalog,
            view: &mut self.view,
            suppression: &self.suppression,
            lookup: &self.directory,
            now,
        };
        let mut outcomes = Vec::new();
        loop {
            match link.events.try_recv() {
                Ok(event) => outcomes.push(realtime::merge(&mut ctx, event)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Wait for the next event and merge it. `None` when not connected.
    pub async fn recv_realtime(&mut self) -> Option<MergeOutcome> {
        let event = self.realtime.as_mut()?.events.recv().await?;
        let now = self.now();
        let mut ctx = MergeContext {
            catalog: &mut self.catalog,
            view: &mut self.view,
            suppression: &self.suppression,
            lookup: &self.directory,
            now,
        };
        Some(realtime::merge(&mut ctx, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Scripted, ScriptedRemote};
    use feed_msg::ItemContent;

    const HOUR: i64 = score::MILLIS_PER_HOUR as i64;
    const NOW: i64 = 1_000 * HOUR;

    fn user(id: &str) -> UserId {
        id.parse().unwrap()
    }

    fn feed() -> Feed<ScriptedRemote> {
        let mut feed = Feed::new(user("me"), Config::default(), ScriptedRemote::new())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(NOW)));
        feed.seed(vec![
            FeedItem::new("p1".parse().unwrap(), Some(user("alice")), NOW - HOUR, ItemContent::Post),
            FeedItem::new("p2".parse().unwrap(), Some(user("bob")), NOW - 2 * HOUR, ItemContent::Post),
        ])
        .unwrap();
        feed
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            page_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            Feed::new(user("me"), config, ScriptedRemote::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn bad_page_is_surfaced_on_the_view() {
        let mut feed = feed();
        feed.get_page(1, SortStrategy::Top, FeedFilter::All).unwrap();
        let err = feed
            .get_page(0, SortStrategy::Chronological, FeedFilter::Jobs)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(feed.view().error().is_some());
        assert!(!feed.view().is_loading());
        assert_eq!(feed.view().sort(), SortStrategy::Top);
        assert_eq!(feed.view().filter(), FeedFilter::All);
        assert_eq!(feed.view().len(), 2);
    }

    #[tokio::test]
    async fn like_confirms_through_outbox() {
        let mut feed = feed();
        feed.get_page(1, SortStrategy::Chronological, FeedFilter::All)
            .unwrap();
        let p1 = "p1".parse().unwrap();
        let likes = feed.like_toggle(&p1).await.unwrap();
        assert!(likes.contains(&user("me")));
        assert!(feed.view().get(&p1).unwrap().item.likes.contains(&user("me")));
        assert_eq!(feed.outbox().pending().count(), 0);
        assert_eq!(feed.outbox().failed().count(), 0);
    }

    #[tokio::test]
    async fn failed_like_stays_applied() {
        let mut feed = feed();
        feed.remote().push(Scripted::Fail);
        let p1 = "p1".parse().unwrap();
        let err = feed.like_toggle(&p1).await.unwrap_err();
        assert!(err.is_transient());
        assert!(feed.catalog().get(&p1).unwrap().likes.contains(&user("me")));
        assert_eq!(feed.outbox().failed().count(), 1);
    }

    #[tokio::test]
    async fn repeat_report_is_not_sent() {
        let mut feed = feed();
        let p1 = "p1".parse().unwrap();
        assert_eq!(feed.report(&p1, Some("spam")).await.unwrap(), ReportOutcome::Recorded);
        assert_eq!(
            feed.report(&p1, None).await.unwrap(),
            ReportOutcome::AlreadyReported
        );
        assert_eq!(feed.remote().submitted().len(), 1);
        assert!(matches!(
            feed.report(&"nope".parse().unwrap(), None).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn muting_keywords_prunes_the_view() {
        let mut feed = feed();
        feed.edit(&"p2".parse().unwrap(), "Selling crypto coins").unwrap();
        feed.get_page(1, SortStrategy::Chronological, FeedFilter::All)
            .unwrap();
        assert_eq!(feed.view().len(), 2);
        assert_eq!(feed.set_muted_keywords(vec!["CRYPTO".to_owned()]).unwrap(), 1);
        assert_eq!(feed.view().ids(), vec!["p1"]);
    }
}
