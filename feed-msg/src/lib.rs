use feed_ref::{CommentId, EventId, GroupId, ItemId, JobId, OptionId, UserId};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use std::{collections::BTreeSet, fmt};
use thiserror::Error as ThisError;

pub const MAX_IMAGES: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum MsgError {
    #[error("Item {item} has {count} images, at most {max} are allowed", max = MAX_IMAGES)]
    TooManyImages { item: ItemId, count: usize },
    #[error("Item {item} lists poll option {option} more than once")]
    DuplicateOption { item: ItemId, option: OptionId },
    #[error("User {user} voted for more than one option of item {item}")]
    ExclusiveVote { item: ItemId, user: UserId },
    #[error("Item {item} contains comment {comment} more than once")]
    DuplicateComment { item: ItemId, comment: CommentId },
}

/// One unit of content in the activity stream.
///
/// The kind-specific payload lives in [`ItemContent`]; the engagement
/// collections are shared by every kind.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: ItemId,
    // system, group and event authored items have no author
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub author_id: Option<UserId>,
    pub timestamp: i64,
    #[serde(default)]
    pub body: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub content: ItemContent,
    #[serde(default)]
    pub likes: BTreeSet<UserId>,
    #[serde(default)]
    pub shares: BTreeSet<UserId>,
    #[serde(default)]
    pub comments: Vec<FeedComment>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub pinned: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub edited_at: Option<i64>,
    #[serde(default)]
    pub views: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ItemContent {
    Post,
    GroupPost { group_id: GroupId },
    GroupAnnouncement { group_id: GroupId },
    EventInvitation { event_id: EventId },
    EventUpdate { event_id: EventId },
    JobPosting { job_id: JobId },
    Achievement,
    Milestone,
    Poll { options: Vec<PollOption> },
    Survey { options: Vec<PollOption> },
    SharedPost { shared_post_id: ItemId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Post,
    GroupPost,
    GroupAnnouncement,
    EventInvitation,
    EventUpdate,
    JobPosting,
    Achievement,
    Milestone,
    Poll,
    Survey,
    SharedPost,
}

/// An id reference from an item to something it does not own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkRef {
    Group(GroupId),
    Event(EventId),
    Job(JobId),
    SharedPost(ItemId),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedComment {
    pub id: CommentId,
    pub author_id: UserId,
    pub body: String,
    pub timestamp: i64,
    #[serde(default)]
    pub likes: BTreeSet<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub voters: BTreeSet<UserId>,
}

impl FeedItem {
    pub fn new(id: ItemId, author_id: Option<UserId>, timestamp: i64, content: ItemContent) -> Self {
        FeedItem {
            id,
            author_id,
            timestamp,
            body: String::new(),
            images: Vec::new(),
            content,
            likes: BTreeSet::new(),
            shares: BTreeSet::new(),
            comments: Vec::new(),
            pinned: false,
            edited_at: None,
            views: 0,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }

    pub fn has_media(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    pub fn linked(&self) -> Option<LinkRef> {
        match &self.content {
            ItemContent::GroupPost { group_id } | ItemContent::GroupAnnouncement { group_id } => {
                Some(LinkRef::Group(group_id.clone()))
            }
            ItemContent::EventInvitation { event_id } | ItemContent::EventUpdate { event_id } => {
                Some(LinkRef::Event(event_id.clone()))
            }
            ItemContent::JobPosting { job_id } => Some(LinkRef::Job(job_id.clone())),
            ItemContent::SharedPost { shared_post_id } => {
                Some(LinkRef::SharedPost(shared_post_id.clone()))
            }
            ItemContent::Post
            | ItemContent::Achievement
            | ItemContent::Milestone
            | ItemContent::Poll { .. }
            | ItemContent::Survey { .. } => None,
        }
    }

    pub fn poll_options(&self) -> Option<&[PollOption]> {
        match &self.content {
            ItemContent::Poll { options } | ItemContent::Survey { options } => {
                Some(options.as_slice())
            }
            _ => None,
        }
    }

    pub fn poll_options_mut(&mut self) -> Option<&mut Vec<PollOption>> {
        match &mut self.content {
            ItemContent::Poll { options } | ItemContent::Survey { options } => Some(options),
            _ => None,
        }
    }

    /// The option this user already voted for, if any.
    pub fn voted_option(&self, user: &UserId) -> Option<&OptionId> {
        self.poll_options()?
            .iter()
            .find(|option| option.voters.contains(user))
            .map(|option| &option.id)
    }

    pub fn comment(&self, id: &CommentId) -> Option<&FeedComment> {
        self.comments.iter().find(|comment| &comment.id == id)
    }

    pub fn comment_mut(&mut self, id: &CommentId) -> Option<&mut FeedComment> {
        self.comments.iter_mut().find(|comment| &comment.id == id)
    }

    pub fn validate(&self) -> Result<(), MsgError> {
        if self.images.len() > MAX_IMAGES {
            return Err(MsgError::TooManyImages {
                item: self.id.clone(),
                count: self.images.len(),
            });
        }

        let mut comment_ids = BTreeSet::new();
        for comment in self.comments.iter() {
            if !comment_ids.insert(&comment.id) {
                return Err(MsgError::DuplicateComment {
                    item: self.id.clone(),
                    comment: comment.id.clone(),
                });
            }
        }

        if let Some(options) = self.poll_options() {
            let mut option_ids = BTreeSet::new();
            let mut voters = BTreeSet::new();
            for option in options {
                if !option_ids.insert(&option.id) {
                    return Err(MsgError::DuplicateOption {
                        item: self.id.clone(),
                        option: option.id.clone(),
                    });
                }
                for voter in option.voters.iter() {
                    if !voters.insert(voter) {
                        return Err(MsgError::ExclusiveVote {
                            item: self.id.clone(),
                            user: voter.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

impl ItemContent {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemContent::Post => ItemKind::Post,
            ItemContent::GroupPost { .. } => ItemKind::GroupPost,
            ItemContent::GroupAnnouncement { .. } => ItemKind::GroupAnnouncement,
            ItemContent::EventInvitation { .. } => ItemKind::EventInvitation,
            ItemContent::EventUpdate { .. } => ItemKind::EventUpdate,
            ItemContent::JobPosting { .. } => ItemKind::JobPosting,
            ItemContent::Achievement => ItemKind::Achievement,
            ItemContent::Milestone => ItemKind::Milestone,
            ItemContent::Poll { .. } => ItemKind::Poll,
            ItemContent::Survey { .. } => ItemKind::Survey,
            ItemContent::SharedPost { .. } => ItemKind::SharedPost,
        }
    }
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Post => "post",
            ItemKind::GroupPost => "group-post",
            ItemKind::GroupAnnouncement => "group-announcement",
            ItemKind::EventInvitation => "event-invitation",
            ItemKind::EventUpdate => "event-update",
            ItemKind::JobPosting => "job-posting",
            ItemKind::Achievement => "achievement",
            ItemKind::Milestone => "milestone",
            ItemKind::Poll => "poll",
            ItemKind::Survey => "survey",
            ItemKind::SharedPost => "shared-post",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FeedComment {
    pub fn new(id: CommentId, author_id: UserId, body: impl Into<String>, timestamp: i64) -> Self {
        FeedComment {
            id,
            author_id,
            body: body.into(),
            timestamp,
            likes: BTreeSet::new(),
        }
    }
}

impl PollOption {
    pub fn new(id: OptionId, text: impl Into<String>) -> Self {
        PollOption {
            id,
            text: text.into(),
            voters: BTreeSet::new(),
        }
    }
}

// push events, shaped { type, data, timestamp }

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PushEvent {
    #[serde(flatten)]
    pub payload: PushPayload,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum PushPayload {
    NewItem(FeedItem),
    Like {
        item_id: ItemId,
        user_id: UserId,
        #[serde(default = "default_liked")]
        liked: bool,
    },
    Comment {
        item_id: ItemId,
        comment: FeedComment,
    },
    Share {
        item_id: ItemId,
        user_id: UserId,
        #[serde(default)]
        shared_item: Option<FeedItem>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewItem,
    Like,
    Comment,
    Share,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NewItem,
        EventKind::Like,
        EventKind::Comment,
        EventKind::Share,
    ];
}

fn default_liked() -> bool {
    true
}

impl PushEvent {
    pub fn new(payload: PushPayload, timestamp: i64) -> Self {
        PushEvent { payload, timestamp }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            PushPayload::NewItem(_) => EventKind::NewItem,
            PushPayload::Like { .. } => EventKind::Like,
            PushPayload::Comment { .. } => EventKind::Comment,
            PushPayload::Share { .. } => EventKind::Share,
        }
    }
}

// records owned by the directory collaborators, resolved by id

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub member_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: EventId,
    pub title: String,
    pub starts_at: i64,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
}
