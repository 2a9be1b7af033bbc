use feed_msg::{AuthorProfile, EventSummary, FeedItem, GroupSummary, JobSummary, LinkRef};
use feed_ref::{EventId, GroupId, ItemId, JobId, UserId};
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{catalog::Catalog, suppress::Suppression};

/// Id lookups answered by the directory, group, event and job collaborators.
pub trait Lookup {
    fn author(&self, id: &UserId) -> Option<&AuthorProfile>;
    fn group(&self, id: &GroupId) -> Option<&GroupSummary>;
    fn event(&self, id: &EventId) -> Option<&EventSummary>;
    fn job(&self, id: &JobId) -> Option<&JobSummary>;
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectorySeed {
    pub authors: Vec<AuthorProfile>,
    pub groups: Vec<GroupSummary>,
    pub events: Vec<EventSummary>,
    pub jobs: Vec<JobSummary>,
}

#[derive(Clone, Debug, Default)]
pub struct Directory {
    authors: HashMap<UserId, AuthorProfile>,
    groups: HashMap<GroupId, GroupSummary>,
    events: HashMap<EventId, EventSummary>,
    jobs: HashMap<JobId, JobSummary>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_author(&mut self, author: AuthorProfile) {
        self.authors.insert(author.id.clone(), author);
    }

    pub fn insert_group(&mut self, group: GroupSummary) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn insert_event(&mut self, event: EventSummary) {
        self.events.insert(event.id.clone(), event);
    }

    pub fn insert_job(&mut self, job: JobSummary) {
        self.jobs.insert(job.id.clone(), job);
    }
}

impl From<DirectorySeed> for Directory {
    fn from(seed: DirectorySeed) -> Self {
        let mut directory = Directory::new();
        seed.authors.into_iter().for_each(|a| directory.insert_author(a));
        seed.groups.into_iter().for_each(|g| directory.insert_group(g));
        seed.events.into_iter().for_each(|e| directory.insert_event(e));
        seed.jobs.into_iter().for_each(|j| directory.insert_job(j));
        directory
    }
}

impl Lookup for Directory {
    fn author(&self, id: &UserId) -> Option<&AuthorProfile> {
        self.authors.get(id)
    }

    fn group(&self, id: &GroupId) -> Option<&GroupSummary> {
        self.groups.get(id)
    }

    fn event(&self, id: &EventId) -> Option<&EventSummary> {
        self.events.get(id)
    }

    fn job(&self, id: &JobId) -> Option<&JobSummary> {
        self.jobs.get(id)
    }
}

/// The resolved object behind an item's [`LinkRef`].
#[derive(Clone, Debug, PartialEq)]
pub enum Linked {
    Group(GroupSummary),
    Event(EventSummary),
    Job(JobSummary),
    SharedPost(Box<FeedItem>),
}

/// One row of a page: the item, the score it was ranked with, and its
/// resolved references.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedEntry {
    pub item: FeedItem,
    pub score: f64,
    pub author: Option<AuthorProfile>,
    pub linked: Option<Linked>,
}

impl FeedEntry {
    /// Build the entry shown for `item`. Comments `suppression` hides are
    /// left out of the item and of any shared original.
    pub fn enrich(
        item: &FeedItem,
        score: f64,
        catalog: &Catalog,
        lookup: &dyn Lookup,
        suppression: &Suppression,
    ) -> Self {
        let author = item
            .author_id
            .as_ref()
            .and_then(|id| lookup.author(id))
            .cloned();
        let linked = item
            .linked()
            .and_then(|link| resolve(&link, catalog, lookup, suppression));

        FeedEntry {
            item: suppression.visible(item),
            score,
            author,
            linked,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.item.id
    }
}

fn resolve(
    link: &LinkRef,
    catalog: &Catalog,
    lookup: &dyn Lookup,
    suppression: &Suppression,
) -> Option<Linked> {
    match link {
        LinkRef::Group(id) => lookup.group(id).cloned().map(Linked::Group),
        LinkRef::Event(id) => lookup.event(id).cloned().map(Linked::Event),
        LinkRef::Job(id) => lookup.job(id).cloned().map(Linked::Job),
        LinkRef::SharedPost(id) => catalog
            .get(id)
            .map(|item| Linked::SharedPost(Box::new(suppression.visible(item)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_msg::ItemContent;

    fn directory() -> Directory {
        Directory::from(DirectorySeed {
            authors: vec![AuthorProfile {
                id: "alice".parse().unwrap(),
                name: "Alice Liddell".into(),
                headline: Some("Class of 2009".into()),
                avatar: None,
                graduation_year: Some(2009),
            }],
            jobs: vec![JobSummary {
                id: "job-1".parse().unwrap(),
                title: "Rust Engineer".into(),
                company: "Acme".into(),
                location: None,
            }],
            ..Default::default()
        })
    }

    #[test]
    fn enrich_resolves_author_and_job() {
        let item = FeedItem::new(
            "j".parse().unwrap(),
            Some("alice".parse().unwrap()),
            0,
            ItemContent::JobPosting {
                job_id: "job-1".parse().unwrap(),
            },
        );
        let none = Suppression::default();
        let entry = FeedEntry::enrich(&item, 1.5, &Catalog::new(), &directory(), &none);
        assert_eq!(entry.author.unwrap().name, "Alice Liddell");
        assert!(matches!(entry.linked, Some(Linked::Job(job)) if job.company == "Acme"));
        assert_eq!(entry.score, 1.5);
    }

    #[test]
    fn enrich_resolves_shared_post_from_catalog() {
        let original = FeedItem::new("orig".parse().unwrap(), None, 0, ItemContent::Post);
        let catalog = Catalog::from_items(vec![original.clone()]).unwrap();
        let share = FeedItem::new(
            "s".parse().unwrap(),
            Some("ghost".parse().unwrap()),
            1,
            ItemContent::SharedPost {
                shared_post_id: "orig".parse().unwrap(),
            },
        );
        let none = Suppression::default();
        let entry = FeedEntry::enrich(&share, 0.0, &catalog, &directory(), &none);
        assert_eq!(entry.author, None);
        assert_eq!(entry.linked, Some(Linked::SharedPost(Box::new(original))));
    }
}
