use feed_msg::{FeedComment, FeedItem, PollOption};
use feed_ref::{CommentId, ItemId, OptionId, UserId};
use log::trace;
use std::collections::{BTreeSet, HashMap};

use crate::Error;

/// Canonical, id-keyed store of every feed item the engine knows about.
///
/// All mutation goes through the methods below so that the set and vote
/// invariants of [`FeedItem`] hold at every step.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    items: HashMap<ItemId, FeedItem>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Replaced,
    Unchanged,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = FeedItem>) -> Result<Self, Error> {
        let mut catalog = Self::new();
        for item in items {
            catalog.upsert(item)?;
        }
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&FeedItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.values()
    }

    /// Insert when absent, replace in place otherwise.
    pub fn upsert(&mut self, item: FeedItem) -> Result<Upserted, Error> {
        item.validate()?;

        match self.items.get_mut(&item.id) {
            Some(existing) if *existing == item => Ok(Upserted::Unchanged),
            Some(existing) => {
                trace!("replace item {}", item.id);
                *existing = item;
                Ok(Upserted::Replaced)
            }
            None => {
                trace!("insert item {}", item.id);
                self.items.insert(item.id.clone(), item);
                Ok(Upserted::Inserted)
            }
        }
    }

    pub fn remove(&mut self, id: &ItemId) -> Result<FeedItem, Error> {
        self.items
            .remove(id)
            .ok_or_else(|| Error::not_found("Item", id))
    }

    pub fn toggle_like(&mut self, id: &ItemId, user: &UserId) -> Result<&BTreeSet<UserId>, Error> {
        let item = self.item_mut(id)?;
        if !item.likes.remove(user) {
            item.likes.insert(user.clone());
        }
        trace!("toggle like on {} by {}", id, user);
        Ok(&item.likes)
    }

    /// Set like membership explicitly. Returns whether anything changed.
    pub fn set_like(&mut self, id: &ItemId, user: &UserId, liked: bool) -> Result<bool, Error> {
        let item = self.item_mut(id)?;
        let changed = if liked {
            item.likes.insert(user.clone())
        } else {
            item.likes.remove(user)
        };
        Ok(changed)
    }

    pub fn toggle_share(&mut self, id: &ItemId, user: &UserId) -> Result<&BTreeSet<UserId>, Error> {
        let item = self.item_mut(id)?;
        if !item.shares.remove(user) {
            item.shares.insert(user.clone());
        }
        Ok(&item.shares)
    }

    pub fn add_share(&mut self, id: &ItemId, user: &UserId) -> Result<bool, Error> {
        Ok(self.item_mut(id)?.shares.insert(user.clone()))
    }

    pub fn has_comment(&self, id: &ItemId, comment: &CommentId) -> bool {
        self.items
            .get(id)
            .map(|item| item.comment(comment).is_some())
            .unwrap_or(false)
    }

    /// Append to the item's comment sequence. A comment whose id is already
    /// present is not appended again, and `false` is returned.
    pub fn append_comment(&mut self, id: &ItemId, comment: FeedComment) -> Result<bool, Error> {
        let item = self.item_mut(id)?;
        if item.comment(&comment.id).is_some() {
            return Ok(false);
        }
        trace!("append comment {} to {}", comment.id, id);
        item.comments.push(comment);
        Ok(true)
    }

    /// Swap a temporary comment id for the authoritative one, keeping the
    /// comment at its position. If the authoritative comment is already in
    /// the sequence the temporary copy is dropped instead.
    pub fn replace_comment_id(
        &mut self,
        id: &ItemId,
        temporary: &CommentId,
        authoritative: &CommentId,
    ) -> Result<(), Error> {
        let item = self.item_mut(id)?;
        let position = item
            .comments
            .iter()
            .position(|comment| &comment.id == temporary)
            .ok_or_else(|| Error::not_found("Comment", temporary))?;

        if item.comment(authoritative).is_some() {
            trace!("drop temporary comment {}, {} already present", temporary, authoritative);
            item.comments.remove(position);
        } else {
            trace!("confirm comment {} as {}", temporary, authoritative);
            item.comments[position].id = authoritative.clone();
        }
        Ok(())
    }

    pub fn toggle_comment_like(
        &mut self,
        id: &ItemId,
        comment: &CommentId,
        user: &UserId,
    ) -> Result<&BTreeSet<UserId>, Error> {
        let comment = self
            .item_mut(id)?
            .comment_mut(comment)
            .ok_or_else(|| Error::not_found("Comment", comment))?;
        if !comment.likes.remove(user) {
            comment.likes.insert(user.clone());
        }
        Ok(&comment.likes)
    }

    /// Record a vote. Votes are exclusive across the options of one item:
    /// voting again for the same option is a no-op, voting for a different
    /// option is rejected. There is no retraction.
    pub fn toggle_vote(
        &mut self,
        id: &ItemId,
        option: &OptionId,
        user: &UserId,
    ) -> Result<&[PollOption], Error> {
        let item = self.item_mut(id)?;
        let voted = item.voted_option(user).cloned();
        let options = item
            .poll_options_mut()
            .ok_or_else(|| Error::InvalidArgument(format!("item {} is not a poll", id)))?;
        let target = options
            .iter()
            .position(|candidate| &candidate.id == option)
            .ok_or_else(|| Error::not_found("Poll option", option))?;

        match voted {
            Some(existing) if &existing == option => {
                trace!("repeat vote on {} by {} ignored", id, user);
            }
            Some(_) => {
                return Err(Error::AlreadyVoted {
                    item: id.clone(),
                    user: user.clone(),
                })
            }
            None => {
                options[target].voters.insert(user.clone());
            }
        }

        Ok(options.as_slice())
    }

    pub fn set_pinned(&mut self, id: &ItemId, pinned: bool) -> Result<(), Error> {
        self.item_mut(id)?.pinned = pinned;
        Ok(())
    }

    pub fn edit_body(&mut self, id: &ItemId, body: String, edited_at: i64) -> Result<(), Error> {
        let item = self.item_mut(id)?;
        item.body = body;
        item.edited_at = Some(edited_at);
        Ok(())
    }

    pub fn record_view(&mut self, id: &ItemId) -> Result<u64, Error> {
        let item = self.item_mut(id)?;
        item.views = item.views.saturating_add(1);
        Ok(item.views)
    }

    fn item_mut(&mut self, id: &ItemId) -> Result<&mut FeedItem, Error> {
        self.items
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Item", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_msg::ItemContent;

    fn user(id: &str) -> UserId {
        id.parse().unwrap()
    }

    fn item_id(id: &str) -> ItemId {
        id.parse().unwrap()
    }

    fn post(id: &str) -> FeedItem {
        FeedItem::new(item_id(id), Some(user("alice")), 1_000, ItemContent::Post).with_body("hello")
    }

    fn poll(id: &str) -> FeedItem {
        FeedItem::new(
            item_id(id),
            Some(user("alice")),
            1_000,
            ItemContent::Poll {
                options: vec![
                    PollOption::new("a".parse().unwrap(), "Campus"),
                    PollOption::new("b".parse().unwrap(), "Downtown"),
                ],
            },
        )
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.upsert(post("p1")).unwrap(), Upserted::Inserted);
        assert_eq!(catalog.upsert(post("p1")).unwrap(), Upserted::Unchanged);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&item_id("p1")), Some(&post("p1")));

        let edited = post("p1").with_body("changed");
        assert_eq!(catalog.upsert(edited).unwrap(), Upserted::Replaced);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&item_id("p1")).unwrap().body, "changed");
    }

    #[test]
    fn upsert_rejects_invalid_items() {
        let mut catalog = Catalog::new();
        let mut item = post("p1");
        item.images = vec!["i".to_string(); 5];
        assert!(matches!(catalog.upsert(item), Err(Error::Msg(_))));
        assert!(catalog.is_empty());
    }

    #[test]
    fn toggle_like_twice_restores_original_set() {
        let mut catalog = Catalog::from_items(vec![post("p1")]).unwrap();
        catalog.set_like(&item_id("p1"), &user("carol"), true).unwrap();
        let original = catalog.get(&item_id("p1")).unwrap().likes.clone();

        let once = catalog.toggle_like(&item_id("p1"), &user("bob")).unwrap().clone();
        assert!(once.contains(&user("bob")));
        let twice = catalog.toggle_like(&item_id("p1"), &user("bob")).unwrap().clone();
        assert_eq!(twice, original);
    }

    #[test]
    fn toggle_like_unknown_item_is_not_found() {
        let mut catalog = Catalog::new();
        assert!(matches!(
            catalog.toggle_like(&item_id("nope"), &user("bob")),
            Err(Error::NotFound { what: "Item", .. })
        ));
    }

    #[test]
    fn set_like_reports_changes_only() {
        let mut catalog = Catalog::from_items(vec![post("p1")]).unwrap();
        assert!(catalog.set_like(&item_id("p1"), &user("bob"), true).unwrap());
        assert!(!catalog.set_like(&item_id("p1"), &user("bob"), true).unwrap());
        assert!(catalog.set_like(&item_id("p1"), &user("bob"), false).unwrap());
        assert!(!catalog.set_like(&item_id("p1"), &user("bob"), false).unwrap());
    }

    #[test]
    fn share_set_holds_each_user_once() {
        let mut catalog = Catalog::from_items(vec![post("p1")]).unwrap();
        assert!(catalog.add_share(&item_id("p1"), &user("bob")).unwrap());
        assert!(!catalog.add_share(&item_id("p1"), &user("bob")).unwrap());
        assert_eq!(catalog.get(&item_id("p1")).unwrap().shares.len(), 1);
        assert!(catalog.toggle_share(&item_id("p1"), &user("bob")).unwrap().is_empty());
    }

    #[test]
    fn vote_is_exclusive_across_options() {
        let mut catalog = Catalog::from_items(vec![poll("q1")]).unwrap();
        let (q1, a, b) = (item_id("q1"), "a".parse().unwrap(), "b".parse().unwrap());

        let options = catalog.toggle_vote(&q1, &a, &user("bob")).unwrap();
        assert_eq!(options[0].voters.len(), 1);

        // same option again: no double count
        let options = catalog.toggle_vote(&q1, &a, &user("bob")).unwrap();
        assert_eq!(options[0].voters.len(), 1);

        assert!(matches!(
            catalog.toggle_vote(&q1, &b, &user("bob")),
            Err(Error::AlreadyVoted { .. })
        ));
        assert!(catalog.get(&q1).unwrap().poll_options().unwrap()[1].voters.is_empty());
    }

    #[test]
    fn vote_errors() {
        let mut catalog = Catalog::from_items(vec![poll("q1"), post("p1")]).unwrap();
        assert!(matches!(
            catalog.toggle_vote(&item_id("q1"), &"zzz".parse().unwrap(), &user("bob")),
            Err(Error::NotFound { what: "Poll option", .. })
        ));
        assert!(matches!(
            catalog.toggle_vote(&item_id("p1"), &"a".parse().unwrap(), &user("bob")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            catalog.toggle_vote(&item_id("q9"), &"a".parse().unwrap(), &user("bob")),
            Err(Error::NotFound { what: "Item", .. })
        ));
    }

    #[test]
    fn comment_temporary_id_substitution() {
        let mut catalog = Catalog::from_items(vec![post("p1")]).unwrap();
        let p1 = item_id("p1");
        let temp = CommentId::temporary();
        let real: CommentId = "c-100".parse().unwrap();

        assert!(catalog
            .append_comment(&p1, FeedComment::new(temp.clone(), user("bob"), "nice", 5))
            .unwrap());
        catalog.replace_comment_id(&p1, &temp, &real).unwrap();

        let item = catalog.get(&p1).unwrap();
        assert_eq!(item.comments.len(), 1);
        assert_eq!(item.comments[0].id, real);
        assert_eq!(item.comments[0].body, "nice");
    }

    #[test]
    fn comment_substitution_drops_temporary_when_push_won_the_race() {
        let mut catalog = Catalog::from_items(vec![post("p1")]).unwrap();
        let p1 = item_id("p1");
        let temp = CommentId::temporary();
        let real: CommentId = "c-100".parse().unwrap();

        catalog
            .append_comment(&p1, FeedComment::new(temp.clone(), user("bob"), "nice", 5))
            .unwrap();
        catalog
            .append_comment(&p1, FeedComment::new(real.clone(), user("bob"), "nice", 6))
            .unwrap();
        assert!(!catalog
            .append_comment(&p1, FeedComment::new(real.clone(), user("bob"), "nice", 6))
            .unwrap());

        catalog.replace_comment_id(&p1, &temp, &real).unwrap();
        let item = catalog.get(&p1).unwrap();
        assert_eq!(item.comments.len(), 1);
        assert_eq!(item.comments[0].id, real);
    }

    #[test]
    fn pin_edit_view_and_remove() {
        let mut catalog = Catalog::from_items(vec![post("p1")]).unwrap();
        let p1 = item_id("p1");

        catalog.set_pinned(&p1, true).unwrap();
        catalog.edit_body(&p1, "edited".into(), 2_000).unwrap();
        assert_eq!(catalog.record_view(&p1).unwrap(), 1);
        assert_eq!(catalog.record_view(&p1).unwrap(), 2);

        let item = catalog.get(&p1).unwrap();
        assert!(item.pinned);
        assert!(item.is_edited());
        assert_eq!(item.body, "edited");

        assert_eq!(catalog.remove(&p1).unwrap().id, p1);
        assert!(catalog.remove(&p1).is_err());
    }
}
