use feed_msg::{FeedComment, FeedItem};
use feed_ref::UserId;
use itertools::Itertools;
use log::debug;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

use crate::Error;

/// Muted authors and muted keywords of the current user.
///
/// Keywords are literal, case-insensitive substrings; blank keywords are
/// ignored.
#[derive(Clone, Debug, Default)]
pub struct Suppression {
    authors: BTreeSet<UserId>,
    keywords: Vec<String>,
    matcher: Option<Regex>,
}

impl Suppression {
    pub fn new(
        authors: impl IntoIterator<Item = UserId>,
        keywords: impl IntoIterator<Item = String>,
    ) -> Result<Self, Error> {
        let mut suppression = Suppression {
            authors: authors.into_iter().collect(),
            ..Default::default()
        };
        suppression.set_keywords(keywords)?;
        Ok(suppression)
    }

    pub fn authors(&self) -> &BTreeSet<UserId> {
        &self.authors
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn mute_author(&mut self, author: UserId) -> bool {
        debug!("mute author {}", author);
        self.authors.insert(author)
    }

    pub fn unmute_author(&mut self, author: &UserId) -> bool {
        debug!("unmute author {}", author);
        self.authors.remove(author)
    }

    pub fn is_muted(&self, user: &UserId) -> bool {
        self.authors.contains(user)
    }

    pub fn set_keywords(&mut self, keywords: impl IntoIterator<Item = String>) -> Result<(), Error> {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .unique()
            .collect();

        self.matcher = if keywords.is_empty() {
            None
        } else {
            let pattern = keywords.iter().map(|keyword| regex::escape(keyword)).join("|");
            let matcher = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| Error::InvalidArgument(format!("muted keywords: {}", err)))?;
            Some(matcher)
        };
        self.keywords = keywords;
        Ok(())
    }

    pub fn matches_keyword(&self, text: &str) -> bool {
        self.matcher
            .as_ref()
            .map(|matcher| matcher.is_match(text))
            .unwrap_or(false)
    }

    pub fn is_suppressed(&self, item: &FeedItem) -> bool {
        item.author_id
            .as_ref()
            .map(|author| self.is_muted(author))
            .unwrap_or(false)
            || self.matches_keyword(&item.body)
    }

    pub fn is_comment_suppressed(&self, comment: &FeedComment) -> bool {
        self.is_muted(&comment.author_id) || self.matches_keyword(&comment.body)
    }

    /// A copy of the item without the comments this user has muted.
    pub fn visible(&self, item: &FeedItem) -> FeedItem {
        let mut visible = item.clone();
        visible
            .comments
            .retain(|comment| !self.is_comment_suppressed(comment));
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_msg::ItemContent;

    fn post(author: Option<&str>, body: &str) -> FeedItem {
        FeedItem::new(
            "p".parse().unwrap(),
            author.map(|a| a.parse().unwrap()),
            0,
            ItemContent::Post,
        )
        .with_body(body)
    }

    #[test]
    fn keywords_match_case_insensitively_as_literals() {
        let suppression =
            Suppression::new(vec![], vec!["Crypto".to_string(), "a+b".to_string(), "  ".to_string()])
                .unwrap();
        assert_eq!(suppression.keywords(), &["Crypto".to_string(), "a+b".to_string()]);
        assert!(suppression.matches_keyword("buy CRYPTOcurrency now"));
        assert!(suppression.matches_keyword("solve a+b"));
        assert!(!suppression.matches_keyword("solve aab"));
        assert!(!suppression.matches_keyword("reunion on friday"));
    }

    #[test]
    fn muted_author_or_keyword_suppresses() {
        let mut suppression = Suppression::new(vec![], vec!["spam".to_string()]).unwrap();
        assert!(!suppression.is_suppressed(&post(Some("mallory"), "hello")));
        suppression.mute_author("mallory".parse().unwrap());
        assert!(suppression.is_suppressed(&post(Some("mallory"), "hello")));
        assert!(suppression.is_suppressed(&post(None, "SPAM offer")));
        assert!(!suppression.is_suppressed(&post(None, "system notice")));

        assert!(suppression.unmute_author(&"mallory".parse().unwrap()));
        assert!(!suppression.is_suppressed(&post(Some("mallory"), "hello")));
    }

    #[test]
    fn clearing_keywords_removes_matcher() {
        let mut suppression = Suppression::new(vec![], vec!["x".to_string()]).unwrap();
        suppression.set_keywords(Vec::new()).unwrap();
        assert!(!suppression.matches_keyword("x"));
    }
}
