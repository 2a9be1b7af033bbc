use async_trait::async_trait;
use feed_ref::{CommentId, ItemId, OptionId, UserId};
use log::{trace, warn};
use parking_lot::Mutex;
use rand::Rng;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use thiserror::Error as ThisError;
use tokio::time::{sleep, timeout};

use crate::config::RemoteConfig;

/// A user action echoed to the backend after it was applied locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Like {
        item_id: ItemId,
        user_id: UserId,
        liked: bool,
    },
    Comment {
        item_id: ItemId,
        // temporary until confirmed
        comment_id: CommentId,
        author_id: UserId,
        body: String,
    },
    Share {
        item_id: ItemId,
        user_id: UserId,
        shared_item_id: ItemId,
    },
    Vote {
        item_id: ItemId,
        option_id: OptionId,
        user_id: UserId,
    },
    Report {
        item_id: ItemId,
        user_id: UserId,
        reason: Option<String>,
    },
}

impl Mutation {
    pub fn item_id(&self) -> &ItemId {
        match self {
            Mutation::Like { item_id, .. }
            | Mutation::Comment { item_id, .. }
            | Mutation::Share { item_id, .. }
            | Mutation::Vote { item_id, .. }
            | Mutation::Report { item_id, .. } => item_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Like { .. } => "like",
            Mutation::Comment { .. } => "comment",
            Mutation::Share { .. } => "share",
            Mutation::Vote { .. } => "vote",
            Mutation::Report { .. } => "report",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Ack,
    /// Authoritative id for a comment created under a temporary id.
    Comment(CommentId),
}

#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RemoteError {
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
    #[error("Remote call timed out after {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait Remote: Send + Sync {
    async fn submit(&self, mutation: &Mutation) -> Result<Confirmation, RemoteError>;
}

#[async_trait]
impl<R: Remote + ?Sized> Remote for Arc<R> {
    async fn submit(&self, mutation: &Mutation) -> Result<Confirmation, RemoteError> {
        (**self).submit(mutation).await
    }
}

/// Bound a submission by `limit`; an elapsed deadline is a [`RemoteError::TimedOut`].
pub async fn submit_with_timeout<R: Remote + ?Sized>(
    remote: &R,
    mutation: &Mutation,
    limit: Duration,
) -> Result<Confirmation, RemoteError> {
    match timeout(limit, remote.submit(mutation)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} on {} timed out after {:?}", mutation.name(), mutation.item_id(), limit);
            Err(RemoteError::TimedOut(limit))
        }
    }
}

fn confirm(mutation: &Mutation) -> Confirmation {
    match mutation {
        Mutation::Comment { .. } => Confirmation::Comment(CommentId::generate()),
        _ => Confirmation::Ack,
    }
}

/// The in-memory mock backend: random latency, random failure.
#[derive(Clone, Debug)]
pub struct SimulatedRemote {
    config: RemoteConfig,
}

impl SimulatedRemote {
    pub fn new(config: RemoteConfig) -> Self {
        SimulatedRemote { config }
    }
}

#[async_trait]
impl Remote for SimulatedRemote {
    async fn submit(&self, mutation: &Mutation) -> Result<Confirmation, RemoteError> {
        let (latency, fails) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.config.latency_range()),
                rng.gen_bool(self.config.failure_rate),
            )
        };
        trace!("simulate {} with {}ms latency", mutation.name(), latency);
        sleep(Duration::from_millis(latency)).await;

        if fails {
            warn!("simulated failure for {} on {}", mutation.name(), mutation.item_id());
            return Err(RemoteError::Unavailable("simulated network failure".into()));
        }
        Ok(confirm(mutation))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scripted {
    Succeed,
    Fail,
    /// Never resolve; only a timeout ends the call.
    Stall,
}

/// A backend answering from a queue of scripted outcomes, succeeding once
/// the queue is empty. Records every submission.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Scripted>>,
    submitted: Mutex<Vec<Mutation>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: Scripted) {
        self.script.lock().push_back(outcome);
    }

    pub fn submitted(&self) -> Vec<Mutation> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl Remote for ScriptedRemote {
    async fn submit(&self, mutation: &Mutation) -> Result<Confirmation, RemoteError> {
        self.submitted.lock().push(mutation.clone());
        let outcome = self.script.lock().pop_front().unwrap_or(Scripted::Succeed);
        match outcome {
            Scripted::Succeed => Ok(confirm(mutation)),
            Scripted::Fail => Err(RemoteError::Unavailable("scripted failure".into())),
            Scripted::Stall => {
                std::future::pending::<()>().await;
                Err(RemoteError::Unavailable("stalled call resumed".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like() -> Mutation {
        Mutation::Like {
            item_id: "p1".parse().unwrap(),
            user_id: "bob".parse().unwrap(),
            liked: true,
        }
    }

    #[tokio::test]
    async fn simulated_remote_can_always_fail() {
        let remote = SimulatedRemote::new(RemoteConfig {
            failure_rate: 1.0,
            ..RemoteConfig::instant()
        });
        assert!(matches!(
            remote.submit(&like()).await,
            Err(RemoteError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn simulated_remote_assigns_comment_ids() {
        let remote = SimulatedRemote::new(RemoteConfig::instant());
        let comment = Mutation::Comment {
            item_id: "p1".parse().unwrap(),
            comment_id: CommentId::temporary(),
            author_id: "bob".parse().unwrap(),
            body: "hi".into(),
        };
        match remote.submit(&comment).await.unwrap() {
            Confirmation::Comment(id) => assert!(!id.is_temporary()),
            other => panic!("unexpected confirmation {:?}", other),
        }
        assert_eq!(remote.submit(&like()).await.unwrap(), Confirmation::Ack);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out() {
        let remote = ScriptedRemote::new();
        remote.push(Scripted::Stall);
        let limit = Duration::from_millis(250);
        assert_eq!(
            submit_with_timeout(&remote, &like(), limit).await,
            Err(RemoteError::TimedOut(limit))
        );
        assert_eq!(submit_with_timeout(&remote, &like(), limit).await, Ok(Confirmation::Ack));
        assert_eq!(remote.submitted().len(), 2);
    }
}
