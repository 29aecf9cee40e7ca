//! The `stats` chat command: parse, count, summarize.

use async_trait::async_trait;
use thiserror::Error;

use crate::store::{EventKind, PayloadStore, StoreError};

/// Keyword expected as the second token of a mention.
pub const STATS_KEYWORD: &str = "stats";

#[derive(Debug, Error)]
pub enum CommandError {
    /// The mention text does not follow `<mention> stats <owner/repo>`.
    #[error("the mention must contain `stats` and a repository name: {0:?}")]
    InvalidCommand(Vec<String>),
}

/// A parsed `<mention> stats <repository>` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsCommand {
    pub repository: String,
}

impl StatsCommand {
    /// Parses mention text of the exact form `<mention> stats <repository>`.
    ///
    /// Tokens are separated by single spaces; surrounding whitespace is
    /// ignored. Any other shape is rejected.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let args: Vec<&str> = text.trim().split(' ').collect();
        match args.as_slice() {
            [_, keyword, repository] if *keyword == STATS_KEYWORD && !repository.is_empty() => {
                Ok(Self {
                    repository: (*repository).to_string(),
                })
            }
            _ => Err(CommandError::InvalidCommand(
                args.iter().map(|s| s.to_string()).collect(),
            )),
        }
    }
}

/// Anything that can count stored rows per repository and kind.
#[async_trait]
pub trait CountSource: Send + Sync {
    async fn count(&self, repository: &str, kind: EventKind) -> Result<u64, StoreError>;
}

#[async_trait]
impl CountSource for PayloadStore {
    async fn count(&self, repository: &str, kind: EventKind) -> Result<u64, StoreError> {
        PayloadStore::count(self, repository, kind).await
    }
}

/// Per-kind counts for one repository, in [`EventKind::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStats {
    pub repository: String,
    pub counts: Vec<(EventKind, u64)>,
}

impl RepoStats {
    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        self.counts
            .iter()
            .map(|(kind, n)| format!("total {} count is {}", kind.label().replace('_', "-"), n))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct StatsAggregator<S> {
    source: S,
}

impl<S: CountSource> StatsAggregator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Counts every persisted kind for the command's repository.
    ///
    /// Fails as a whole if any single count fails.
    pub async fn collect(&self, command: &StatsCommand) -> Result<RepoStats, StoreError> {
        let mut counts = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            counts.push((kind, self.source.count(&command.repository, kind).await?));
        }
        Ok(RepoStats {
            repository: command.repository.clone(),
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedCounts {
        calls: Mutex<Vec<EventKind>>,
        fail_on: Option<EventKind>,
    }

    #[async_trait]
    impl CountSource for FixedCounts {
        async fn count(&self, _repository: &str, kind: EventKind) -> Result<u64, StoreError> {
            self.calls.lock().unwrap().push(kind);
            if Some(kind) == self.fail_on {
                return Err(StoreError::Unavailable {
                    operation: "count",
                    message: "disk on fire".into(),
                });
            }
            Ok(match kind {
                EventKind::PullRequest => 2,
                EventKind::PullRequestReview => 1,
                EventKind::PullRequestReviewComment => 0,
            })
        }
    }

    #[test]
    fn parses_three_token_command() {
        let cmd = StatsCommand::parse("<@U123> stats octo/repo").unwrap();
        assert_eq!(cmd.repository, "octo/repo");

        let cmd = StatsCommand::parse("  @bot stats octo/repo\n").unwrap();
        assert_eq!(cmd.repository, "octo/repo");
    }

    #[test]
    fn rejects_wrong_shapes() {
        for text in [
            "@bot stats",
            "@bot info octo/repo",
            "@bot Stats octo/repo",
            "@bot stats octo/repo extra",
            "@bot  stats octo/repo",
            "",
        ] {
            assert!(
                matches!(StatsCommand::parse(text), Err(CommandError::InvalidCommand(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn collects_counts_in_kind_order() {
        let aggregator = StatsAggregator::new(FixedCounts {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let stats = aggregator
            .collect(&StatsCommand {
                repository: "octo/repo".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            stats.counts,
            vec![
                (EventKind::PullRequest, 2),
                (EventKind::PullRequestReview, 1),
                (EventKind::PullRequestReviewComment, 0),
            ]
        );
        assert_eq!(
            stats.summary(),
            "total pull-request count is 2\n\
             total pull-request-review count is 1\n\
             total pull-request-review-comment count is 0"
        );
        assert_eq!(*aggregator.source.calls.lock().unwrap(), EventKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn any_failed_count_fails_the_whole_collection() {
        let aggregator = StatsAggregator::new(FixedCounts {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(EventKind::PullRequestReview),
        });
        let result = aggregator
            .collect(&StatsCommand {
                repository: "octo/repo".into(),
            })
            .await;
        assert!(result.is_err());
    }
}
