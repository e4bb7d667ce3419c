//! Match-result persistence, fire-and-forget from the game's point of view

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::game::MatchOutcome;

use super::client::REQUEST_TIMEOUT;
use super::{ServiceClient, UpstreamError};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// One finished match as stored by the history service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub player1_id: String,
    pub player2_id: String,
    pub player1_score: u32,
    pub player2_score: u32,
    pub winner_id: String,
    pub game_type: String,
    pub played_at: DateTime<Utc>,
}

impl From<&MatchOutcome> for MatchRecord {
    fn from(outcome: &MatchOutcome) -> Self {
        Self {
            player1_id: outcome.owner.user_id().to_string(),
            player2_id: outcome.guest.user_id().to_string(),
            player1_score: outcome.final_score.owner,
            player2_score: outcome.final_score.guest,
            winner_id: outcome.winner_seat().user_id().to_string(),
            game_type: outcome.kind.game_type().to_string(),
            played_at: Utc::now(),
        }
    }
}

/// Sink for finished matches
pub trait MatchHistory: Send + Sync {
    fn record(&self, record: MatchRecord) -> BoxFuture<'static, Result<(), UpstreamError>>;
}

/// Posts results to `{MATCH_HISTORY_URL}/api/matches`
pub struct HttpMatchHistory {
    client: ServiceClient,
}

impl HttpMatchHistory {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

impl MatchHistory for HttpMatchHistory {
    fn record(&self, record: MatchRecord) -> BoxFuture<'static, Result<(), UpstreamError>> {
        let client = self.client.clone();
        async move { client.post("/api/matches", &record).await }.boxed()
    }
}

/// Used when no history service is configured
pub struct DisabledHistory;

impl MatchHistory for DisabledHistory {
    fn record(&self, record: MatchRecord) -> BoxFuture<'static, Result<(), UpstreamError>> {
        debug!(game_type = %record.game_type, "Match history disabled, result not stored");
        futures::future::ready(Ok(())).boxed()
    }
}

/// Store a result in the background with bounded retry, then give up
pub fn spawn_record(history: Arc<dyn MatchHistory>, record: MatchRecord, max_attempts: u32) {
    tokio::spawn(async move {
        let attempts = max_attempts.max(1);
        for attempt in 0..attempts {
            let result = match tokio::time::timeout(REQUEST_TIMEOUT, history.record(record.clone())).await
            {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout(REQUEST_TIMEOUT)),
            };
            match result {
                Ok(()) => {
                    debug!(winner_id = %record.winner_id, game_type = %record.game_type, "Match result stored");
                    return;
                }
                Err(e) if attempt + 1 < attempts => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(attempt = attempt + 1, error = %e, ?delay, "Storing match result failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        attempts,
                        error = %e,
                        player1_id = %record.player1_id,
                        player2_id = %record.player2_id,
                        "Dropping match result"
                    );
                }
            }
        }
    });
}

#[cfg(test)]
pub(crate) use recording::RecordingHistory;

#[cfg(test)]
mod recording {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Keeps every stored record; the first `failures` calls fail
    #[derive(Default)]
    pub struct RecordingHistory {
        pub records: Mutex<Vec<MatchRecord>>,
        pub calls: AtomicU32,
        failures: AtomicU32,
    }

    impl RecordingHistory {
        pub fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Default::default()
            }
        }

        pub fn records(&self) -> Vec<MatchRecord> {
            self.records.lock().clone()
        }
    }

    impl MatchHistory for RecordingHistory {
        fn record(&self, record: MatchRecord) -> BoxFuture<'static, Result<(), UpstreamError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let result = if failing {
                Err(UpstreamError::Api {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                self.records.lock().push(record);
                Ok(())
            };
            futures::future::ready(result).boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn record() -> MatchRecord {
        MatchRecord {
            player1_id: "1".into(),
            player2_id: "2".into(),
            player1_score: 10,
            player2_score: 7,
            winner_id: "1".into(),
            game_type: "remote".into(),
            played_at: Utc::now(),
        }
    }

    #[test]
    fn record_uses_history_service_field_names() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["player1Id"], "1");
        assert_eq!(json["player2Score"], 7);
        assert_eq!(json["winnerId"], "1");
        assert_eq!(json["gameType"], "remote");
        assert!(json["playedAt"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let history = Arc::new(RecordingHistory::failing(2));
        spawn_record(history.clone(), record(), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(history.calls.load(Ordering::SeqCst), 3);
        assert_eq!(history.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let history = Arc::new(RecordingHistory::failing(10));
        spawn_record(history.clone(), record(), 3);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(history.calls.load(Ordering::SeqCst), 3);
        assert!(history.records().is_empty());
    }
}
