//! Application state shared across routes

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::rooms::RoomRegistry;
use crate::upstream::ai::{HttpOpponentLauncher, OpponentLauncher};
use crate::upstream::history::{DisabledHistory, HttpMatchHistory, MatchHistory};
use crate::upstream::{ServiceClient, UpstreamError};
use crate::util::time::MatchTimings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, UpstreamError> {
        let config = Arc::new(config);

        let history: Arc<dyn MatchHistory> = match &config.match_history_url {
            Some(url) => {
                info!(url = %url, "Match history enabled");
                Arc::new(HttpMatchHistory::new(ServiceClient::new(url)?))
            }
            None => {
                warn!("MATCH_HISTORY_URL not set, match results will not be stored");
                Arc::new(DisabledHistory)
            }
        };

        let opponent: Option<Arc<dyn OpponentLauncher>> = match &config.ai_upstream_url {
            Some(url) => Some(Arc::new(HttpOpponentLauncher::new(ServiceClient::new(url)?))),
            None => {
                warn!("AI_UPSTREAM_URL not set, single-player rooms are disabled");
                None
            }
        };

        // One registry per process, injected everywhere
        let registry = RoomRegistry::new(
            history,
            opponent,
            MatchTimings::default(),
            config.history_retry_limit,
        );

        Ok(Self { config, registry })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let config = Config {
            server_addr: ([127, 0, 0, 1], 0).into(),
            log_level: "debug".into(),
            jwt_secret: "test-secret".into(),
            client_origin: "http://localhost:5173".into(),
            match_history_url: None,
            ai_upstream_url: None,
            history_retry_limit: 1,
        };
        // No upstream clients are built without URLs
        match Self::new(config) {
            Ok(state) => state,
            Err(e) => panic!("test state: {e}"),
        }
    }
}
