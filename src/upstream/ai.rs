//! AI opponent launcher. The AI joins the room as an ordinary client.

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

use super::{ServiceClient, UpstreamError};

/// Asks the AI service to connect to a room
pub trait OpponentLauncher: Send + Sync {
    fn launch(&self, room_id: String) -> BoxFuture<'static, Result<(), UpstreamError>>;
}

/// `GET {AI_UPSTREAM_URL}/api/ai` with the room id in a header
pub struct HttpOpponentLauncher {
    client: ServiceClient,
}

impl HttpOpponentLauncher {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

impl OpponentLauncher for HttpOpponentLauncher {
    fn launch(&self, room_id: String) -> BoxFuture<'static, Result<(), UpstreamError>> {
        let client = self.client.clone();
        async move {
            client.get("/api/ai", &[("roomid", room_id.as_str())]).await?;
            info!(room_id = %room_id, "AI opponent requested");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
pub(crate) use stub::StubLauncher;

#[cfg(test)]
mod stub {
    use super::*;
    use parking_lot::Mutex;

    /// Launcher that records calls and succeeds or fails on demand
    pub struct StubLauncher {
        ok: bool,
        launched: Mutex<Vec<String>>,
    }

    impl StubLauncher {
        pub fn new(ok: bool) -> Self {
            Self {
                ok,
                launched: Mutex::new(Vec::new()),
            }
        }

        pub fn launched(&self) -> Vec<String> {
            self.launched.lock().clone()
        }
    }

    impl OpponentLauncher for StubLauncher {
        fn launch(&self, room_id: String) -> BoxFuture<'static, Result<(), UpstreamError>> {
            self.launched.lock().push(room_id);
            let result = if self.ok {
                Ok(())
            } else {
                Err(UpstreamError::Api {
                    status: 503,
                    body: "unavailable".into(),
                })
            };
            futures::future::ready(result).boxed()
        }
    }
}
