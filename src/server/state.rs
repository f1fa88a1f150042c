use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::error::Result;
use crate::store::GraphStore;

/// Event name used for both periodic and on-connect snapshot pushes.
pub const UPDATE_EVENT: &str = "update";

/// When the last rebuild finished, if any has.
pub type LastRefresh = Arc<RwLock<Option<DateTime<Utc>>>>;

#[derive(Serialize)]
struct Envelope<'a, T> {
    event: &'a str,
    payload: &'a T,
}

/// Fan-out of serialized messages to every connected viewer.
#[derive(Debug, Clone)]
pub struct Hub {
    tx: broadcast::Sender<Arc<str>>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Serializes `{event, payload}` once and sends it to every viewer.
    ///
    /// Returns how many viewers it was queued for; zero when nobody is
    /// connected.
    pub fn broadcast<T: Serialize>(&self, event: &str, payload: &T) -> Result<usize> {
        let message: Arc<str> = Arc::from(encode(event, payload)?);
        Ok(self.tx.send(message).unwrap_or(0))
    }
}

pub fn encode<T: Serialize>(event: &str, payload: &T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope { event, payload })?)
}

/// Everything the HTTP and WebSocket handlers need.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<GraphStore>,
    pub hub: Hub,
    pub last_refresh: LastRefresh,
}

impl AppState {
    pub fn new(store: Arc<GraphStore>, hub: Hub, last_refresh: LastRefresh) -> Self {
        Self {
            store,
            hub,
            last_refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_envelope() {
        let message = encode(UPDATE_EVENT, &json!({"team": {}})).unwrap();
        assert_eq!(message, r#"{"event":"update","payload":{"team":{}}}"#);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let hub = Hub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let delivered = hub.broadcast(UPDATE_EVENT, &json!({"n": 1})).unwrap();
        assert_eq!(delivered, 2);

        let expected = r#"{"event":"update","payload":{"n":1}}"#;
        assert_eq!(&*first.recv().await.unwrap(), expected);
        assert_eq!(&*second.recv().await.unwrap(), expected);
    }

    #[test]
    fn test_broadcast_without_viewers() {
        let hub = Hub::new(8);
        assert_eq!(hub.broadcast(UPDATE_EVENT, &json!({})).unwrap(), 0);
    }
}
