//! GENA eventing for `ContentDirectory`: SUBSCRIBE/UNSUBSCRIBE/RENEW and the
//! `LastChange` NOTIFY payload sent to subscribers whenever the catalog's
//! `SystemUpdateID` changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use mediaserver_catalog::Catalog;

pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
const EVENT_NAMESPACE: &str = "urn:schemas-upnp-org:event-1-0";
const RCS_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/RCS/";

#[derive(Debug, Clone)]
struct Subscription {
    callback_url: String,
    seq: u64,
    expires_at: Instant,
}

#[derive(Debug)]
pub enum SubscribeError {
    MissingCallback,
}

#[derive(Debug)]
pub enum RenewError {
    UnknownSubscription,
}

/// Tracks GENA subscriptions for one service and sends `NOTIFY` requests to
/// each subscriber's callback URL whenever the catalog changes.
pub struct EventingState {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    http: reqwest::Client,
    host_header: String,
}

impl EventingState {
    pub fn new(host_header: String) -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            host_header,
        }
    }

    /// Registers a new subscriber and returns its SID. Per GENA, the first
    /// NOTIFY (`SEQ: 0`) is sent synchronously before SUBSCRIBE responds.
    pub async fn subscribe(
        self: &Arc<Self>,
        callback_url: Option<String>,
        timeout_secs: u64,
        system_update_id: u64,
    ) -> Result<(String, u64), SubscribeError> {
        let callback_url = callback_url.ok_or(SubscribeError::MissingCallback)?;
        let sid = format!("uuid:{}", Uuid::new_v4());
        let timeout = timeout_secs.max(1);

        {
            let mut subs = self.subscriptions.lock().await;
            subs.insert(
                sid.clone(),
                Subscription {
                    callback_url: callback_url.clone(),
                    seq: 0,
                    expires_at: Instant::now() + Duration::from_secs(timeout),
                },
            );
        }

        self.send_notify(&sid, system_update_id).await;
        Ok((sid, timeout))
    }

    pub async fn renew(self: &Arc<Self>, sid: &str, timeout_secs: u64) -> Result<u64, RenewError> {
        let timeout = timeout_secs.max(1);
        let mut subs = self.subscriptions.lock().await;
        let sub = subs.get_mut(sid).ok_or(RenewError::UnknownSubscription)?;
        sub.expires_at = Instant::now() + Duration::from_secs(timeout);
        Ok(timeout)
    }

    pub async fn unsubscribe(self: &Arc<Self>, sid: &str) {
        self.subscriptions.lock().await.remove(sid);
    }

    async fn send_notify(self: &Arc<Self>, sid: &str, system_update_id: u64) {
        let (callback_url, seq) = {
            let subs = self.subscriptions.lock().await;
            match subs.get(sid) {
                Some(sub) => (sub.callback_url.clone(), sub.seq),
                None => return,
            }
        };

        let body = build_last_change_body(system_update_id);
        let method = Method::from_bytes(b"NOTIFY").expect("NOTIFY is a valid method token");

        let request = self
            .http
            .request(method, callback_url.as_str())
            .header("HOST", &self.host_header)
            .header("CONTENT-TYPE", "text/xml; charset=\"utf-8\"")
            .header("NT", "upnp:event")
            .header("NTS", "upnp:propchange")
            .header("SID", sid)
            .header("SEQ", seq.to_string())
            .body(body)
            .timeout(Duration::from_secs(2));

        match request.send().await {
            Ok(_) => {
                debug!(sid, seq, system_update_id, "sent GENA NOTIFY");
                let mut subs = self.subscriptions.lock().await;
                if let Some(sub) = subs.get_mut(sid) {
                    sub.seq += 1;
                }
            }
            Err(err) => {
                warn!(sid, error = %err, "NOTIFY delivery failed, dropping subscriber");
                self.subscriptions.lock().await.remove(sid);
            }
        }
    }

    /// Sends a `NOTIFY` to every current subscriber. Intended to be driven
    /// by the catalog's change feed.
    pub async fn notify_all(self: &Arc<Self>, system_update_id: u64) {
        let sids: Vec<String> = self.subscriptions.lock().await.keys().cloned().collect();
        for sid in sids {
            self.send_notify(&sid, system_update_id).await;
        }
    }

    /// Drops subscriptions whose timeout has elapsed. Intended to run on a
    /// periodic interval alongside [`Self::run_change_listener`].
    pub async fn sweep_expired(self: &Arc<Self>) {
        let now = Instant::now();
        self.subscriptions.lock().await.retain(|sid, sub| {
            let alive = sub.expires_at > now;
            if !alive {
                debug!(sid, "subscription expired");
            }
            alive
        });
    }

    pub async fn subscription_count(self: &Arc<Self>) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Subscribes to the catalog's change feed and fires a NOTIFY to every
    /// subscriber whenever the catalog mutates. Runs until the channel closes.
    pub async fn run_change_listener(self: Arc<Self>, catalog: Arc<Catalog>) {
        let mut changes = catalog.subscribe_changes();
        loop {
            match changes.recv().await {
                Ok(_event) => self.notify_all(catalog.current_update_id()).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Periodically sweeps expired subscriptions. Runs forever.
    pub async fn run_expiry_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            self.sweep_expired().await;
        }
    }
}

/// Builds the `e:propertyset`/`e:property`/`LastChange` NOTIFY body, with the
/// inner `Event` XML HTML-escaped as a single text node inside `LastChange`.
fn build_last_change_body(system_update_id: u64) -> String {
    let last_change_xml = format!(
        "<Event xmlns=\"{RCS_NAMESPACE}\"><InstanceID val=\"0\"><SystemUpdateID val=\"{system_update_id}\"/><ContainerUpdateIDs val=\"\"/><TransferIDs val=\"\"/></InstanceID></Event>"
    );
    let escaped = html_escape(&last_change_xml);
    format!(
        "<e:propertyset xmlns:e=\"{EVENT_NAMESPACE}\"><e:property><LastChange>{escaped}</LastChange></e:property></e:propertyset>"
    )
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_change_body_escapes_the_inner_event_xml() {
        let body = build_last_change_body(7);
        assert!(body.contains("&lt;Event"));
        assert!(body.contains("SystemUpdateID val=&quot;7&quot;"));
        assert!(body.contains("e:propertyset"));
    }

    #[tokio::test]
    async fn subscribe_without_callback_is_rejected() {
        let state = Arc::new(EventingState::new("127.0.0.1:9005".to_string()));
        let result = state.subscribe(None, DEFAULT_TIMEOUT_SECS, 1).await;
        assert!(matches!(result, Err(SubscribeError::MissingCallback)));
    }

    #[tokio::test]
    async fn renew_unknown_subscription_fails() {
        let state = Arc::new(EventingState::new("127.0.0.1:9005".to_string()));
        let result = state.renew("uuid:does-not-exist", 1800).await;
        assert!(matches!(result, Err(RenewError::UnknownSubscription)));
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_the_table() {
        let state = Arc::new(EventingState::new("127.0.0.1:9005".to_string()));
        {
            let mut subs = state.subscriptions.lock().await;
            subs.insert(
                "uuid:test".to_string(),
                Subscription {
                    callback_url: "http://127.0.0.1:1/cb".to_string(),
                    seq: 0,
                    expires_at: Instant::now() + Duration::from_secs(60),
                },
            );
        }
        assert_eq!(state.subscription_count().await, 1);
        state.unsubscribe("uuid:test").await;
        assert_eq!(state.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_expired_drops_timed_out_subscriptions() {
        let state = Arc::new(EventingState::new("127.0.0.1:9005".to_string()));
        {
            let mut subs = state.subscriptions.lock().await;
            subs.insert(
                "uuid:expired".to_string(),
                Subscription {
                    callback_url: "http://127.0.0.1:1/cb".to_string(),
                    seq: 0,
                    expires_at: Instant::now() - Duration::from_secs(1),
                },
            );
        }
        state.sweep_expired().await;
        assert_eq!(state.subscription_count().await, 0);
    }
}
