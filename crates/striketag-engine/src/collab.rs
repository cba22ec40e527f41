use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use striketag_core::player::PlayerId;

/// Who has checked in, and when. Backed by whatever login tracking the
/// deployment uses.
pub trait Presence: Send + Sync {
    fn last_seen(
        &self,
        player_id: &PlayerId,
    ) -> impl Future<Output = Option<DateTime<Utc>>> + Send;
}

/// Display-name lookup. Identity provisioning itself lives elsewhere.
pub trait Directory: Send + Sync {
    fn display_name(&self, player_id: &PlayerId) -> impl Future<Output = String> + Send;
}

/// A push message. The transport shapes platform payloads; we only supply
/// title, body, and a small data map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl Notification {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

/// Per-recipient delivery counts from a multicast send.
#[derive(Debug, Clone, Copy, Default)]
pub struct MulticastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Push relay. Fire-and-forget from the engine's perspective: failures are
/// logged by the caller and never retried or rolled back.
pub trait NotificationRelay: Send + Sync {
    fn send(
        &self,
        token: &str,
        note: &Notification,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn send_multicast(
        &self,
        tokens: &[String],
        note: &Notification,
    ) -> impl Future<Output = MulticastReport> + Send;
}

impl<T: Presence + ?Sized> Presence for std::sync::Arc<T> {
    fn last_seen(
        &self,
        player_id: &PlayerId,
    ) -> impl Future<Output = Option<DateTime<Utc>>> + Send {
        (**self).last_seen(player_id)
    }
}

impl<T: Directory + ?Sized> Directory for std::sync::Arc<T> {
    fn display_name(&self, player_id: &PlayerId) -> impl Future<Output = String> + Send {
        (**self).display_name(player_id)
    }
}

impl<T: NotificationRelay + ?Sized> NotificationRelay for std::sync::Arc<T> {
    fn send(
        &self,
        token: &str,
        note: &Notification,
    ) -> impl Future<Output = Result<(), String>> + Send {
        (**self).send(token, note)
    }

    fn send_multicast(
        &self,
        tokens: &[String],
        note: &Notification,
    ) -> impl Future<Output = MulticastReport> + Send {
        (**self).send_multicast(tokens, note)
    }
}

/// In-process presence map, updated by client heartbeats.
#[derive(Default)]
pub struct InProcessPresence {
    seen: Mutex<HashMap<PlayerId, DateTime<Utc>>>,
}

impl InProcessPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_seen(&self, player_id: &PlayerId, at: DateTime<Utc>) {
        let mut seen = self.seen.lock().await;
        seen.insert(player_id.clone(), at);
    }
}

impl Presence for InProcessPresence {
    async fn last_seen(&self, player_id: &PlayerId) -> Option<DateTime<Utc>> {
        let seen = self.seen.lock().await;
        seen.get(player_id).copied()
    }
}

/// Static name map; unknown players fall back to their id.
#[derive(Default)]
pub struct StaticDirectory {
    names: HashMap<PlayerId, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, player_id: &str, name: &str) -> Self {
        self.names.insert(player_id.to_string(), name.to_string());
        self
    }
}

impl Directory for StaticDirectory {
    async fn display_name(&self, player_id: &PlayerId) -> String {
        self.names
            .get(player_id)
            .cloned()
            .unwrap_or_else(|| player_id.clone())
    }
}

/// Relay that writes deliveries to the log instead of a push service.
/// Useful for local hosting and as the default wiring in the host binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRelay;

impl NotificationRelay for LogRelay {
    async fn send(&self, token: &str, note: &Notification) -> Result<(), String> {
        tracing::info!(token, title = %note.title, body = %note.body, "push");
        Ok(())
    }

    async fn send_multicast(&self, tokens: &[String], note: &Notification) -> MulticastReport {
        for token in tokens {
            tracing::info!(token, title = %note.title, body = %note.body, "push");
        }
        MulticastReport {
            delivered: tokens.len(),
            failed: 0,
        }
    }
}
