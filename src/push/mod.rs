//! Push message handling.
//!
//! An inbound push message is parsed into a [`PushPayload`] (falling back to
//! a fixed default), dressed up as a [`Notification`] with the standard
//! actions, and handed to a [`NotificationGateway`]. Displaying it and
//! reacting to clicks is the gateway's business.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_TITLE: &str = "default Title for noitification";
pub const DEFAULT_BODY: &str = "default -server push notification body";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
}

impl Default for PushPayload {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
        }
    }
}

impl PushPayload {
    /// Parse message data as JSON `{title, body}`. Absent, empty or
    /// malformed data yields the default payload; the flag reports whether
    /// the default was used.
    pub fn parse(data: Option<&[u8]>) -> (Self, bool) {
        let Some(raw) = data.filter(|d| !d.iter().all(u8::is_ascii_whitespace)) else {
            debug!("Push message without data, using default payload");
            return (Self::default(), true);
        };

        match serde_json::from_slice::<PushPayload>(raw) {
            Ok(payload) => (payload, false),
            Err(e) => {
                debug!("Unparseable push payload ({}), using default payload", e);
                (Self::default(), true)
            }
        }
    }
}

/// A `(action-id, title)` pair offered on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: &'static str,
    pub title: &'static str,
}

/// `open` brings up the application root, `close` dismisses.
pub const NOTIFICATION_ACTIONS: [NotificationAction; 2] = [
    NotificationAction {
        action: "open",
        title: "Explore this new world",
    },
    NotificationAction {
        action: "close",
        title: "Close",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub date_of_arrival: DateTime<Utc>,
    pub primary_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn from_payload(payload: PushPayload) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            vibrate: vec![100, 50, 100],
            data: NotificationData {
                date_of_arrival: Utc::now(),
                primary_key: "2".to_string(),
            },
            actions: NOTIFICATION_ACTIONS.to_vec(),
        }
    }
}

/// Presents notifications to the user.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<()>;
}

/// Gateway that only writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            body = %notification.body,
            "Push notification"
        );
        Ok(())
    }
}

/// Parse `data`, build the notification and forward it to `gateway`.
pub async fn handle_push(
    gateway: &dyn NotificationGateway,
    data: Option<&[u8]>,
) -> Result<Notification> {
    let (payload, used_default) = PushPayload::parse(data);
    crate::metrics::record_push(used_default);

    let notification = Notification::from_payload(payload);
    gateway.show(&notification).await?;
    Ok(notification)
}
