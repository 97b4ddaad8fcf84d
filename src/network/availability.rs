// Upstream availability tracking
// Records whether the most recent upstream attempts succeeded so health
// checks can tell "serving from network" apart from "serving offline".
// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    /// No request has reached the network yet.
    Unknown,
    Online,
    Offline,
}

impl UpstreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamStatus::Unknown => "unknown",
            UpstreamStatus::Online => "online",
            UpstreamStatus::Offline => "offline",
        }
    }
}

#[derive(Debug)]
struct State {
    status: UpstreamStatus,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct UpstreamAvailability {
    state: RwLock<State>,
}

impl UpstreamAvailability {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                status: UpstreamStatus::Unknown,
                consecutive_failures: 0,
                last_success: None,
                last_failure: None,
            }),
        }
    }
}

impl Default for UpstreamAvailability {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamAvailability {
    pub fn mark_online(&self) {
        let mut state = self.state.write();
        if state.status != UpstreamStatus::Online {
            debug!("Upstream is ONLINE");
        }
        state.status = UpstreamStatus::Online;
        state.consecutive_failures = 0;
        state.last_success = Some(Utc::now());
    }

    pub fn mark_offline(&self, reason: &str) {
        let mut state = self.state.write();
        if state.status != UpstreamStatus::Offline {
            warn!("Upstream is OFFLINE: {}", reason);
        }
        state.status = UpstreamStatus::Offline;
        state.consecutive_failures += 1;
        state.last_failure = Some(Utc::now());
    }

    pub fn status(&self) -> UpstreamStatus {
        self.state.read().status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_success
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_failure
    }
}
