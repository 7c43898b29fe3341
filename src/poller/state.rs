//! State exposed to dashboard consumers.

use crate::api::{HealthData, SummaryData};

/// Backend reachability as last observed by the poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

/// Everything a view needs. Published whole through a watch channel,
/// so a reader never sees half of a cycle's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerState {
    pub summary: Option<SummaryData>,
    pub health: Option<HealthData>,
    /// True only while a foreground cycle is running.
    pub loading: bool,
    /// Set iff the last cycle could not reach the backend.
    pub connection_error: Option<String>,
    pub connection: ConnectionState,
}

/// Last-known-good data, borrowed from a [`PollerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot<'a> {
    pub summary: Option<&'a SummaryData>,
    pub health: Option<&'a HealthData>,
}

/// Coarse lifecycle view of a [`PollerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase<'a> {
    /// Not loading and nothing has been observed yet.
    Idle,
    Loading,
    Ready(Snapshot<'a>),
    Disconnected {
        message: &'a str,
        last: Option<Snapshot<'a>>,
    },
}

impl PollerState {
    /// State at mount: loading, nothing known.
    pub fn initial() -> Self {
        Self {
            summary: None,
            health: None,
            loading: true,
            connection_error: None,
            connection: ConnectionState::Unknown,
        }
    }

    pub fn snapshot(&self) -> Option<Snapshot<'_>> {
        if self.summary.is_none() && self.health.is_none() {
            return None;
        }
        Some(Snapshot {
            summary: self.summary.as_ref(),
            health: self.health.as_ref(),
        })
    }

    pub fn phase(&self) -> Phase<'_> {
        if self.loading {
            return Phase::Loading;
        }
        if let Some(message) = self.connection_error.as_deref() {
            return Phase::Disconnected {
                message,
                last: self.snapshot(),
            };
        }
        match self.connection {
            ConnectionState::Connected => Phase::Ready(Snapshot {
                summary: self.summary.as_ref(),
                health: self.health.as_ref(),
            }),
            _ => Phase::Idle,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

impl Default for PollerState {
    fn default() -> Self {
        Self::initial()
    }
}
