//! Realtime push channel
//!
//! A single authenticated websocket per signed-in user carries `new_email`
//! and `sync_status` messages. `RealtimeManager` owns the connection and
//! its reconnect policy; callers observe it through `RealtimeHandlers`.

pub mod connector;
pub mod manager;
pub mod probe;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::email::{EmailMessage, SyncStatus};
use crate::types::error::OneMailError;

pub use connector::{Connection, Connector, Frame, WsConnector};
pub use manager::RealtimeManager;
pub use probe::{HttpStatusProbe, StatusProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Callbacks for connection events and messages for the active user
///
/// Every method defaults to doing nothing. Messages addressed to another
/// user never reach these.
pub trait RealtimeHandlers: Send + Sync {
    fn on_connect(&self) {}

    fn on_disconnect(&self) {}

    fn on_error(&self, _error: &OneMailError) {}

    fn on_new_email(&self, _email: &EmailMessage, _user_id: &str, _timestamp: DateTime<Utc>) {}

    fn on_sync_status(
        &self,
        _status: SyncStatus,
        _user_id: &str,
        _email: Option<&str>,
        _error: Option<&str>,
        _timestamp: DateTime<Utc>,
    ) {
    }
}
