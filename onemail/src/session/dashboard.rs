//! Live dashboard state fed by the realtime channel

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::realtime::RealtimeHandlers;
use crate::services::events::EventEmitter;
use crate::types::email::{EmailMessage, SyncStatus};
use crate::types::error::OneMailError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub is_connected: bool,
    /// Emails received live, newest first
    pub emails: Vec<EmailMessage>,
    pub current_sync_status: Option<SyncStatus>,
    /// Mailbox the last status update referred to
    pub sync_email: Option<String>,
}

/// Shared handle on the dashboard state
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    state: Arc<RwLock<DashboardState>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.read().clone()
    }

    /// Back to the signed-out state
    pub fn reset(&self) {
        *self.write() = DashboardState::default();
    }

    fn read(&self) -> RwLockReadGuard<'_, DashboardState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DashboardState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Realtime handlers that fold events into a `Dashboard` and raise notices
pub struct DashboardHandlers {
    dashboard: Dashboard,
    events: EventEmitter,
}

impl DashboardHandlers {
    pub fn new(dashboard: Dashboard, events: EventEmitter) -> Self {
        Self { dashboard, events }
    }
}

impl RealtimeHandlers for DashboardHandlers {
    fn on_connect(&self) {
        self.dashboard.write().is_connected = true;
        self.events
            .info("Connected", "WebSocket connected successfully.");
    }

    fn on_disconnect(&self) {
        self.dashboard.write().is_connected = false;
    }

    fn on_error(&self, error: &OneMailError) {
        debug!("Realtime error surfaced to dashboard: {}", error);
        self.events
            .destructive("Connection Error", "Failed to connect to WebSocket.");
    }

    fn on_new_email(&self, email: &EmailMessage, _user_id: &str, _timestamp: DateTime<Utc>) {
        self.dashboard.write().emails.insert(0, email.clone());
        self.events.info("New Email", &email.subject);
    }

    fn on_sync_status(
        &self,
        status: SyncStatus,
        _user_id: &str,
        email: Option<&str>,
        error: Option<&str>,
        _timestamp: DateTime<Utc>,
    ) {
        {
            let mut state = self.dashboard.write();
            state.current_sync_status = Some(status.clone());
            state.sync_email = email.map(str::to_string);
        }

        match (&status, email, error) {
            (SyncStatus::Syncing, Some(email), _) => self
                .events
                .info("Syncing Emails", &format!("Syncing email: {}", email)),
            (SyncStatus::Error, _, Some(error)) => self.events.destructive("Sync Error", error),
            (SyncStatus::Stopped, _, _) => {
                self.events.info("Sync Stopped", "Email sync has stopped.")
            }
            (SyncStatus::Idle, _, _) => self.events.info("Sync Idle", "Email sync is idle."),
            // Syncing without a mailbox, an error without a reason, or a
            // status this client has no notice for
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::events::{Notice, NoticeLevel, SessionEvent};

    fn handlers() -> (DashboardHandlers, Dashboard, flume::Receiver<SessionEvent>) {
        let dashboard = Dashboard::new();
        let (events, rx) = EventEmitter::channel();
        (DashboardHandlers::new(dashboard.clone(), events), dashboard, rx)
    }

    fn notices(rx: &flume::Receiver<SessionEvent>) -> Vec<(String, String, NoticeLevel)> {
        rx.try_iter()
            .filter_map(|event| match event {
                SessionEvent::Notice(Notice {
                    title,
                    description,
                    level,
                }) => Some((title, description, level)),
                SessionEvent::LoginRequired => None,
            })
            .collect()
    }

    fn email(id: &str, subject: &str) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            subject: subject.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_events() {
        let (handlers, dashboard, rx) = handlers();

        handlers.on_connect();
        assert!(dashboard.snapshot().is_connected);

        handlers.on_disconnect();
        assert!(!dashboard.snapshot().is_connected);

        handlers.on_error(&OneMailError::Connection("refused".to_string()));

        assert_eq!(
            notices(&rx),
            vec![
                (
                    "Connected".to_string(),
                    "WebSocket connected successfully.".to_string(),
                    NoticeLevel::Info
                ),
                (
                    "Connection Error".to_string(),
                    "Failed to connect to WebSocket.".to_string(),
                    NoticeLevel::Destructive
                ),
            ]
        );
    }

    #[test]
    fn test_new_emails_are_prepended() {
        let (handlers, dashboard, rx) = handlers();
        let now = Utc::now();

        handlers.on_new_email(&email("m1", "First"), "u1", now);
        handlers.on_new_email(&email("m2", "Second"), "u1", now);

        let ids: Vec<_> = dashboard.snapshot().emails.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["m2", "m1"]);

        let titles: Vec<_> = notices(&rx).into_iter().map(|(t, d, _)| (t, d)).collect();
        assert_eq!(
            titles,
            vec![
                ("New Email".to_string(), "First".to_string()),
                ("New Email".to_string(), "Second".to_string()),
            ]
        );
    }

    #[test]
    fn test_sync_status_notices() {
        let (handlers, dashboard, rx) = handlers();
        let now = Utc::now();

        handlers.on_sync_status(SyncStatus::Syncing, "u1", Some("me@gmail.com"), None, now);
        let state = dashboard.snapshot();
        assert_eq!(state.current_sync_status, Some(SyncStatus::Syncing));
        assert_eq!(state.sync_email.as_deref(), Some("me@gmail.com"));

        handlers.on_sync_status(SyncStatus::Error, "u1", None, Some("IMAP timeout"), now);
        assert_eq!(dashboard.snapshot().sync_email, None);

        handlers.on_sync_status(SyncStatus::Stopped, "u1", None, None, now);
        handlers.on_sync_status(SyncStatus::Idle, "u1", None, None, now);
        handlers.on_sync_status(SyncStatus::Other("paused".to_string()), "u1", None, None, now);
        assert_eq!(
            dashboard.snapshot().current_sync_status,
            Some(SyncStatus::Other("paused".to_string()))
        );
        // No mailbox named: state changes, no notice
        handlers.on_sync_status(SyncStatus::Syncing, "u1", None, None, now);

        assert_eq!(
            notices(&rx),
            vec![
                (
                    "Syncing Emails".to_string(),
                    "Syncing email: me@gmail.com".to_string(),
                    NoticeLevel::Info
                ),
                (
                    "Sync Error".to_string(),
                    "IMAP timeout".to_string(),
                    NoticeLevel::Destructive
                ),
                (
                    "Sync Stopped".to_string(),
                    "Email sync has stopped.".to_string(),
                    NoticeLevel::Info
                ),
                (
                    "Sync Idle".to_string(),
                    "Email sync is idle.".to_string(),
                    NoticeLevel::Info
                ),
            ]
        );
        assert_eq!(
            dashboard.snapshot().current_sync_status,
            Some(SyncStatus::Syncing)
        );

        dashboard.reset();
        assert_eq!(dashboard.snapshot(), DashboardState::default());
    }
}
