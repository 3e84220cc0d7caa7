//! Session events for the dashboard shell
//!
//! Toast-style notices and the "go back to login" signal are pushed over a
//! flume channel; whoever renders the dashboard drains the receiver.

use flume::{Receiver, Sender};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Destructive,
}

/// Transient user-visible notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub level: NoticeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload")]
pub enum SessionEvent {
    /// Session could not be recovered; navigate to the login entry point
    LoginRequired,
    Notice(Notice),
}

#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: Sender<SessionEvent>,
}

impl EventEmitter {
    /// Create an emitter and the receiver the shell listens on
    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event dropped, no listener");
        }
    }

    pub fn login_required(&self) {
        self.emit(SessionEvent::LoginRequired);
    }

    pub fn info(&self, title: &str, description: &str) {
        self.emit(SessionEvent::Notice(Notice {
            title: title.to_string(),
            description: description.to_string(),
            level: NoticeLevel::Info,
        }));
    }

    pub fn destructive(&self, title: &str, description: &str) {
        self.emit(SessionEvent::Notice(Notice {
            title: title.to_string(),
            description: description.to_string(),
            level: NoticeLevel::Destructive,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (events, rx) = EventEmitter::channel();
        events.info("Connected", "WebSocket connected successfully.");
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Notice(Notice {
                title: "Connected".to_string(),
                description: "WebSocket connected successfully.".to_string(),
                level: NoticeLevel::Info,
            })
        );

        drop(rx);
        events.login_required();
    }
}
