//! Transient, non-blocking user notices ("toasts").
//! The UI drains the receiver at its own pace; a missing UI is not an error.

use crossbeam_channel as cb;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: cb::Sender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Notifier, cb::Receiver<Notice>) {
        let (tx, rx) = cb::unbounded();
        (Notifier { tx }, rx)
    }

    /// Never blocks.
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let _ = self.tx.send(Notice {
            level,
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Warning, message);
    }
}
