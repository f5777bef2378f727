use std::time::{Duration, Instant};

/// How long a toast stays on screen before it dismisses itself.
pub const AUTO_DISMISS: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub text: String,
    pub severity: Severity,
    shown_at: Instant,
}

/// Single-slot toast, last write wins: showing a new notification while one
/// is visible replaces it, and the dismiss window restarts.
#[derive(Debug, Default)]
pub struct NotificationSlot {
    current: Option<Notification>,
}

impl NotificationSlot {
    pub fn show(&mut self, text: impl Into<String>, severity: Severity) {
        self.current = Some(Notification {
            text: text.into(),
            severity,
            shown_at: Instant::now(),
        });
    }

    pub fn close(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    /// Drops the toast once it has been visible for the full dismiss window.
    pub fn tick(&mut self, now: Instant) {
        if let Some(notification) = &self.current {
            if now.duration_since(notification.shown_at) >= AUTO_DISMISS {
                self.current = None;
            }
        }
    }
}
