use std::time::Duration;
use tokio::time::Instant;

/// How long after a shown error further errors stay suppressed.
pub const ERROR_THROTTLE_WINDOW: Duration = Duration::from_millis(5000);

/// Mute length when the user does not pick one.
pub const DEFAULT_MUTE: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

/// The message a rendering layer should currently display, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
}

/// Rate-limited, user-mutable channel for surfacing failures.
///
/// Transient errors go through [`ErrorNotifier::notify_error`], which shows
/// at most one toast per throttle window and nothing at all while muted.
/// State-change notices (failover, session expiry) and direct user actions
/// go through [`ErrorNotifier::announce`], which bypasses the throttle and
/// does not advance it: a transition notice must not eat the window of the
/// next real error.
#[derive(Debug, Default)]
pub struct ErrorNotifier {
    last_shown: Option<Instant>,
    mute_until: Option<Instant>,
    toast: Option<Toast>,
}

impl ErrorNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Throttled error path. Returns whether the message was surfaced.
    pub fn notify_error(&mut self, message: impl Into<String>, now: Instant) -> bool {
        if let Some(mute_until) = self.mute_until {
            if now < mute_until {
                return false;
            }
        }
        // tokio's duration_since saturates to zero for out-of-order stamps.
        if let Some(last) = self.last_shown {
            if now.duration_since(last) <= ERROR_THROTTLE_WINDOW {
                return false;
            }
        }
        self.last_shown = Some(now);
        self.toast = Some(Toast {
            message: message.into(),
            severity: Severity::Error,
        });
        true
    }

    /// Unthrottled path for significant transitions and user actions.
    pub fn announce(&mut self, message: impl Into<String>, severity: Severity) {
        self.toast = Some(Toast {
            message: message.into(),
            severity,
        });
    }

    /// Suppress error toasts until `now + duration` and confirm to the user.
    pub fn mute(&mut self, duration: Duration, now: Instant) {
        self.mute_until = Some(now + duration);
        self.announce(
            format!("error notifications muted for {}s", duration.as_secs()),
            Severity::Info,
        );
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    /// Called by the rendering layer once it has dismissed the toast.
    pub fn take_toast(&mut self) -> Option<Toast> {
        self.toast.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn throttle_shows_first_and_post_window_errors_only() {
        let base = Instant::now();
        let mut notifier = ErrorNotifier::new();

        assert!(notifier.notify_error("a", at(base, 0)));
        assert!(!notifier.notify_error("b", at(base, 1000)));
        assert!(notifier.notify_error("c", at(base, 6000)));
        assert_eq!(notifier.toast().unwrap().message, "c");
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let base = Instant::now();
        let mut notifier = ErrorNotifier::new();

        assert!(notifier.notify_error("a", at(base, 0)));
        assert!(!notifier.notify_error("b", at(base, 5000)));
        assert!(notifier.notify_error("c", at(base, 5001)));
    }

    #[test]
    fn mute_suppresses_until_expiry_then_throttle_resumes() {
        let base = Instant::now();
        let mut notifier = ErrorNotifier::new();

        notifier.mute(DEFAULT_MUTE, at(base, 0));
        // The mute confirmation itself is visible.
        assert_eq!(notifier.toast().unwrap().severity, Severity::Info);

        assert!(!notifier.notify_error("a", at(base, 1)));
        assert!(!notifier.notify_error("b", at(base, 59_999)));
        assert!(notifier.notify_error("c", at(base, 60_000)));
    }

    #[test]
    fn announce_bypasses_mute_and_does_not_advance_throttle() {
        let base = Instant::now();
        let mut notifier = ErrorNotifier::new();

        notifier.mute(DEFAULT_MUTE, at(base, 0));
        notifier.announce("falling back to polling", Severity::Error);
        assert_eq!(
            notifier.toast().unwrap().message,
            "falling back to polling"
        );

        // First throttled error after the mute expires still shows: the
        // announce above must not have counted as a shown error.
        assert!(notifier.notify_error("late", at(base, 60_000)));
    }
}
