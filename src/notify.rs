//! User-facing notices.
//!
//! Two kinds of notice exist: transient ones (a toast, a log line) that never
//! block, and the auth-failure dialog, which stays up until the user
//! acknowledges it. At most one auth-failure dialog is visible at a time;
//! further requests to show one while it is up are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Title of the dialog shown when the session ends.
pub const AUTH_FAILURE_TITLE: &str = "Session ended";

/// Callback run once the user acknowledges the auth-failure dialog.
pub type AcknowledgeHook = Arc<dyn Fn() + Send + Sync>;

/// Presentation backend for notices.
#[async_trait]
pub trait NoticeSink: Send + Sync {
    /// Show a message that disappears on its own.
    fn show_transient(&self, message: &str);

    /// Show a blocking dialog; resolves when the user acknowledges it.
    async fn show_auth_dialog(&self, title: &str, message: &str);
}

/// Sink that only logs. Dialogs are acknowledged immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NoticeSink for LogSink {
    fn show_transient(&self, message: &str) {
        warn!(notice = message, "Request failed");
    }

    async fn show_auth_dialog(&self, title: &str, message: &str) {
        warn!(title, notice = message, "Session ended, login required");
    }
}

/// Terminal sink: notices go to stderr, the dialog waits for Enter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

#[async_trait]
impl NoticeSink for ConsoleSink {
    fn show_transient(&self, message: &str) {
        eprintln!("error: {message}");
    }

    async fn show_auth_dialog(&self, title: &str, message: &str) {
        use tokio::io::AsyncBufReadExt;

        eprintln!("\n[{title}] {message}");
        eprintln!("Press Enter to continue.");
        let mut line = String::new();
        let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
        // EOF counts as acknowledgement.
        let _ = stdin.read_line(&mut line).await;
    }
}

/// Routes notices to a [`NoticeSink`] and de-duplicates auth-failure dialogs.
pub struct Notifier {
    sink: Arc<dyn NoticeSink>,
    showing: Arc<AtomicBool>,
    dialog: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NoticeSink>) -> Self {
        Self {
            sink,
            showing: Arc::new(AtomicBool::new(false)),
            dialog: Mutex::new(None),
        }
    }

    /// Show a non-blocking notice.
    pub fn notify_transient(&self, message: &str) {
        self.sink.show_transient(message);
    }

    /// Open the auth-failure dialog unless one is already showing.
    ///
    /// Returns `true` if a dialog was opened. The dialog runs in its own task;
    /// the flag is cleared once the user acknowledges, and `on_acknowledge`
    /// runs after that. Must be called from within a tokio runtime.
    pub fn notify_auth_failure(
        &self,
        title: &str,
        message: &str,
        on_acknowledge: Option<AcknowledgeHook>,
    ) -> bool {
        if self
            .showing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Auth failure dialog already showing");
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available to present the auth failure dialog");
            self.showing.store(false, Ordering::Release);
            return false;
        };

        info!(title, "Presenting auth failure dialog");
        let sink = Arc::clone(&self.sink);
        let showing = Arc::clone(&self.showing);
        let title = title.to_string();
        let message = message.to_string();
        let handle = runtime.spawn(async move {
            sink.show_auth_dialog(&title, &message).await;
            showing.store(false, Ordering::Release);
            if let Some(hook) = on_acknowledge {
                hook();
            }
        });

        if let Ok(mut slot) = self.dialog.lock() {
            *slot = Some(handle);
        }
        true
    }

    /// Whether an auth-failure dialog is currently up.
    pub fn is_showing(&self) -> bool {
        self.showing.load(Ordering::Acquire)
    }

    /// Wait until the open dialog (if any) has been acknowledged.
    pub async fn flush(&self) {
        loop {
            let handle = match self.dialog.lock() {
                Ok(mut slot) => slot.take(),
                Err(_) => None,
            };
            let Some(handle) = handle else { break };
            if let Err(e) = handle.await {
                warn!(error = %e, "Auth failure dialog task failed");
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("showing", &self.is_showing())
            .finish()
    }
}
