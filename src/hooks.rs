//! Process-wide failure handler
//!
//! Allocation failure is fatal by default: the handler prints a diagnostic,
//! appends it to `mem_error.log` and terminates the process. Callers probing
//! allocations whose success is not guaranteed install `None` for the
//! duration of the probe, which turns the aborting wrappers into silent
//! `None`/no-op returns, then restore the previous handler.
//!
//! The `try_*` operations never consult this handler.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::error::MemError;

/// Handler invoked with the failure before the aborting wrapper returns
pub type FailureHandler = Arc<dyn Fn(&MemError) + Send + Sync>;

/// Log file the default handler appends to, in the working directory
pub const FAILURE_LOG_FILE: &str = "mem_error.log";

enum Slot {
    /// Default terminate-with-diagnostic behavior
    Default,
    /// Probing mode: failures propagate silently
    Silent,
    /// Caller-supplied handler
    Custom(FailureHandler),
}

static HANDLER: RwLock<Slot> = RwLock::new(Slot::Default);

/// Installs a failure handler; `None` selects silent propagation.
/// Returns nothing; fetch the previous handler first with
/// [`failure_handler`] if it must be restored.
pub fn set_failure_handler(handler: Option<FailureHandler>) {
    *HANDLER.write() = match handler {
        Some(h) => Slot::Custom(h),
        None => Slot::Silent,
    };
}

/// Returns the currently installed handler.
///
/// `None` means silent propagation is active. The default handler is
/// returned as a callable, so a save/replace/restore sequence works
/// uniformly whether or not a custom handler was installed.
pub fn failure_handler() -> Option<FailureHandler> {
    match &*HANDLER.read() {
        Slot::Default => Some(default_failure_handler()),
        Slot::Silent => None,
        Slot::Custom(h) => Some(h.clone()),
    }
}

/// Restores the built-in terminate-with-diagnostic behavior
pub fn reset_failure_handler() {
    *HANDLER.write() = Slot::Default;
}

/// The built-in handler: stderr + log file, then exit(1)
pub fn default_failure_handler() -> FailureHandler {
    Arc::new(|err: &MemError| {
        let msg = err.to_string();
        error!(target: "segmem", "{msg}");
        eprintln!("segmem: {msg}");
        let _ = append_failure_log(Path::new(FAILURE_LOG_FILE), &msg);
        std::process::exit(1);
    })
}

/// Routes a failure through the installed handler.
/// Returns normally only when the handler does (silent mode, or a custom
/// handler that chooses not to terminate).
pub(crate) fn report_failure(err: &MemError) {
    let handler = match &*HANDLER.read() {
        Slot::Default => Some(default_failure_handler()),
        Slot::Silent => None,
        Slot::Custom(h) => Some(h.clone()),
    };
    if let Some(h) = handler {
        h(err);
    }
}

/// Appends one diagnostic line to the failure log
pub(crate) fn append_failure_log(path: &Path, msg: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{msg}")
}
