//! PSI/SI archiver subprocess (spec §4.3).
//!
//! A sibling subprocess fed the raw pre-encode TS to emit a compact `.psc`
//! sidecar. The core only ever calls `start`/`push_chunk`/`stop`; its
//! internals (argv shape, idempotence, unconditional teardown) are the
//! contract spec.md §4.3/§6 pins down.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Supervises the `psisiarc` subprocess for a single recording session.
pub struct PsiArchiver {
    binary: String,
    stop_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl PsiArchiver {
    /// Creates an archiver that has not yet been started.
    pub fn new(binary: impl Into<String>, stop_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            stop_timeout,
            child: Mutex::new(None),
        }
    }

    /// Starts the archiver for `service_id`, writing to `out_path`.
    ///
    /// Idempotent: a second call while already running is a no-op (spec
    /// §4.3, "start is idempotent").
    pub async fn start(&self, service_id: u32, out_path: &Path) -> std::io::Result<()> {
        if self.child.lock().is_some() {
            debug!("[PsiArchiver] start called while already running, ignoring");
            return Ok(());
        }

        let child = Command::new(&self.binary)
            .arg("-r")
            .arg("arib-data")
            .arg("-n")
            .arg(service_id.to_string())
            .arg("-i")
            .arg("1")
            .arg("-")
            .arg(out_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        *self.child.lock() = Some(child);
        Ok(())
    }

    /// Pushes a chunk of raw pre-encode TS bytes to the archiver's stdin.
    ///
    /// Back-pressure or broken-pipe errors are swallowed: writes must never
    /// block or interrupt the broadcast path, and the recording tee must
    /// keep running even if the archiver stalls (spec §4.3, §7
    /// `ArchiverIOError`).
    pub async fn push_chunk(&self, chunk: &Bytes) {
        let stdin = {
            let mut guard = self.child.lock();
            match guard.as_mut().and_then(|c| c.stdin.take()) {
                Some(stdin) => stdin,
                None => return,
            }
        };
        let mut stdin = stdin;
        let result = stdin.write_all(chunk).await;
        let mut guard = self.child.lock();
        if let Some(child) = guard.as_mut() {
            child.stdin = Some(stdin);
        }
        if let Err(err) = result {
            warn!("[PsiArchiver] stdin write failed, archive may be truncated: {err}");
        }
    }

    /// Stops the archiver, waiting up to the configured timeout before
    /// abandoning the process. The handle is cleared unconditionally, even
    /// on timeout (spec §4.3, "the handle is cleared unconditionally").
    pub async fn stop(&self) {
        let child = self.child.lock().take();
        let Some(mut child) = child else {
            return;
        };
        // Drop stdin first so the child sees EOF and can flush its archive.
        child.stdin.take();
        if let Err(err) = child.start_kill() {
            warn!("[PsiArchiver] failed to signal subprocess: {err}");
        }
        match timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("[PsiArchiver] exited with {status}"),
            Ok(Err(err)) => warn!("[PsiArchiver] wait failed: {err}"),
            Err(_) => warn!("[PsiArchiver] did not exit within timeout, abandoning"),
        }
    }

    /// Whether the archiver is currently running.
    pub fn is_running(&self) -> bool {
        self.child.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let archiver = PsiArchiver::new("psisiarc", Duration::from_secs(3));
        archiver.stop().await;
        assert!(!archiver.is_running());
    }

    #[tokio::test]
    async fn push_chunk_without_start_is_a_no_op() {
        let archiver = PsiArchiver::new("psisiarc", Duration::from_secs(3));
        archiver.push_chunk(&Bytes::from_static(b"\x47")).await;
    }
}
