//! Shared cancellation flag.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation flag.
///
/// Cancellation is cooperative: the invoker and the batch coordinator check
/// the flag before each suspension point resumes (stagger wait, backoff wait,
/// next attempt). An attempt that is already in flight runs to completion;
/// there is no mid-attempt abort.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Flip the flag. Idempotent; all clones observe it.
    pub fn cancel(&self) {
        // ignore send error: we always hold a receiver ourselves
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is set. Completes immediately if already set.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // wait_for also checks the current value first
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}
