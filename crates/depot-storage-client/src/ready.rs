use tokio::sync::watch;

/// Externally-owned readiness flag.
///
/// Lifecycle: created down (`false`), set once after a backend has been
/// configured, cleared on teardown. Navigation/UI layers watch it to decide
/// whether to redirect to backend selection; the storage core itself never
/// touches it.
#[derive(Debug)]
pub struct Readiness {
    tx: watch::Sender<bool>,
}

/// Read side of the readiness flag, cheap to clone into watchers.
#[derive(Debug, Clone)]
pub struct ReadinessWatch {
    rx: watch::Receiver<bool>,
}

impl Readiness {
    pub fn new() -> (Self, ReadinessWatch) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ReadinessWatch { rx })
    }

    /// Mark the backend as configured.
    pub fn set_ready(&self) {
        let _ = self.tx.send(true);
    }

    /// Clear on teardown (credential revocation, backend switch).
    pub fn clear(&self) {
        let _ = self.tx.send(false);
    }
}

impl ReadinessWatch {
    /// Current value of the flag.
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the flag becomes `true`.
    ///
    /// Returns immediately if it already is. Errors only when the owning
    /// [`Readiness`] was dropped while still down.
    pub async fn ready(&mut self) -> Result<(), watch::error::RecvError> {
        while !*self.rx.borrow_and_update() {
            self.rx.changed().await?;
        }
        Ok(())
    }
}
