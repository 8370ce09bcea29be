//! Message types for the synchronization actor

use std::time::Duration;

use tokio::sync::oneshot;

/// Commands accepted by the synchronization actor
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a synchronization round immediately
    SyncNow {
        respond_to: oneshot::Sender<SyncReport>,
    },

    /// Change the period between rounds
    ///
    /// The next round runs one full period after the update.
    UpdatePeriod { period: Duration },

    /// Stop the actor; answered once the loop has ended
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Outcome of one synchronization round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Local snapshots written to the store
    pub published: usize,

    /// Foreign snapshots loaded into local attributes
    pub applied: usize,

    /// Attributes that could not be synchronized
    pub failed: usize,
}
