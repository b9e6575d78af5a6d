//! Cooperative stop signal shared by the watch loop and every worker.
//!
//! A [`ShutdownTrigger`] owns the only sender of a zero-capacity channel.
//! Triggering drops that sender, which wakes every blocked
//! `crossbeam_channel::select!` on [`ShutdownSignal::receiver`] at once, so
//! waits are cancelled without polling. An atomic flag mirrors the state for
//! cheap checks between waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

/// Creates a connected trigger and signal.
#[must_use]
pub fn shutdown_pair() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    let flag = Arc::new(AtomicBool::new(false));
    (
        ShutdownTrigger {
            flag: Arc::clone(&flag),
            tx: Mutex::new(Some(tx)),
        },
        ShutdownSignal { flag, rx },
    )
}

/// The sending half of the stop signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    flag: Arc<AtomicBool>,
    tx: Mutex<Option<Sender<()>>>,
}

impl ShutdownTrigger {
    /// Signals every [`ShutdownSignal`] clone.
    ///
    /// Returns `true` the first time, `false` if already triggered.
    pub fn trigger(&self) -> bool {
        self.flag.store(true, Ordering::Release);
        self.tx.lock().take().is_some()
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    #[inline]
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// The receiving half of the stop signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// Returns `true` once the trigger has fired.
    #[inline]
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns the channel to include in a `select!`.
    ///
    /// It never yields a message; a receive completes with a disconnect
    /// error as soon as the trigger fires.
    #[inline]
    #[must_use]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

}
