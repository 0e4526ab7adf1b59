//! Background delivery thread fed by a bounded queue.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;

use super::{AlertDispatcher, AlertEvent};

/// Alerts allowed to wait for delivery before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Counters reported when the worker shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    /// Rejected by `submit` because the queue was full or closed.
    pub dropped: u64,
}

/// Owns an `AlertDispatcher` on a dedicated thread.
///
/// The run loop hands events over with `submit`, which never blocks. Debounce
/// state is already updated by then, so a slow or failing delivery cannot
/// affect which frames fire.
pub struct DispatchWorker {
    sender: Option<SyncSender<AlertEvent>>,
    handle: Option<JoinHandle<DispatchStats>>,
    dropped: u64,
}

impl DispatchWorker {
    pub fn spawn(dispatcher: AlertDispatcher, capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || run_worker(dispatcher, receiver))
            .context("spawn alert dispatch thread")?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            dropped: 0,
        })
    }

    /// Queue an event for delivery. Returns false if it was dropped.
    pub fn submit(&mut self, event: AlertEvent) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            self.dropped += 1;
            log::warn!("alert dropped: dispatch worker already stopped");
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::warn!("alert dropped: dispatch queue full");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                log::error!("alert dropped: dispatch worker exited");
                false
            }
        }
    }

    /// Close the queue and wait for queued deliveries to finish.
    ///
    /// Safe to call more than once; later calls only report `dropped`.
    pub fn shutdown(&mut self) -> DispatchStats {
        self.sender.take();
        let mut stats = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                log::error!("alert dispatch thread panicked");
                DispatchStats::default()
            }
            None => DispatchStats::default(),
        };
        stats.dropped = self.dropped;
        stats
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn run_worker(dispatcher: AlertDispatcher, receiver: Receiver<AlertEvent>) -> DispatchStats {
    let mut stats = DispatchStats::default();
    for event in receiver {
        match dispatcher.dispatch(event) {
            Ok(_) => stats.delivered += 1,
            Err(_) => stats.failed += 1,
        }
    }
    stats
}
