//! # Notification Bridge
//!
//! Fire-and-forget delivery of [`EngineEvent`]s over a bounded channel. Workers
//! never block on a slow consumer: when the channel is full the event is
//! dropped, which is harmless because every event only means "pull again".

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::trace;

use crate::pipeline::events::EngineEvent;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<EngineEvent>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn notify(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!("notification channel full; dropping {event:?}");
            }
            Err(TrySendError::Disconnected(event)) => {
                trace!("notification receiver gone; dropping {event:?}");
            }
        }
    }
}
