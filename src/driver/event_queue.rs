//! Many-producer, single-consumer mailbox
//!
//! Unbounded so that an interrupt handler never waits and never loses an edge. Each
//! producer's messages arrive in the order it sent them; there is no total order
//! between independent producers.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Producer side, cheap to clone into interrupt handlers and tasks
#[derive(Debug)]
pub struct EventSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: std::fmt::Debug> EventSender<T> {
    /// Enqueues `msg`; never blocks
    ///
    /// Returns `false` only when the consumer is gone, i.e. during shutdown.
    pub fn send(&self, msg: T) -> bool {
        match self.tx.send(msg) {
            Ok(()) => true,
            Err(mpsc::error::SendError(msg)) => {
                trace!("Dropping {:?}, consumer closed", msg);
                false
            }
        }
    }
}

/// Consumer side, owned by exactly one thread
#[derive(Debug)]
pub struct EventQueue<T> {
    rx: mpsc::UnboundedReceiver<T>,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { rx, tx }
    }

    pub fn sender(&self) -> EventSender<T> {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Waits up to `timeout` for the next message
    pub async fn receive(&mut self, timeout: Duration) -> Option<T> {
        // the queue keeps a sender of its own, so `recv` only yields `None` on timeout
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Takes the next message if one is already waiting
    pub fn try_receive(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
