//! Per-agent mailboxes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::Message;

/// Inbound queue for one agent
///
/// Backed by an unbounded channel, so messages from one sender come out in the
/// order they went in. Reads are destructive.
#[derive(Clone)]
pub struct Mailbox {
    tx: mpsc::UnboundedSender<Message>,
    rx: Arc<parking_lot::Mutex<mpsc::UnboundedReceiver<Message>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(parking_lot::Mutex::new(rx)),
        }
    }

    /// Enqueue a message
    pub fn push(&self, message: Message) -> Result<(), ChannelError> {
        self.tx.send(message).map_err(|_| ChannelError::Closed)
    }

    /// Take everything queued since the previous drain
    pub fn drain(&self) -> Vec<Message> {
        let mut guard = self.rx.lock();
        let mut messages = Vec::with_capacity(guard.len());
        while let Ok(message) = guard.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.rx.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,
}
