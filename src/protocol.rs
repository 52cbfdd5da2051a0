//! Inter-agent messaging: envelopes, routing, history

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::channel::Mailbox;
use crate::registry::Registry;

/// Unique identifier for a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Generate a new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Query,
    Response,
    Proposal,
    Vote,
    Alert,
    Status,
}

/// Where a message is addressed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Agent(AgentId),
    /// Every registered agent except the sender
    Broadcast,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(id) => id.fmt(f),
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// An immutable message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    message_type: MessageType,
    sender: AgentId,
    receiver: Recipient,
    payload: Value,
    timestamp: DateTime<Utc>,
    /// Remaining relay hops
    ttl: u32,
    /// First message of a relay chain, set on relayed copies only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<MessageId>,
}

impl Message {
    /// Create a message with a fresh id and the current time
    pub fn new(
        message_type: MessageType,
        sender: AgentId,
        receiver: Recipient,
        payload: Value,
        ttl: u32,
    ) -> Self {
        Self {
            id: MessageId::new(),
            message_type,
            sender,
            receiver,
            payload,
            timestamp: Utc::now(),
            ttl,
            origin: None,
        }
    }

    /// Get the message ID
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Get the message kind
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Get the sending agent
    pub fn sender(&self) -> &AgentId {
        &self.sender
    }

    /// Get the addressee, a single agent or broadcast
    pub fn receiver(&self) -> &Recipient {
        &self.receiver
    }

    /// Get the message body
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Get the creation time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the remaining hop budget
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// ID of the first message in the relay chain, `None` for originals
    pub fn origin(&self) -> Option<MessageId> {
        self.origin
    }

    /// The copy forwarded one hop further, or `None` once the budget is spent.
    ///
    /// The copy is a new envelope with its own id and points back at the
    /// first message of the chain.
    fn forwarded(&self) -> Option<Self> {
        let ttl = self.ttl.checked_sub(1)?;
        Some(Self {
            id: MessageId::new(),
            timestamp: Utc::now(),
            ttl,
            origin: Some(self.origin.unwrap_or(self.id)),
            ..self.clone()
        })
    }
}

/// Routes messages between registered agents
///
/// Every send is appended to a history log; the log is for inspection only and
/// routing never reads it.
pub struct CommunicationProtocol {
    registry: Arc<Registry>,
    mailboxes: RwLock<HashMap<AgentId, Mailbox>>,
    history: Mutex<Vec<Message>>,
    default_ttl: u32,
}

impl CommunicationProtocol {
    /// Create a protocol routing over `registry`'s agents
    pub fn new(registry: Arc<Registry>, default_ttl: u32) -> Self {
        Self {
            registry,
            mailboxes: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            default_ttl,
        }
    }

    /// Build a message stamped with the default hop budget
    pub fn message(
        &self,
        message_type: MessageType,
        sender: &AgentId,
        receiver: Recipient,
        payload: Value,
    ) -> Message {
        Message::new(message_type, sender.clone(), receiver, payload, self.default_ttl)
    }

    /// Build a query to a single agent
    pub fn query(&self, sender: &AgentId, receiver: &AgentId, content: Value) -> Message {
        self.message(MessageType::Query, sender, Recipient::Agent(receiver.clone()), content)
    }

    /// Build a reply to `in_reply_to`
    pub fn response(
        &self,
        sender: &AgentId,
        receiver: &AgentId,
        content: Value,
        in_reply_to: MessageId,
    ) -> Message {
        self.message(
            MessageType::Response,
            sender,
            Recipient::Agent(receiver.clone()),
            serde_json::json!({ "response": content, "in_reply_to": in_reply_to }),
        )
    }

    /// Route a message and return the agents it was enqueued to.
    ///
    /// An unknown unicast receiver yields an empty list. That is a routing
    /// outcome, so callers inspect the list rather than expect an error.
    pub fn send(&self, message: Message) -> Vec<AgentId> {
        let recipients = match message.receiver() {
            Recipient::Broadcast => self
                .registry
                .ids()
                .into_iter()
                .filter(|id| id != message.sender())
                .collect(),
            Recipient::Agent(id) if self.registry.contains(id) => vec![id.clone()],
            Recipient::Agent(id) => {
                debug!(receiver = %id, "No such receiver, message not enqueued");
                Vec::new()
            }
        };

        self.deliver(message, recipients)
    }

    /// Re-forward a message received by `via` to `via`'s neighbors.
    ///
    /// The original sender is skipped and the hop budget drops by one. A message
    /// with no budget left is not forwarded.
    pub fn relay(&self, message: &Message, via: &AgentId) -> Vec<AgentId> {
        let Some(forwarded) = message.forwarded() else {
            debug!(message_id = %message.id(), "Hop budget spent, not relaying");
            return Vec::new();
        };

        let recipients = match self.registry.neighbors(via) {
            Ok(neighbors) => neighbors
                .into_iter()
                .filter(|id| id != message.sender())
                .collect(),
            Err(e) => {
                warn!(via = %via, error = %e, "Cannot relay through unknown agent");
                return Vec::new();
            }
        };

        self.deliver(forwarded, recipients)
    }

    fn deliver(&self, message: Message, recipients: Vec<AgentId>) -> Vec<AgentId> {
        // enqueue and log under one lock so history order matches delivery order
        let mut history = self.history.lock();
        for recipient in &recipients {
            if let Err(e) = self.mailbox(recipient).push(message.clone()) {
                warn!(recipient = %recipient, error = %e, "Mailbox rejected message");
            }
        }

        debug!(
            message_id = %message.id(),
            kind = ?message.message_type(),
            sender = %message.sender(),
            delivered = recipients.len(),
            "Message routed"
        );
        history.push(message);
        recipients
    }

    fn mailbox(&self, id: &AgentId) -> Mailbox {
        if let Some(mailbox) = self.mailboxes.read().get(id) {
            return mailbox.clone();
        }
        self.mailboxes.write().entry(id.clone()).or_default().clone()
    }

    /// Drain an agent's mailbox, oldest first
    pub fn poll(&self, id: &AgentId) -> Vec<Message> {
        match self.mailboxes.read().get(id) {
            Some(mailbox) => mailbox.drain(),
            None => Vec::new(),
        }
    }

    /// Queued message count, without draining
    pub fn pending(&self, id: &AgentId) -> usize {
        self.mailboxes.read().get(id).map_or(0, Mailbox::len)
    }

    /// Every message ever sent, in send order
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }
}
