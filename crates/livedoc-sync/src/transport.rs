//! Client transport seam and registered sessions

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;
use crate::message::SyncMessage;

/// Delivery path to one subscriber
///
/// `send` must not block: transports backed by sockets should hand the
/// message to their own writer task.
pub trait ClientTransport: Send + Sync + fmt::Debug {
    /// Deliver one message
    ///
    /// # Errors
    /// Any error deregisters the client
    fn send(&self, message: &SyncMessage) -> Result<(), TransportError>;
}

/// Transport feeding an in-process channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<SyncMessage>,
}

impl ChannelTransport {
    /// Transport plus the receiving end a hub or test reads from
    #[must_use]
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<SyncMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ClientTransport for ChannelTransport {
    fn send(&self, message: &SyncMessage) -> Result<(), TransportError> {
        self.sender
            .send(message.clone())
            .map_err(|_| TransportError::Closed)
    }
}

/// A registered subscriber
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Session id
    pub id: Uuid,
    /// Delivery path
    pub transport: Arc<dyn ClientTransport>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl ClientSession {
    /// Create session with a fresh id
    #[must_use]
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            registered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_transport_reports_closed_receiver() {
        let (transport, mut receiver) = ChannelTransport::pair();
        let message = SyncMessage::status(json!({"ok": true}));

        transport.send(&message).unwrap();
        assert_eq!(receiver.try_recv().unwrap(), message);

        drop(receiver);
        assert_eq!(transport.send(&message), Err(TransportError::Closed));
    }
}
