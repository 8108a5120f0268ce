//! Session notifications.

use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

/// Events emitted by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One line arrived; may be empty when the server sends doubled EOL markers
    MessageReceived {
        /// Line text without its terminator
        line: String,
    },
    /// The session terminated. Emitted exactly once, and nothing follows it.
    ConnectionClosed,
}

/// Receives session notifications.
///
/// Callbacks run on the session's tasks and must not block.
pub trait SessionObserver: Send + Sync + fmt::Debug {
    /// A line was read from the socket
    fn on_message(&self, line: &str);
    /// The session closed
    fn on_closed(&self);
}

/// Observer forwarding events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    /// Create the observer and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("session event dropped: receiver gone");
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_message(&self, line: &str) {
        self.forward(SessionEvent::MessageReceived {
            line: line.to_string(),
        });
    }

    fn on_closed(&self) {
        self.forward(SessionEvent::ConnectionClosed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_message("login:");
        observer.on_message("");
        observer.on_closed();

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::MessageReceived {
                line: "login:".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::MessageReceived { line: "".into() }
        );
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ConnectionClosed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_message("nobody listening");
        observer.on_closed();
    }
}
