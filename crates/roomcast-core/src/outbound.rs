//! Send capability abstraction.
//!
//! The registry never inspects a connection's transport. It only calls
//! [`Outbound::send`], which must hand the payload to the transport's own
//! buffering and return without waiting on the network.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::SendError;

/// Outbound half of a connection.
pub trait Outbound: Send + Sync {
    /// Queue a payload for delivery to the remote peer.
    ///
    /// Must not block. Returns an error if the transport can no longer accept
    /// the payload (closed connection, full buffer).
    fn send(&self, payload: &str) -> Result<(), SendError>;
}

impl Outbound for mpsc::UnboundedSender<String> {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        mpsc::UnboundedSender::send(self, payload.to_owned()).map_err(|_| SendError::Closed)
    }
}

impl Outbound for mpsc::Sender<String> {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        self.try_send(payload.to_owned()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

impl<O: Outbound + ?Sized> Outbound for Arc<O> {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        (**self).send(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_sender_reports_full_then_closed() {
        let (tx, rx) = mpsc::channel::<String>(1);

        assert_eq!(Outbound::send(&tx, "one"), Ok(()));
        assert_eq!(Outbound::send(&tx, "two"), Err(SendError::Full));

        drop(rx);
        assert_eq!(Outbound::send(&tx, "three"), Err(SendError::Closed));
    }

    #[test]
    fn shared_outbound_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let shared: Arc<dyn Outbound> = Arc::new(tx);

        shared.send("via arc").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "via arc");
    }
}
