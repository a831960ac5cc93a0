/// Errors that can occur in the transport layer.
///
/// Covers both the signaling transport (WebSocket) and the real-time
/// media engine behind the [`crate::rtc`] traits.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,

    /// Offer/answer negotiation failed (bad SDP, wrong signaling state).
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A data channel was used while not open.
    #[error("data channel '{0}' is not open")]
    ChannelNotOpen(String),

    /// Any other failure reported by the media engine.
    #[error("media engine error: {0}")]
    Engine(String),
}

impl TransportError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Closed channels and shut-down transports are final; everything
    /// else is treated as transient.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::ConnectionClosed(_) | Self::ChannelNotOpen(_) | Self::Shutdown
        )
    }
}
