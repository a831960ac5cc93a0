//! Wire types for depthcast.
//!
//! - **Types** ([`StreamType`], [`StreamConfig`], [`SessionId`], status
//!   views): the vocabulary shared by every layer.
//! - **Signaling** ([`SignalMessage`]): events exchanged with a relay.
//! - **Data channel** ([`ChannelMessage`]): point-cloud frames, chunks and
//!   heartbeats sent to viewers.
//! - **API** ([`api`]): request/response bodies for an HTTP front end.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how all of the above become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (SignalMessage) → StreamManager
//! ```

pub mod api;
mod channel;
mod codec;
mod error;
mod signaling;
mod types;

pub use channel::{ChannelMessage, PointCloudSnapshot, Vertex};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use signaling::SignalMessage;
pub use types::{
    DeviceStreamConfig, Resolution, SessionId, SessionStatus, StreamConfig, StreamFormat,
    StreamReferenceInfo, StreamType,
};
