//! Wire protocol for mobcast controllers.
//!
//! - **Types** ([`InboundMessage`], [`Outbound`], [`PlayerId`]): what
//!   travels between a controller and the host.
//! - **Codec** ([`encode`], [`FrameDecoder`]): the tag-prefixed frame
//!   format, including length-prefixed binary frames.
//! - **Connection strings** ([`parse_connection_string`],
//!   [`decode_deep_link`]): turning user input into an
//!   [`Endpoint`](mobcast_transport::Endpoint).
//!
//! ```text
//! Transport (bytes) → Protocol (InboundMessage) → Session (lifecycle, events)
//! ```

mod codec;
mod deep_link;
mod endpoint;
mod error;
mod types;

pub use codec::{
    BinaryEncoding, FrameDecoder, Framing, MAX_HEADER_LEN, MAX_PAYLOAD_LEN,
    encode,
};
pub use deep_link::{DEFAULT_DEEP_LINK_PARAM, decode_deep_link, deep_link_url};
pub use endpoint::parse_connection_string;
pub use error::ProtocolError;
pub use types::{Control, GyroReading, InboundMessage, Outbound, PlayerId};
