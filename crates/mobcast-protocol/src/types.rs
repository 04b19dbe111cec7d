//! Message types exchanged with the host.
//!
//! Inbound frames decode into an owned [`InboundMessage`]; outbound
//! frames are described by a borrowed [`Outbound`] so that sending an
//! image does not copy it before encoding.

use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque identity token issued by the host.
///
/// The host hands one out in a `PLAYERID` frame on first contact; the
/// controller persists it and re-asserts it with `RECONNECT:<id>` every
/// time the transport opens again. It is also how other players are
/// addressed (`TONUDE`, `TOIMGNUDE`, `FORWARD`) and how senders are
/// tagged on inbound frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Session-control frames. These drive the identity handshake and
/// keepalive and are never shown to the application directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// `PLAYERID:<id>`: the host assigned an identity.
    PlayerIdAssigned(PlayerId),
    /// `RECONNECT_ACCEPTED[:<id>]`: the host recognised our identity.
    /// Carries the id it accepted when it echoes one.
    ReconnectAccepted(Option<PlayerId>),
    /// `RECONNECT_REJECTED`: the host does not know our identity.
    ReconnectRejected,
    /// `PONG`: keepalive reply.
    Pong,
}

/// One decoded frame from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `STRING:<text>`: game-state text for the application.
    String { text: String },
    /// `IMAGE:[<sender>:]<len>\n<bytes>` or
    /// `PLAYERNUDE:<sender>:<len>\n<bytes>`.
    Image {
        sender: Option<PlayerId>,
        bytes: Vec<u8>,
    },
    /// `AVATAR:[<sender>:]<key>:<len>\n<bytes>`. When the host omits the
    /// sender, the key doubles as it.
    Avatar {
        sender: PlayerId,
        bytes: Vec<u8>,
        key: String,
    },
    /// `FROMNUDE:<sender>:<text>`: text relayed from another player.
    Forwarded { sender: PlayerId, text: String },
    /// Handshake and keepalive frames.
    Control(Control),
}

impl InboundMessage {
    /// Wire tag this message was decoded from (`PLAYERNUDE` reports as
    /// `IMAGE`), for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::String { .. } => "STRING",
            Self::Image { .. } => "IMAGE",
            Self::Avatar { .. } => "AVATAR",
            Self::Forwarded { .. } => "FROMNUDE",
            Self::Control(Control::PlayerIdAssigned(_)) => "PLAYERID",
            Self::Control(Control::ReconnectAccepted(_)) => "RECONNECT_ACCEPTED",
            Self::Control(Control::ReconnectRejected) => "RECONNECT_REJECTED",
            Self::Control(Control::Pong) => "PONG",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Rotation rate and acceleration from the device's motion sensors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroReading {
    pub rotation_rate: [f32; 3],
    pub acceleration: [f32; 3],
}

/// A frame the controller sends to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outbound<'a> {
    /// `STRING:<text>`
    String(&'a str),
    /// `IMAGE:<len>\n<bytes>`
    Image(&'a [u8]),
    /// `TOIMGNUDE:<target>:<len>\n<bytes>`
    ImageToPlayer { target: &'a PlayerId, bytes: &'a [u8] },
    /// `TONUDE:<target>:<text>`
    TextToPlayer { target: &'a PlayerId, text: &'a str },
    /// `FORWARD:<target>:<text>`
    Forward { target: &'a PlayerId, text: &'a str },
    /// `INPUT:<state>`
    InputState(&'a str),
    /// `GYRO:G:x,y,z|A:x,y,z`
    Gyro(GyroReading),
    /// `MOUSE:x,y`
    Mouse { x: f32, y: f32 },
    /// `GETDEVICES`
    GetDevices,
    /// `RECONNECT:<id>`
    Reconnect(&'a PlayerId),
    /// `PING`
    Ping,
}

impl Outbound<'_> {
    /// The frame's wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::String(_) => "STRING",
            Self::Image(_) => "IMAGE",
            Self::ImageToPlayer { .. } => "TOIMGNUDE",
            Self::TextToPlayer { .. } => "TONUDE",
            Self::Forward { .. } => "FORWARD",
            Self::InputState(_) => "INPUT",
            Self::Gyro(_) => "GYRO",
            Self::Mouse { .. } => "MOUSE",
            Self::GetDevices => "GETDEVICES",
            Self::Reconnect(_) => "RECONNECT",
            Self::Ping => "PING",
        }
    }
}
