//! Frame encoder and decoder.
//!
//! The wire format is tag-prefixed UTF-8. The tag runs up to the first
//! `:` (or the whole frame for bare tokens like `PING`/`PONG`). There
//! are two shapes:
//!
//! - **Text frames**: `TAG:payload`. The payload runs to the first `\n`
//!   or to the end of the delivery unit.
//! - **Binary frames**: `TAG:[fields:]len\n<len bytes>`. The header ends
//!   at the first `\n` and exactly `len` payload bytes follow. Anything
//!   after those bytes is the start of the next frame.
//!
//! ```text
//! STRING:round 3 starts
//! PLAYERNUDE:p-7:5\nHELLO
//! ```
//!
//! [`FrameDecoder`] never fails: a frame it cannot make sense of is
//! logged, counted and skipped, and decoding carries on with whatever
//! follows it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mobcast_transport::TransportKind;
use serde::{Deserialize, Serialize};

use crate::{Control, InboundMessage, Outbound, PlayerId, ProtocolError};

/// Longest binary header accepted before its `\n` must show up.
pub const MAX_HEADER_LEN: usize = 256;

/// Largest payload a binary frame may declare (16 MiB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// How binary payloads are carried on the wire.
///
/// `Raw` puts the payload bytes straight after the header, which is what
/// existing hosts expect. `Base64` sends the payload as base64 text (the
/// declared length is the encoded length), which survives transports
/// that re-encode messages as text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BinaryEncoding {
    #[default]
    Raw,
    Base64,
}

/// How decoder input is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Input is an arbitrary slice of a byte stream. A binary frame cut
    /// short is buffered until the rest arrives.
    Stream,
    /// Each push is one complete message. A binary frame cut short is an
    /// error.
    Message,
}

impl From<TransportKind> for Framing {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Stream => Self::Stream,
            TransportKind::Message => Self::Message,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Builds the wire bytes for one outbound frame.
pub fn encode(frame: &Outbound<'_>, encoding: BinaryEncoding) -> Vec<u8> {
    match *frame {
        Outbound::String(text) => text_frame("STRING:", text),
        Outbound::Image(bytes) => binary_frame("IMAGE:", bytes, encoding),
        Outbound::ImageToPlayer { target, bytes } => {
            binary_frame(&format!("TOIMGNUDE:{target}:"), bytes, encoding)
        }
        Outbound::TextToPlayer { target, text } => {
            format!("TONUDE:{target}:{text}").into_bytes()
        }
        Outbound::Forward { target, text } => {
            format!("FORWARD:{target}:{text}").into_bytes()
        }
        Outbound::InputState(state) => text_frame("INPUT:", state),
        Outbound::Gyro(reading) => {
            let [gx, gy, gz] = reading.rotation_rate;
            let [ax, ay, az] = reading.acceleration;
            format!("GYRO:G:{gx:.2},{gy:.2},{gz:.2}|A:{ax:.2},{ay:.2},{az:.2}")
                .into_bytes()
        }
        Outbound::Mouse { x, y } => format!("MOUSE:{x:.0},{y:.0}").into_bytes(),
        Outbound::GetDevices => b"GETDEVICES".to_vec(),
        Outbound::Reconnect(id) => format!("RECONNECT:{id}").into_bytes(),
        Outbound::Ping => b"PING".to_vec(),
    }
}

fn text_frame(prefix: &str, body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + body.len());
    out.extend_from_slice(prefix.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}

fn binary_frame(
    prefix: &str,
    payload: &[u8],
    encoding: BinaryEncoding,
) -> Vec<u8> {
    let encoded;
    let body = match encoding {
        BinaryEncoding::Raw => payload,
        BinaryEncoding::Base64 => {
            encoded = STANDARD.encode(payload);
            encoded.as_bytes()
        }
    };
    let header = format!("{prefix}{}\n", body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    out
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Outcome of looking at the front of the buffer.
enum Step {
    /// A frame decoded from the first `usize` bytes.
    Frame(InboundMessage, usize),
    /// An empty line.
    Blank(usize),
    /// A bad frame occupying the first `usize` bytes.
    Reject(ProtocolError, usize),
    /// A binary frame that needs more bytes than are buffered.
    Incomplete {
        tag: &'static str,
        declared: Option<usize>,
        available: usize,
    },
}

/// Turns delivery units from a transport into [`InboundMessage`]s.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    encoding: BinaryEncoding,
    buf: Vec<u8>,
    dropped: u64,
}

impl FrameDecoder {
    pub fn new(framing: Framing, encoding: BinaryEncoding) -> Self {
        Self {
            framing,
            encoding,
            buf: Vec::new(),
            dropped: 0,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Number of frames dropped as malformed since construction.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes held back waiting for the rest of a binary frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forgets any partially received frame. Call when the connection
    /// underneath is replaced.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Decodes everything complete in `data` (plus whatever was held
    /// back from earlier pushes), in arrival order.
    pub fn push(&mut self, data: &[u8]) -> Vec<InboundMessage> {
        self.buf.extend_from_slice(data);

        let mut out = Vec::new();
        let mut cursor = 0;
        let mut incomplete = None;
        while cursor < self.buf.len() {
            match self.next_frame(&self.buf[cursor..]) {
                Step::Frame(msg, used) => {
                    tracing::trace!(tag = msg.tag(), bytes = used, "decoded frame");
                    out.push(msg);
                    cursor += used;
                }
                Step::Blank(used) => cursor += used,
                Step::Reject(err, used) => {
                    self.reject(&err);
                    cursor += used;
                }
                Step::Incomplete {
                    tag,
                    declared,
                    available,
                } => {
                    incomplete = Some((tag, declared, available));
                    break;
                }
            }
        }
        self.buf.drain(..cursor);

        if self.framing == Framing::Message {
            if let Some((tag, declared, available)) = incomplete {
                let err = match declared {
                    Some(declared) => ProtocolError::LengthMismatch {
                        tag: tag.to_owned(),
                        declared,
                        available,
                    },
                    None => ProtocolError::malformed(tag, "header has no newline"),
                };
                self.reject(&err);
            }
            self.buf.clear();
        }
        out
    }

    fn reject(&mut self, err: &ProtocolError) {
        self.dropped += 1;
        tracing::warn!(error = %err, framing = ?self.framing, "dropping frame");
    }

    fn next_frame(&self, input: &[u8]) -> Step {
        let line_end = input.iter().position(|&b| b == b'\n');
        let head_len = line_end.unwrap_or(input.len());
        let tag_len = input[..head_len]
            .iter()
            .position(|&b| b == b':')
            .unwrap_or(head_len);

        let binary_tag = match &input[..tag_len] {
            b"IMAGE" => Some("IMAGE"),
            b"AVATAR" => Some("AVATAR"),
            b"PLAYERNUDE" => Some("PLAYERNUDE"),
            _ => None,
        };
        if let Some(tag) = binary_tag {
            return self.binary_step(tag, input, line_end);
        }

        let used = line_end.map_or(input.len(), |nl| nl + 1);
        let mut line = &input[..head_len];
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }
        if line.is_empty() {
            return Step::Blank(used);
        }
        match parse_text(line) {
            Ok(msg) => Step::Frame(msg, used),
            Err(err) => Step::Reject(err, used),
        }
    }

    fn binary_step(
        &self,
        tag: &'static str,
        input: &[u8],
        line_end: Option<usize>,
    ) -> Step {
        let Some(nl) = line_end else {
            if input.len() > MAX_HEADER_LEN {
                let err = ProtocolError::malformed(
                    tag,
                    format!("no newline within {MAX_HEADER_LEN} header bytes"),
                );
                return Step::Reject(err, input.len());
            }
            return Step::Incomplete {
                tag,
                declared: None,
                available: 0,
            };
        };

        // Without a usable length only the header is consumed; stray
        // payload bytes fail on their own as unknown lines.
        let skip = nl + 1;
        let Ok(header) = std::str::from_utf8(&input[..nl]) else {
            let err = ProtocolError::malformed(tag, "header is not UTF-8");
            return Step::Reject(err, skip);
        };
        let header = header.strip_suffix('\r').unwrap_or(header);
        let Some((head, len_field)) = header.rsplit_once(':') else {
            let err = ProtocolError::malformed(tag, "missing payload length");
            return Step::Reject(err, skip);
        };
        let declared = match len_field.trim().parse::<usize>() {
            Ok(n) if n <= MAX_PAYLOAD_LEN => n,
            Ok(n) => {
                let err = ProtocolError::malformed(
                    tag,
                    format!("payload length {n} exceeds {MAX_PAYLOAD_LEN}"),
                );
                return Step::Reject(err, skip);
            }
            Err(_) => {
                let err = ProtocolError::malformed(
                    tag,
                    format!("bad payload length {len_field:?}"),
                );
                return Step::Reject(err, skip);
            }
        };

        let start = nl + 1;
        let available = input.len() - start;
        if available < declared {
            return Step::Incomplete {
                tag,
                declared: Some(declared),
                available,
            };
        }
        let end = start + declared;

        let payload = match self.encoding {
            BinaryEncoding::Raw => input[start..end].to_vec(),
            BinaryEncoding::Base64 => match STANDARD.decode(&input[start..end]) {
                Ok(bytes) => bytes,
                Err(e) => return Step::Reject(e.into(), end),
            },
        };

        // `head` still starts with the tag itself.
        let fields: Vec<&str> = head.split(':').skip(1).collect();
        match binary_message(tag, &fields, payload) {
            Ok(msg) => Step::Frame(msg, end),
            Err(err) => Step::Reject(err, end),
        }
    }
}

fn binary_message(
    tag: &str,
    fields: &[&str],
    bytes: Vec<u8>,
) -> Result<InboundMessage, ProtocolError> {
    let msg = match (tag, fields) {
        ("IMAGE", []) => InboundMessage::Image {
            sender: None,
            bytes,
        },
        ("IMAGE", [sender]) | ("PLAYERNUDE", [sender]) => InboundMessage::Image {
            sender: Some(player_id(tag, sender)?),
            bytes,
        },
        ("AVATAR", [key]) => InboundMessage::Avatar {
            sender: player_id(tag, key)?,
            bytes,
            key: (*key).to_owned(),
        },
        ("AVATAR", [sender, key]) => {
            if key.is_empty() {
                return Err(ProtocolError::malformed(tag, "empty avatar key"));
            }
            InboundMessage::Avatar {
                sender: player_id(tag, sender)?,
                bytes,
                key: (*key).to_owned(),
            }
        }
        _ => {
            return Err(ProtocolError::malformed(
                tag,
                format!("unexpected header field count {}", fields.len()),
            ));
        }
    };
    Ok(msg)
}

fn parse_text(line: &[u8]) -> Result<InboundMessage, ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| {
        ProtocolError::malformed("text", "frame is not valid UTF-8")
    })?;
    let (tag, body) = match line.split_once(':') {
        Some((tag, body)) => (tag, Some(body)),
        None => (line, None),
    };

    let msg = match tag {
        "STRING" => InboundMessage::String {
            text: body.unwrap_or_default().to_owned(),
        },
        "PLAYERID" => InboundMessage::Control(Control::PlayerIdAssigned(
            player_id(tag, body.unwrap_or_default())?,
        )),
        "RECONNECT_ACCEPTED" => InboundMessage::Control(
            Control::ReconnectAccepted(
                body.filter(|id| !id.is_empty()).map(PlayerId::from),
            ),
        ),
        "RECONNECT_REJECTED" => {
            InboundMessage::Control(Control::ReconnectRejected)
        }
        "PONG" => InboundMessage::Control(Control::Pong),
        "FROMNUDE" => {
            let Some((sender, text)) = body.and_then(|b| b.split_once(':'))
            else {
                return Err(ProtocolError::malformed(tag, "missing sender"));
            };
            InboundMessage::Forwarded {
                sender: player_id(tag, sender)?,
                text: text.to_owned(),
            }
        }
        other => return Err(ProtocolError::UnknownTag(other.to_owned())),
    };
    Ok(msg)
}

fn player_id(tag: &str, raw: &str) -> Result<PlayerId, ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::malformed(tag, "empty player id"));
    }
    Ok(PlayerId::from(raw))
}
