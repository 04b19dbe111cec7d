//! Deep links carrying a connection string.
//!
//! The host shows a QR code for a page URL such as
//! `https://play.example/?connect=MTAuMC4wLjU6Nzc3Nw%3D%3D`; the query
//! value is the base64 of a connection string (`10.0.0.5:7777`).

use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use url::Url;

use crate::ProtocolError;

/// Query parameter the host puts the connection data in.
pub const DEFAULT_DEEP_LINK_PARAM: &str = "connect";

/// Accepts both padded and unpadded input; links get trimmed by chat apps.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Extracts the connection string from `link`.
///
/// The parameter name is matched case-insensitively. The value must be
/// base64 of UTF-8 text containing a `:`.
pub fn decode_deep_link(link: &str, param: &str) -> Result<String, ProtocolError> {
    let url = Url::parse(link.trim())
        .map_err(|e| ProtocolError::InvalidDeepLink(e.to_string()))?;

    let value = url
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case(param))
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| {
            ProtocolError::InvalidDeepLink(format!("no {param:?} parameter"))
        })?;

    // Form decoding turns an unescaped `+` into a space.
    let value = value.trim().replace(' ', "+");
    if value.is_empty() {
        return Err(ProtocolError::InvalidDeepLink(format!(
            "empty {param:?} parameter"
        )));
    }

    let bytes = LENIENT.decode(value.as_bytes())?;
    let text = String::from_utf8(bytes).map_err(|_| {
        ProtocolError::InvalidDeepLink("payload is not UTF-8".into())
    })?;
    if !text.contains(':') {
        return Err(ProtocolError::InvalidDeepLink(
            "payload is not a connection string".into(),
        ));
    }
    Ok(text)
}

/// Builds a link to `base` that carries `connection` under `param`.
pub fn deep_link_url(
    base: &str,
    connection: &str,
    param: &str,
) -> Result<String, ProtocolError> {
    let mut url = Url::parse(base)
        .map_err(|e| ProtocolError::InvalidDeepLink(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair(param, &STANDARD.encode(connection));
    Ok(url.into())
}
