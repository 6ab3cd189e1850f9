use std::borrow::Cow;

use super::{ClientEvent, ServerEvent};
use crate::error::{Error, Result};

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// Serialize an outbound event to its wire text.
///
/// # Errors
/// Returns an error if serialization fails.
#[allow(clippy::result_large_err)]
pub fn encode(event: &ClientEvent) -> Result<String> {
    let json = serde_json::to_string(event)?;
    tracing::trace!("Sending event: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
    Ok(json)
}

/// Parse one inbound control-channel message.
///
/// Well-formed JSON of an unrecognized kind decodes to `ServerEvent::Unknown`;
/// only text that is not a JSON object is rejected.
///
/// # Errors
/// Returns `Error::Protocol` if the text is not a JSON object.
#[allow(clippy::result_large_err)]
pub fn decode(text: &str) -> Result<ServerEvent> {
    tracing::trace!("Received event: {}", safe_truncate(text, TRACE_LOG_MAX_BYTES));
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))?;
    if !value.is_object() {
        return Err(Error::Protocol(format!(
            "expected a JSON object, got {}",
            safe_truncate(text, 64)
        )));
    }
    serde_json::from_value(value).map_err(|e| Error::Protocol(e.to_string()))
}

pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> Cow<'_, str> {
    if s.len() <= max_bytes {
        return Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}
