//! Splitting raw transport output into a [`Response`].

use crate::types::Response;

/// Separator between the header block and the body.
const HEADER_TERMINATOR: &str = "\r\n\r\n";

/// Parse raw transport output into a response.
///
/// The output is a header block and a body separated by the first blank line
/// (`\r\n\r\n`). A missing segment becomes an empty string; this never fails.
/// The status comes from the transport rather than the status line, so a
/// truncated or empty result still carries whatever status was reported.
pub fn parse_response(raw: &str, status: u16, correlation_key: impl Into<String>) -> Response {
    let (headers, body) = raw.split_once(HEADER_TERMINATOR).unwrap_or((raw, ""));

    Response {
        status,
        headers: headers.to_string(),
        body: body.to_string(),
        correlation_key: correlation_key.into(),
    }
}
