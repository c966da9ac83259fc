//! Internal module for pulling the HTML body out of a raw message.

use mailparse::{parse_mail, ParsedMail};
use tracing::{debug, warn};

/// Result of looking for an HTML body in a message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HtmlBody {
    /// The decoded `text/html` part.
    Found(String),
    /// The message has no `text/html` part.
    Missing,
    /// The message couldn't be parsed (logged, the caller skips it).
    ParseError,
}

/// Extracts the decoded HTML body from raw RFC 822 message bytes.
///
/// Malformed messages are logged and reported as [`HtmlBody::ParseError`]
/// instead of failing the whole harvest.
pub(crate) fn extract_html_body(uid: u32, raw: &[u8]) -> HtmlBody {
    let parsed = match parse_mail(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(uid, error = %e, "Failed to parse email, skipping message");
            return HtmlBody::ParseError;
        }
    };

    let Some(part) = find_html_part(&parsed) else {
        debug!(uid, "Message has no HTML part");
        return HtmlBody::Missing;
    };

    match part.get_body() {
        Ok(body) => HtmlBody::Found(body),
        Err(e) => {
            warn!(uid, error = %e, "Failed to decode HTML part, skipping message");
            HtmlBody::ParseError
        }
    }
}

/// Depth-first search for the first `text/html` part that is not an attachment.
fn find_html_part<'a>(parsed: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if parsed.subparts.is_empty() {
        let is_html = parsed.ctype.mimetype.eq_ignore_ascii_case("text/html");
        let is_attachment = parsed.get_content_disposition().disposition
            == mailparse::DispositionType::Attachment;
        return (is_html && !is_attachment).then_some(parsed);
    }

    parsed.subparts.iter().find_map(find_html_part)
}
