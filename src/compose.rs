//! Outgoing message assembly.
//!
//! A [`ComposeRequest`] is validated and turned into a lettre [`Message`]
//! whose envelope already carries every recipient, Bcc included. Bcc never
//! becomes a header.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lettre::address::Envelope;
use lettre::message::header::{ContentTransferEncoding, ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{Error, Result};
use crate::models::{AttachmentPayload, Priority};

const OCTET_STREAM: &str = "application/octet-stream";

static DATA_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']data:(?P<mime>[^;,"']+);base64,(?P<data>[^"']*)["'][^>]*>"#,
    )
    .expect("inline image pattern is valid")
});

/// A recipient field: either one delimited string or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl Recipients {
    /// Every non-empty address, split on `,` and `;` and trimmed.
    pub fn addresses(&self) -> Vec<String> {
        match self {
            Recipients::One(s) => parse_recipients(s),
            Recipients::Many(list) => list.iter().flat_map(|s| parse_recipients(s)).collect(),
        }
    }
}

/// What a caller submits to send a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeRequest {
    #[serde(default)]
    pub to: Recipients,
    #[serde(default)]
    pub cc: Recipients,
    #[serde(default)]
    pub bcc: Recipients,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub body_text: Option<String>,
    /// Older plain-text field, used when `body_text` is absent or empty.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

/// A built message plus what delivery needs to know about it.
#[derive(Debug)]
pub struct Composed {
    pub message: Message,
    pub recipients: usize,
}

impl Composed {
    pub fn envelope(&self) -> &Envelope {
        self.message.envelope()
    }

    /// The exact bytes delivered and archived.
    pub fn raw(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

pub fn parse_recipients(field: &str) -> Vec<String> {
    field
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replace every `<img src="data:...;base64,...">` with `[inline-image-N]`
/// and return the images as attachment payloads, numbered from 1 in
/// document order.
pub fn extract_inline_images(html: &str) -> (String, Vec<AttachmentPayload>) {
    let (tail, mut rewritten, images) = DATA_IMAGE.captures_iter(html).fold(
        (0, String::with_capacity(html.len()), Vec::new()),
        |(last, mut out, mut images), caps| {
            let Some(whole) = caps.get(0) else {
                return (last, out, images);
            };
            let n = images.len() + 1;
            let mime = caps["mime"].trim().to_ascii_lowercase();
            let data: String = caps["data"].chars().filter(|c| !c.is_whitespace()).collect();

            out.push_str(&html[last..whole.start()]);
            out.push_str(&format!("[inline-image-{n}]"));
            images.push(AttachmentPayload {
                filename: format!("inline-image-{n}.{}", extension(&mime)),
                content_type: mime,
                data,
            });
            (whole.end(), out, images)
        },
    );

    rewritten.push_str(&html[tail..]);
    (rewritten, images)
}

fn extension(mime: &str) -> String {
    let ext: String = mime
        .split_once('/')
        .map(|(_, sub)| sub.split('+').next().unwrap_or_default())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if ext.is_empty() { "bin".to_string() } else { ext }
}

/// Build the outgoing message for `from`.
///
/// Fails with a validation error when there is no recipient at all or an
/// address does not parse. Attachments whose data is not valid base64 are
/// left out.
pub fn compose(from: &str, request: &ComposeRequest) -> Result<Composed> {
    let from: Mailbox = parse_mailbox(from)?;
    let to = mailboxes(&request.to)?;
    let cc = mailboxes(&request.cc)?;
    let bcc = mailboxes(&request.bcc)?;
    if to.is_empty() && cc.is_empty() && bcc.is_empty() {
        return Err(Error::Validation("at least one recipient is required".into()));
    }

    let mut attachments = request.attachments.clone();
    let html = request.body_html.as_deref().filter(|h| !h.is_empty()).map(|html| {
        let (rewritten, images) = extract_inline_images(html);
        attachments.extend(images);
        rewritten
    });
    let text = match (supplied(&request.body_text).or(supplied(&request.body)), &html) {
        (Some(text), _) => text.to_string(),
        (None, Some(html)) => codec::html_to_text(html),
        (None, None) => String::new(),
    };

    let envelope_to: Vec<_> = to
        .iter()
        .chain(&cc)
        .chain(&bcc)
        .map(|m| m.email.clone())
        .collect();
    let recipients = envelope_to.len();
    let envelope = Envelope::new(Some(from.email.clone()), envelope_to)
        .map_err(|e| Error::Validation(format!("invalid envelope: {e}")))?;

    let priority = Priority::from_label(request.priority.as_deref().unwrap_or_default());
    let (x_priority, importance) = match priority {
        Priority::High => ("1 (High)", "High"),
        Priority::Low => ("5 (Low)", "Low"),
        Priority::Normal => ("3 (Normal)", "Normal"),
    };

    let mut builder = Message::builder()
        .from(from)
        .subject(request.subject.clone())
        .header(XPriority(x_priority.into()))
        .header(Importance(importance.into()))
        .envelope(envelope);
    for mailbox in to {
        builder = builder.to(mailbox);
    }
    for mailbox in cc {
        builder = builder.cc(mailbox);
    }

    let parts: Vec<SinglePart> = attachments.iter().filter_map(attachment_part).collect();
    let message = match (html, parts.is_empty()) {
        (Some(html), true) => builder.multipart(alternative(text, html)),
        (Some(html), false) => builder.multipart(
            parts
                .into_iter()
                .fold(MultiPart::mixed().multipart(alternative(text, html)), |m, p| {
                    m.singlepart(p)
                }),
        ),
        (None, true) => builder.singlepart(text_part(ContentType::TEXT_PLAIN, text)),
        (None, false) => builder.multipart(parts.into_iter().fold(
            MultiPart::mixed().singlepart(text_part(ContentType::TEXT_PLAIN, text)),
            |m, p| m.singlepart(p),
        )),
    }
    .map_err(|e| Error::Validation(format!("failed to build message: {e}")))?;

    log::debug!(
        "composed message for {recipients} recipient(s), {} attachment(s) requested",
        attachments.len()
    );
    Ok(Composed { message, recipients })
}

fn supplied(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|t| !t.is_empty())
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Validation(format!("invalid address '{address}': {e}")))
}

fn mailboxes(field: &Recipients) -> Result<Vec<Mailbox>> {
    field.addresses().iter().map(|a| parse_mailbox(a)).collect()
}

fn text_part(content_type: ContentType, body: String) -> SinglePart {
    SinglePart::builder()
        .header(content_type)
        .header(ContentTransferEncoding::QuotedPrintable)
        .body(body)
}

fn alternative(text: String, html: String) -> MultiPart {
    MultiPart::alternative()
        .singlepart(text_part(ContentType::TEXT_PLAIN, text))
        .singlepart(text_part(ContentType::TEXT_HTML, html))
}

fn attachment_part(payload: &AttachmentPayload) -> Option<SinglePart> {
    let data = match STANDARD.decode(payload.data.trim()) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("attachment {:?} is not valid base64 (skipped): {e}", payload.filename);
            return None;
        }
    };
    let content_type = payload
        .content_type
        .parse::<ContentType>()
        .or_else(|_| OCTET_STREAM.parse())
        .ok()?;
    Some(Attachment::new(payload.filename.clone()).body(data, content_type))
}

macro_rules! text_header {
    ($ty:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        struct $ty(String);

        impl Header for $ty {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($name)
            }

            fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                Ok($ty(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

text_header!(XPriority, "X-Priority");
text_header!(Importance, "Importance");
