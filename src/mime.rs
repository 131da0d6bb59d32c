//! Raw message → summary/detail models.
//!
//! Parts are visited in document order (a part, then its children, left to
//! right). That order is what attachment indices mean, so listing and
//! download must both go through the same walk.

use chrono::DateTime;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::codec;
use crate::imap_ops::FetchedMessage;
use crate::models::{AttachmentData, AttachmentMeta, MessageDetail, MessageSummary, Priority};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Headers whose values are pooled to classify priority.
const PRIORITY_HEADERS: [&str; 4] = ["X-Priority", "Priority", "Importance", "X-MSMail-Priority"];

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// List-row view. Body preference is plain text, then HTML; an unparsable
/// date becomes an empty string.
pub fn summarize(id: &str, fetched: &FetchedMessage, account: &str) -> MessageSummary {
    let Some(mail) = parse(&fetched.raw) else {
        return MessageSummary {
            id: id.to_string(),
            sender: String::new(),
            subject: String::new(),
            preview: String::new(),
            unread: !fetched.seen,
            date: String::new(),
            account: account.to_string(),
            priority: Priority::Normal,
        };
    };

    let parts = extract(&mail);
    let body = if parts.plain.is_empty() {
        parts.html.trim()
    } else {
        parts.plain.trim()
    };

    MessageSummary {
        id: id.to_string(),
        sender: header(&mail, "From"),
        subject: header(&mail, "Subject"),
        preview: codec::preview(body),
        unread: !fetched.seen,
        date: format_date(&raw_header(&mail, "Date").unwrap_or_default()).unwrap_or_default(),
        account: account.to_string(),
        priority: priority(&mail),
    }
}

/// Full view. Body preference is HTML, then plain text; an unparsable date
/// is shown raw. A missing `To` falls back to `default_to`.
pub fn detail(raw: &[u8], folder: &str, default_to: &str) -> MessageDetail {
    let Some(mail) = parse(raw) else {
        return MessageDetail {
            subject: String::new(),
            sender: String::new(),
            to: default_to.to_string(),
            date: String::new(),
            body: String::new(),
            attachments: Vec::new(),
            priority: Priority::Normal,
            folder: folder.to_string(),
        };
    };

    let parts = extract(&mail);
    let body = if parts.html.is_empty() {
        parts.plain
    } else {
        parts.html
    };

    let raw_date = raw_header(&mail, "Date").unwrap_or_default();
    let to = raw_header(&mail, "To")
        .map(|v| codec::decode_header(&v))
        .unwrap_or_else(|| default_to.to_string());

    MessageDetail {
        subject: header(&mail, "Subject"),
        sender: header(&mail, "From"),
        to,
        date: format_date(&raw_date).unwrap_or(raw_date),
        body,
        attachments: parts.attachments,
        priority: priority(&mail),
        folder: folder.to_string(),
    }
}

/// Decoded bytes of the attachment at `index`, using the same walk and
/// classification as [`detail`].
pub fn attachment(raw: &[u8], index: usize) -> Option<AttachmentData> {
    let mail = parse(raw)?;
    let (part, filename) = attachment_parts(&mail).into_iter().nth(index)?;
    let content_type = if part.ctype.mimetype.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        part.ctype.mimetype.clone()
    };
    Some(AttachmentData {
        filename: if filename.is_empty() {
            "attachment".into()
        } else {
            filename
        },
        content_type,
        data: part.get_body_raw().unwrap_or_default(),
    })
}

/// `Message-ID` value from a header block or a whole message.
pub fn message_id(raw: &[u8]) -> Option<String> {
    let (headers, _) = mailparse::parse_headers(raw).ok()?;
    headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Classify pooled priority header values. High markers win over low ones;
/// no markers at all is `Normal`.
pub fn classify_priority(values: &[String]) -> Priority {
    let combined = values.join(" ").to_lowercase();
    let words: Vec<&str> = combined
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();
    let leading_digit = |digits: &[char]| {
        values.iter().any(|v| {
            v.trim_start()
                .chars()
                .next()
                .is_some_and(|c| digits.contains(&c))
        })
    };

    if combined.contains("high") || words.contains(&"urgent") || leading_digit(&['1', '2']) {
        Priority::High
    } else if combined.contains("low")
        || words.contains(&"non-urgent")
        || leading_digit(&['4', '5'])
    {
        Priority::Low
    } else {
        Priority::Normal
    }
}

fn priority(mail: &ParsedMail<'_>) -> Priority {
    let values: Vec<String> = PRIORITY_HEADERS
        .iter()
        .filter_map(|name| mail.headers.get_first_value(name))
        .collect();
    classify_priority(&values)
}

// ---------------------------------------------------------------------------
// Part walk
// ---------------------------------------------------------------------------

struct Extracted {
    plain: String,
    html: String,
    attachments: Vec<AttachmentMeta>,
}

fn parse(raw: &[u8]) -> Option<ParsedMail<'_>> {
    match mailparse::parse_mail(raw) {
        Ok(mail) => Some(mail),
        Err(e) => {
            log::warn!("unparsable message ({} bytes): {e}", raw.len());
            None
        }
    }
}

fn document_order<'m, 'a>(root: &'m ParsedMail<'a>) -> Vec<&'m ParsedMail<'a>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(part) = stack.pop() {
        out.push(part);
        stack.extend(part.subparts.iter().rev());
    }
    out
}

/// Decoded filename if the part is an attachment: it needs a filename and an
/// explicit `attachment` or `inline` disposition.
fn attachment_name(part: &ParsedMail<'_>) -> Option<String> {
    part.headers.get_first_header("Content-Disposition")?;
    let disposition = part.get_content_disposition();
    if !matches!(
        disposition.disposition,
        DispositionType::Attachment | DispositionType::Inline
    ) {
        return None;
    }
    let name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .filter(|n| !n.is_empty())?;
    Some(codec::decode_header(name))
}

fn attachment_parts<'m, 'a>(root: &'m ParsedMail<'a>) -> Vec<(&'m ParsedMail<'a>, String)> {
    document_order(root)
        .into_iter()
        .filter_map(|part| attachment_name(part).map(|name| (part, name)))
        .collect()
}

fn extract(root: &ParsedMail<'_>) -> Extracted {
    let mut out = Extracted {
        plain: String::new(),
        html: String::new(),
        attachments: Vec::new(),
    };

    for part in document_order(root) {
        if let Some(filename) = attachment_name(part) {
            out.attachments.push(AttachmentMeta {
                index: out.attachments.len(),
                filename,
                content_type: part.ctype.mimetype.clone(),
                size: part.get_body_raw().map(|b| b.len()).unwrap_or(0),
            });
            continue;
        }

        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        if mimetype == "text/plain" && out.plain.is_empty() {
            out.plain = decode_text(part);
        } else if mimetype == "text/html" && out.html.is_empty() {
            out.html = decode_text(part);
        }
    }

    out
}

/// Charset-aware body text, then lossy UTF-8, then empty.
fn decode_text(part: &ParsedMail<'_>) -> String {
    part.get_body()
        .or_else(|_| {
            part.get_body_raw()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

fn raw_header(mail: &ParsedMail<'_>, name: &str) -> Option<String> {
    mail.headers
        .get_first_header(name)
        .map(|h| String::from_utf8_lossy(h.get_value_raw()).trim().to_string())
}

fn header(mail: &ParsedMail<'_>, name: &str) -> String {
    raw_header(mail, name)
        .map(|v| codec::decode_header(&v))
        .unwrap_or_default()
}

fn format_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.format(DATE_FORMAT).to_string());
    }
    // dateparse answers 0 for input it cannot read at all.
    let ts = mailparse::dateparse(raw).ok().filter(|ts| *ts != 0)?;
    DateTime::from_timestamp(ts, 0).map(|dt| dt.format(DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(raw: &str, seen: bool) -> FetchedMessage {
        FetchedMessage {
            raw: raw.as_bytes().to_vec(),
            seen,
        }
    }

    const ALTERNATIVE: &str = "From: =?utf-8?q?J=C3=BCrgen?= <j@example.de>\r\n\
To: me@gmx.net\r\n\
Subject: =?utf-8?B?R3LDvMOfZQ==?=\r\n\
Date: Tue, 14 Oct 2025 09:30:00 +0200\r\n\
Message-ID: <alt-1@example.de>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain greeting\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML <b>greeting</b></p>\r\n\
--b1--\r\n";

    const MIXED: &str = "From: bob@example.com\r\n\
Subject: Report\r\n\
Date: not a date\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
First plain\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Second plain\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: text/plain; name=\"notes.txt\"\r\n\
Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
\r\n\
attached text\r\n\
--outer\r\n\
Content-Type: image/png; name=\"logo.png\"\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8=\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"no-disposition.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8=\r\n\
--outer--\r\n";

    // ── body selection ───────────────────────────────────────────

    #[test]
    fn detail_prefers_html() {
        let d = detail(ALTERNATIVE.as_bytes(), "INBOX", "me@gmx.net");
        assert_eq!(d.body.trim(), "<p>HTML <b>greeting</b></p>");
        assert_eq!(d.folder, "INBOX");
    }

    #[test]
    fn summary_previews_plain_part() {
        let s = summarize("7", &fetched(ALTERNATIVE, false), "gmx");
        assert_eq!(s.preview, "Plain greeting...");
        assert!(s.unread);
        assert_eq!(s.id, "7");
        assert_eq!(s.account, "gmx");
    }

    #[test]
    fn summary_falls_back_to_html() {
        let raw = "Subject: x\r\nContent-Type: text/html\r\n\r\n<div>Only&nbsp;html</div>\r\n";
        let s = summarize("1", &fetched(raw, true), "gmx");
        assert_eq!(s.preview, "Only html...");
        assert!(!s.unread);
    }

    #[test]
    fn first_plain_part_wins() {
        let d = detail(MIXED.as_bytes(), "INBOX", "me@gmx.net");
        assert_eq!(d.body.trim(), "First plain");
    }

    // ── headers ──────────────────────────────────────────────────

    #[test]
    fn decodes_subject_and_sender() {
        let s = summarize("1", &fetched(ALTERNATIVE, false), "gmx");
        assert_eq!(s.subject, "Grüße");
        assert_eq!(s.sender, "Jürgen");
        assert_eq!(s.date, "2025-10-14 09:30");
    }

    #[test]
    fn bad_date_is_empty_in_summary_and_raw_in_detail() {
        let s = summarize("1", &fetched(MIXED, false), "gmx");
        assert_eq!(s.date, "");
        let d = detail(MIXED.as_bytes(), "INBOX", "me@gmx.net");
        assert_eq!(d.date, "not a date");
    }

    #[test]
    fn unreadable_dates_never_become_epoch() {
        for bad in ["garbage", "not a date", "32 Foo 99"] {
            assert_eq!(format_date(bad), None, "{bad:?}");
            let raw = format!("Date: {bad}\r\nSubject: x\r\n\r\nbody\r\n");
            assert_eq!(summarize("1", &fetched(&raw, false), "gmx").date, "");
            assert_eq!(detail(raw.as_bytes(), "INBOX", "me@gmx.net").date, bad);
        }
    }

    #[test]
    fn missing_headers_are_empty_strings() {
        let raw = "Content-Type: text/plain\r\n\r\nbody\r\n";
        let s = summarize("1", &fetched(raw, false), "gmx");
        assert_eq!(s.subject, "");
        assert_eq!(s.sender, "");
        assert_eq!(s.date, "");
        let d = detail(raw.as_bytes(), "INBOX", "me@gmx.net");
        assert_eq!(d.to, "me@gmx.net");
    }

    #[test]
    fn extracts_message_id() {
        assert_eq!(
            message_id(ALTERNATIVE.as_bytes()).as_deref(),
            Some("<alt-1@example.de>")
        );
        assert_eq!(
            message_id(b"Message-ID: <x@y>\r\n\r\n").as_deref(),
            Some("<x@y>")
        );
        assert_eq!(message_id(b"Subject: none\r\n\r\n"), None);
    }

    // ── attachments ──────────────────────────────────────────────

    #[test]
    fn attachments_indexed_in_document_order() {
        let d = detail(MIXED.as_bytes(), "INBOX", "me@gmx.net");
        let names: Vec<_> = d.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["notes.txt", "logo.png"]);
        assert_eq!(d.attachments[0].index, 0);
        assert_eq!(d.attachments[1].index, 1);
        assert_eq!(d.attachments[1].content_type, "image/png");
        assert_eq!(d.attachments[1].size, 5);
    }

    #[test]
    fn text_attachment_not_used_as_body() {
        let raw = "Content-Type: multipart/mixed; boundary=\"m\"\r\n\r\n\
--m\r\n\
Content-Type: text/plain; name=\"a.txt\"\r\n\
Content-Disposition: attachment; filename=\"a.txt\"\r\n\
\r\n\
attachment body\r\n\
--m--\r\n";
        let d = detail(raw.as_bytes(), "INBOX", "me@gmx.net");
        assert_eq!(d.body, "");
        assert_eq!(d.attachments.len(), 1);
    }

    #[test]
    fn attachment_lookup_matches_listing() {
        let logo = attachment(MIXED.as_bytes(), 1).unwrap();
        assert_eq!(logo.filename, "logo.png");
        assert_eq!(logo.content_type, "image/png");
        assert_eq!(logo.data, b"Hello");
        assert!(attachment(MIXED.as_bytes(), 2).is_none());
    }

    // ── priority ─────────────────────────────────────────────────

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_x_priority() {
        assert_eq!(classify_priority(&values(&["1 (Highest)"])), Priority::High);
        assert_eq!(classify_priority(&values(&["2"])), Priority::High);
        assert_eq!(classify_priority(&values(&["3 (Normal)"])), Priority::Normal);
        assert_eq!(classify_priority(&values(&["5 (Lowest)"])), Priority::Low);
    }

    #[test]
    fn word_markers() {
        assert_eq!(classify_priority(&values(&["non-urgent"])), Priority::Low);
        assert_eq!(classify_priority(&values(&["urgent"])), Priority::High);
        assert_eq!(classify_priority(&values(&["Low"])), Priority::Low);
        assert_eq!(classify_priority(&[]), Priority::Normal);
    }

    #[test]
    fn high_beats_low() {
        assert_eq!(classify_priority(&values(&["5", "High"])), Priority::High);
    }

    #[test]
    fn priority_read_from_headers() {
        let raw = "X-Priority: 1\r\nSubject: hi\r\n\r\nbody\r\n";
        assert_eq!(summarize("1", &fetched(raw, false), "gmx").priority, Priority::High);

        let raw = "Priority: non-urgent\r\nSubject: hi\r\n\r\nbody\r\n";
        assert_eq!(detail(raw.as_bytes(), "INBOX", "").priority, Priority::Low);
    }
}
