//! Text decoding shared by the directory listing and the message parser.
//!
//! Nothing in here returns an error. Every decoder has a documented
//! fallback so one malformed name or header never fails a listing.

use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use regex::Regex;

/// Longest preview shown in a message list, in characters.
pub const PREVIEW_LEN: usize = 90;

/// Standard alphabet, tolerant of the non-zero trailing bits some servers emit.
const MAILBOX_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?]*)\?=").expect("encoded-word pattern is valid")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").expect("tag pattern is valid"));

/// Entities replaced when flattening HTML, in replacement order.
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&#39;", "'"),
    ("&quot;", "\""),
];

// ---------------------------------------------------------------------------
// Modified UTF-7 (mailbox names)
// ---------------------------------------------------------------------------

/// Decode an IMAP modified UTF-7 mailbox name for display.
///
/// `&-` is a literal ampersand. An `&` with no closing `-` is kept as-is and
/// scanning resumes at the next character. A shift sequence that fails to
/// decode is emitted unchanged. Only use the result as a label: commands
/// must be sent with the encoded name.
pub fn decode_mailbox_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut i = 0;

    while i < name.len() {
        let rest = &name[i..];
        if !rest.starts_with('&') {
            let ch = rest.chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }

        let Some(offset) = rest.find('-') else {
            out.push('&');
            i += 1;
            continue;
        };
        if offset == 1 {
            out.push('&');
            i += 2;
            continue;
        }

        let chunk = &rest[..=offset];
        match decode_shifted(&rest[1..offset]) {
            Some(text) => out.push_str(&text),
            None => out.push_str(chunk),
        }
        i += offset + 1;
    }

    out
}

fn decode_shifted(encoded: &str) -> Option<String> {
    let mut b64 = encoded.replace(',', "/");
    while b64.len() % 4 != 0 {
        b64.push('=');
    }
    let bytes = MAILBOX_B64.decode(b64.as_bytes()).ok()?;
    Some(utf16be_lossy(&bytes))
}

fn utf16be_lossy(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let mut text: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if bytes.len() % 2 == 1 {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

// ---------------------------------------------------------------------------
// RFC 2047 headers
// ---------------------------------------------------------------------------

/// Decode the first chunk of a header value.
///
/// A value without encoded words comes back unfolded but otherwise as-is.
/// Otherwise only the first chunk survives: either the plain text before
/// the first encoded word, or the run of adjacent encoded words sharing
/// one charset. Undecodable charsets fall back to lossy UTF-8.
pub fn decode_header(raw: &str) -> String {
    let value = unfold(raw);
    if !value.contains("=?") {
        return value;
    }

    let mut words = ENCODED_WORD.captures_iter(&value);
    let Some(first) = words.next() else {
        return value;
    };

    let whole = first.get(0).map_or(0..0, |m| m.range());
    let leading = value[..whole.start].trim_start();
    if !leading.is_empty() {
        return leading.to_string();
    }

    let charset = first[1].to_ascii_lowercase();
    let mut run_end = whole.end;
    let mut payload = decode_word_payload(&first[2], &first[3]);

    for word in words {
        let range = word.get(0).map_or(0..0, |m| m.range());
        let gap = &value[run_end..range.start];
        if !gap.trim().is_empty() || word[1].to_ascii_lowercase() != charset {
            break;
        }
        payload.extend(decode_word_payload(&word[2], &word[3]));
        run_end = range.end;
    }

    let run = &value[whole.start..run_end];
    rfc2047_decoder::decode(run.as_bytes())
        .unwrap_or_else(|_| String::from_utf8_lossy(&payload).into_owned())
}

fn unfold(raw: &str) -> String {
    raw.replace("\r\n", "").replace('\n', "")
}

/// Transfer-decode one encoded word's text, without charset conversion.
fn decode_word_payload(encoding: &str, text: &str) -> Vec<u8> {
    if encoding.eq_ignore_ascii_case("b") {
        return MAILBOX_B64
            .decode(text.trim().as_bytes())
            .unwrap_or_else(|_| text.as_bytes().to_vec());
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => match hex_byte(bytes[i + 1], bytes[i + 2]) {
                Some(b) => {
                    out.push(b);
                    i += 2;
                }
                None => out.push(b'='),
            },
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

// ---------------------------------------------------------------------------
// HTML flattening
// ---------------------------------------------------------------------------

/// Strip markup tags and the handful of entities mail clients emit most.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let mut text = TAG.replace_all(html, "").into_owned();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    text.trim().to_string()
}

/// One-line list preview: flattened, newlines folded, cut at
/// [`PREVIEW_LEN`] characters with a trailing ellipsis. Empty when there is
/// no text left after flattening.
pub fn preview(body: &str) -> String {
    let flat = html_to_text(body).replace("\r\n", " ").replace(['\n', '\r'], " ");
    let flat = flat.trim();
    if flat.is_empty() {
        return String::new();
    }
    let mut out: String = flat.chars().take(PREVIEW_LEN).collect();
    out.push_str("...");
    out
}
