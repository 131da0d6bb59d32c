use std::sync::LazyLock;

use regex::Regex;

use crate::codec;
use crate::error::{Degrade, Result};
use crate::imap_ops::{ImapOps, SearchQuery};
use crate::models::Folder;

/// Label fragments (lower case) that identify the sent-mail folder.
const SENT_MARKERS: [&str; 2] = ["sent", "gesendet"];

static LIST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\((?P<flags>.*?)\)\s+"(?P<delim>[^"]+)"\s+(?P<name>.+)$"#)
        .expect("LIST pattern is valid")
});

/// Encoded mailbox name from one `LIST` payload, `(<flags>) "<delim>" <name>`.
///
/// When the line does not have that shape, everything after the last
/// `"/" ` is taken instead. Surrounding quotes are removed either way.
pub fn parse_list_line(line: &str) -> Option<String> {
    let name = match LIST_LINE.captures(line) {
        Some(caps) => caps["name"].trim().to_string(),
        None => line
            .rsplit_once(" \"/\" ")
            .map_or(line, |(_, tail)| tail)
            .trim()
            .to_string(),
    };

    let name = match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => name,
    };
    (!name.is_empty()).then_some(name)
}

/// Every folder with total and unread counts.
///
/// Each folder costs one read-only select and one `UNSEEN` search. A folder
/// whose line is malformed or whose select fails is left out; a failed
/// search only zeroes its unread count.
pub fn list_folders<S: ImapOps + ?Sized>(session: &mut S) -> Result<Vec<Folder>> {
    let lines = session.list()?;
    let mut folders = Vec::with_capacity(lines.len());

    for line in &lines {
        let Some(key) = parse_list_line(line) else {
            log::warn!("unparsable LIST line {line:?} (skipped)");
            continue;
        };
        if let Some(folder) = probe_folder(session, &key).or_skip(&format!("folder {key}")) {
            folders.push(folder);
        }
    }

    log::debug!("listed {} of {} folders", folders.len(), lines.len());
    Ok(folders)
}

fn probe_folder<S: ImapOps + ?Sized>(session: &mut S, key: &str) -> Result<Folder> {
    let count = session.examine(key)?;
    let unread = session
        .search(&SearchQuery::Unseen)
        .or_skip(&format!("unread count of {key}"))
        .map_or(0, |seqs| seqs.len() as u32);
    Ok(Folder {
        key: key.to_string(),
        label: codec::decode_mailbox_name(key),
        count,
        unread,
    })
}

/// Key of the folder sent copies go to: the first whose decoded label
/// contains a sent marker, else `fallback`.
pub fn find_sent_folder<S: ImapOps + ?Sized>(session: &mut S, fallback: &str) -> Result<String> {
    let sent = session
        .list()?
        .iter()
        .filter_map(|line| parse_list_line(line))
        .find(|key| {
            let label = codec::decode_mailbox_name(key).to_lowercase();
            SENT_MARKERS.iter().any(|marker| label.contains(marker))
        });
    Ok(sent.unwrap_or_else(|| fallback.to_string()))
}
