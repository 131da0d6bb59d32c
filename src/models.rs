use serde::{Deserialize, Serialize};

/// A mailbox as reported by the directory listing.
///
/// `key` is the server's encoded name and is what every command must use;
/// `label` is the decoded name for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub key: String,
    pub label: String,
    pub count: u32,
    pub unread: u32,
}

/// Message priority, derived from headers on every fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Map a caller-supplied label. Anything unrecognised is `Normal`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// One row of a message list.
///
/// `id` is a sequence number: valid only in the folder it came from and
/// only until that folder is next expunged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub preview: String,
    pub unread: bool,
    pub date: String,
    pub account: String,
    pub priority: Priority,
}

/// Attachment metadata. `index` is the position in a document-order walk of
/// the part tree, recomputed on every fetch; it is not a stored identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub index: usize,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

/// Full view of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetail {
    pub subject: String,
    pub sender: String,
    pub to: String,
    pub date: String,
    /// HTML when the message has it, plain text otherwise.
    pub body: String,
    pub attachments: Vec<AttachmentMeta>,
    pub priority: Priority,
    pub folder: String,
}

/// Decoded attachment bytes for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentData {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Outgoing attachment as submitted by a caller: `data` is base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    pub data: String,
}

/// Result of a delete, handed back to the caller. Nothing is kept server-side;
/// a later restore must present `message_id`, the only durable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRecord {
    pub id: String,
    pub from_folder: String,
    pub trash_folder: String,
    pub message_id: String,
    pub restorable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub from_folder: String,
    pub trash_folder: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRecord {
    pub from_folder: String,
    pub trash_folder: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub count: usize,
    pub unread: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCounts {
    pub key: String,
    pub label: String,
    pub count: usize,
    pub unread: usize,
}

/// Counts over the newest inbox page, per account and in total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxOverview {
    pub all: Counts,
    pub accounts: Vec<AccountCounts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub status: String,
    pub recipients: usize,
    /// Folder key the sent copy was appended to, if archiving worked.
    pub archived_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::from_str::<Priority>("\"low\"").unwrap(),
            Priority::Low
        );
    }

    #[test]
    fn unknown_priority_label_is_normal() {
        assert_eq!(Priority::from_label(" HIGH "), Priority::High);
        assert_eq!(Priority::from_label("urgent"), Priority::Normal);
        assert_eq!(Priority::from_label(""), Priority::Normal);
    }

    #[test]
    fn restore_request_requires_all_fields() {
        let missing = serde_json::from_str::<RestoreRequest>(r#"{"from_folder":"INBOX"}"#);
        assert!(missing.is_err());

        let ok: RestoreRequest = serde_json::from_str(
            r#"{"from_folder":"INBOX","trash_folder":"Trash","message_id":"<a@b>"}"#,
        )
        .unwrap();
        assert_eq!(ok.trash_folder, "Trash");
    }
}
