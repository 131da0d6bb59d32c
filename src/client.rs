use std::sync::Arc;

use chrono::Local;

use crate::compose::{self, ComposeRequest};
use crate::config::Config;
use crate::error::{Degrade, Error, Result};
use crate::folders;
use crate::imap_ops::{ImapOps, SearchQuery, StoreFlag};
use crate::mime;
use crate::models::{
    AccountCounts, AttachmentData, Counts, DeleteRecord, Folder, InboxOverview, MessageDetail,
    MessageSummary, RestoreRecord, RestoreRequest, SendReceipt,
};
use crate::session::{with_session, Connector, LiveConnector};
use crate::trash;

/// Entry point for every mail operation.
///
/// Each call opens its own IMAP session on the blocking pool, runs a fixed
/// sequence of commands, and logs out before returning. Nothing is cached
/// between calls.
pub struct MailClient<C: Connector = LiveConnector> {
    connector: Arc<C>,
    config: Arc<Config>,
}

impl<C: Connector> Clone for MailClient<C> {
    fn clone(&self) -> Self {
        MailClient {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
        }
    }
}

impl MailClient<LiveConnector> {
    /// Client talking to the servers named in `config`.
    pub fn live(config: Config) -> Self {
        let config = Arc::new(config);
        MailClient {
            connector: Arc::new(LiveConnector::new(Arc::clone(&config))),
            config,
        }
    }
}

impl<C: Connector> MailClient<C> {
    pub fn new(connector: C, config: Arc<Config>) -> Self {
        MailClient {
            connector: Arc::new(connector),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `op` against a fresh session on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C::Session, &Config) -> Result<T> + Send + 'static,
    {
        let connector = Arc::clone(&self.connector);
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || with_session(&*connector, |s| op(s, &config)))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    // ── reading ──────────────────────────────────────────────────

    /// Newest `list_limit` messages of `folder`, newest first.
    pub async fn list_messages(&self, folder: &str) -> Result<Vec<MessageSummary>> {
        let folder = require_folder(folder)?;
        self.run(move |s, config| list_page(s, &folder, config)).await
    }

    /// Inbox page plus its totals, reported for the single configured account.
    pub async fn inbox_overview(&self) -> Result<InboxOverview> {
        let messages = self.list_messages(&self.config.inbox).await?;
        let count = messages.len();
        let unread = messages.iter().filter(|m| m.unread).count();

        Ok(InboxOverview {
            all: Counts { count, unread },
            accounts: vec![AccountCounts {
                key: self.config.account_key.clone(),
                label: self.config.account_label.clone(),
                count,
                unread,
            }],
        })
    }

    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        self.run(|s, _| folders::list_folders(s)).await
    }

    /// Full message. Fetching it marks it `\Seen`.
    pub async fn get_message(&self, folder: &str, id: &str) -> Result<MessageDetail> {
        let folder = require_folder(folder)?;
        let seq = parse_seq(id)?;
        self.run(move |s, config| {
            let raw = fetch_raw(s, &folder, seq)?;
            let detail = mime::detail(&raw, &folder, &config.account);

            s.add_flag(seq, StoreFlag::Seen).or_skip("mark message seen");
            s.expunge().or_skip("expunge after read");
            Ok(detail)
        })
        .await
    }

    /// Attachment `index` of a message, as numbered by [`get_message`](Self::get_message).
    pub async fn get_attachment(
        &self,
        folder: &str,
        id: &str,
        index: usize,
    ) -> Result<AttachmentData> {
        let folder = require_folder(folder)?;
        let seq = parse_seq(id)?;
        self.run(move |s, _| {
            let raw = fetch_raw(s, &folder, seq)?;
            mime::attachment(&raw, index)
                .ok_or_else(|| Error::NotFound(format!("attachment {index} of message {seq}")))
        })
        .await
    }

    // ── moving ───────────────────────────────────────────────────

    pub async fn delete(&self, folder: &str, id: &str) -> Result<DeleteRecord> {
        let folder = require_folder(folder)?;
        let seq = parse_seq(id)?;
        self.run(move |s, config| trash::delete(s, seq, &folder, &config.trash_folder))
            .await
    }

    pub async fn restore(&self, request: RestoreRequest) -> Result<RestoreRecord> {
        trash::validate(&request)?;
        require_folder(&request.from_folder)?;
        require_folder(&request.trash_folder)?;
        self.run(move |s, _| trash::restore(s, &request)).await
    }

    // ── sending ──────────────────────────────────────────────────

    /// Build, deliver, then append a `\Seen` copy to the sent folder.
    ///
    /// Once delivery succeeds the send is reported as done; a failed
    /// archive only leaves `archived_to` empty.
    pub async fn send(&self, request: ComposeRequest) -> Result<SendReceipt> {
        let composed = compose::compose(&self.config.account, &request)?;
        let raw = composed.raw();

        self.connector.deliver(composed.envelope(), &raw).await?;
        log::info!("sent message to {} recipient(s)", composed.recipients);

        let archived_to = self
            .run(move |s, config| {
                let folder = folders::find_sent_folder(s, &config.inbox)?;
                s.append_seen(&folder, &raw, Local::now().fixed_offset())?;
                Ok(folder)
            })
            .await
            .or_skip("archive sent copy");

        Ok(SendReceipt {
            status: "sent".into(),
            recipients: composed.recipients,
            archived_to,
        })
    }
}

fn list_page<S: ImapOps + ?Sized>(
    session: &mut S,
    folder: &str,
    config: &Config,
) -> Result<Vec<MessageSummary>> {
    session.select(folder)?;
    let ids = session.search(&SearchQuery::All)?;

    let summaries: Vec<_> = ids
        .iter()
        .rev()
        .take(config.list_limit)
        .filter_map(|&seq| {
            let fetched = session
                .fetch_message(seq)
                .or_skip(&format!("fetch message {seq}"))
                .flatten()?;
            Some(mime::summarize(&seq.to_string(), &fetched, &config.account_key))
        })
        .collect();

    log::debug!("{folder}: {} of {} messages listed", summaries.len(), ids.len());
    Ok(summaries)
}

fn fetch_raw<S: ImapOps + ?Sized>(session: &mut S, folder: &str, seq: u32) -> Result<Vec<u8>> {
    session.select(folder)?;
    session
        .fetch_message(seq)?
        .map(|m| m.raw)
        .ok_or_else(|| Error::NotFound(format!("message {seq} in {folder}")))
}

/// Sequence id from a caller: a positive integer.
pub fn parse_seq(id: &str) -> Result<u32> {
    id.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::Validation(format!("message id must be a positive integer, got {id:?}")))
}

fn require_folder(folder: &str) -> Result<String> {
    if folder.trim().is_empty() {
        return Err(Error::Validation("folder name is required".into()));
    }
    Ok(folder.to_string())
}
