//! In-memory IMAP/SMTP double for operation tests.
//!
//! Behaves like a server as far as this crate can observe: sequence numbers
//! are positions in the folder and renumber on expunge.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset};
use lettre::address::Envelope;

use crate::error::{Error, Result};
use crate::imap_ops::{FetchedMessage, ImapOps, SearchQuery, StoreFlag};
use crate::mime;
use crate::session::Connector;

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub raw: Vec<u8>,
    pub seen: bool,
    pub deleted: bool,
}

impl FakeMessage {
    pub fn message_id(&self) -> Option<String> {
        mime::message_id(&self.raw)
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub folders: BTreeMap<String, Vec<FakeMessage>>,
    /// Appended verbatim to the generated LIST response.
    pub extra_list_lines: Vec<String>,
    /// Folders whose SELECT/EXAMINE answers NO.
    pub broken: BTreeSet<String>,
    pub refuse_login: bool,
    pub fail_copy: bool,
    pub fail_search: bool,
    pub fail_append: bool,
    pub fail_delivery: bool,
    /// Every command, in the order it reached the server.
    pub commands: Vec<String>,
    pub logouts: usize,
    pub delivered: Vec<(Vec<String>, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(self, name: &str, raws: &[String]) -> Self {
        let messages = raws
            .iter()
            .map(|raw| FakeMessage {
                raw: raw.as_bytes().to_vec(),
                seen: false,
                deleted: false,
            })
            .collect();
        self.state().folders.insert(name.to_string(), messages);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn folder(&self, name: &str) -> Vec<FakeMessage> {
        self.state().folders.get(name).cloned().unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }
}

/// Minimal RFC 5322 text message.
pub fn message(message_id: &str, subject: &str, body: &str) -> String {
    format!(
        "Message-ID: {message_id}\r\n\
From: Alice <alice@example.com>\r\n\
To: me@gmx.net\r\n\
Subject: {subject}\r\n\
Date: Tue, 14 Oct 2025 09:30:00 +0200\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
{body}\r\n"
    )
}

pub struct FakeSession {
    server: FakeServer,
    selected: Option<String>,
}

impl FakeSession {
    fn log(&self, command: String) {
        self.server.state().commands.push(command);
    }

    fn selected(&self, command: &'static str) -> Result<String> {
        self.selected
            .clone()
            .ok_or_else(|| Error::protocol(command, "BAD no mailbox selected"))
    }

    fn open_folder(&mut self, command: &'static str, mailbox: &str) -> Result<u32> {
        self.log(format!("{command} {mailbox}"));
        let state = self.server.state();
        if state.broken.contains(mailbox) {
            return Err(Error::protocol(command, "NO mailbox unavailable"));
        }
        let count = state
            .folders
            .get(mailbox)
            .map(|m| m.len() as u32)
            .ok_or_else(|| Error::protocol(command, "NO no such mailbox"))?;
        drop(state);
        self.selected = Some(mailbox.to_string());
        Ok(count)
    }

    fn with_message<T>(
        &self,
        command: &'static str,
        seq: u32,
        f: impl FnOnce(&mut FakeMessage) -> T,
    ) -> Result<T> {
        let folder = self.selected(command)?;
        let mut state = self.server.state();
        let messages = state.folders.entry(folder).or_default();
        let index = (seq as usize)
            .checked_sub(1)
            .filter(|i| *i < messages.len())
            .ok_or_else(|| Error::protocol(command, "BAD invalid sequence number"))?;
        Ok(f(&mut messages[index]))
    }
}

impl ImapOps for FakeSession {
    fn select(&mut self, mailbox: &str) -> Result<u32> {
        self.open_folder("SELECT", mailbox)
    }

    fn examine(&mut self, mailbox: &str) -> Result<u32> {
        self.open_folder("EXAMINE", mailbox)
    }

    fn search(&mut self, query: &SearchQuery) -> Result<Vec<u32>> {
        self.log(format!("SEARCH {}", query.to_imap()));
        let folder = self.selected("SEARCH")?;
        let state = self.server.state();
        if state.fail_search {
            return Err(Error::protocol("SEARCH", "NO search failed"));
        }
        let messages = state.folders.get(&folder).cloned().unwrap_or_default();
        Ok(messages
            .iter()
            .enumerate()
            .filter(|(_, m)| match query {
                SearchQuery::All => true,
                SearchQuery::Unseen => !m.seen,
                SearchQuery::MessageId(id) => m.message_id().as_deref() == Some(id.as_str()),
            })
            .map(|(i, _)| i as u32 + 1)
            .collect())
    }

    fn fetch_message(&mut self, seq: u32) -> Result<Option<FetchedMessage>> {
        self.log(format!("FETCH {seq} (RFC822 FLAGS)"));
        let found = self.with_message("FETCH", seq, |m| FetchedMessage {
            raw: m.raw.clone(),
            seen: m.seen,
        });
        Ok(found.ok())
    }

    fn fetch_message_id(&mut self, seq: u32) -> Result<Option<String>> {
        self.log(format!("FETCH {seq} BODY.PEEK[HEADER.FIELDS (MESSAGE-ID)]"));
        self.with_message("FETCH", seq, |m| m.message_id())
    }

    fn add_flag(&mut self, seq: u32, flag: StoreFlag) -> Result<()> {
        self.log(format!("STORE {seq} +FLAGS ({})", flag.as_imap()));
        self.with_message("STORE", seq, |m| match flag {
            StoreFlag::Seen => m.seen = true,
            StoreFlag::Deleted => m.deleted = true,
        })
    }

    fn expunge(&mut self) -> Result<()> {
        self.log("EXPUNGE".into());
        let folder = self.selected("EXPUNGE")?;
        if let Some(messages) = self.server.state().folders.get_mut(&folder) {
            messages.retain(|m| !m.deleted);
        }
        Ok(())
    }

    fn copy(&mut self, seq: u32, mailbox: &str) -> Result<()> {
        self.log(format!("COPY {seq} {mailbox}"));
        if self.server.state().fail_copy {
            return Err(Error::protocol("COPY", "NO quota exceeded"));
        }
        let mut copied = self.with_message("COPY", seq, |m| m.clone())?;
        copied.deleted = false;
        let mut state = self.server.state();
        let target = state
            .folders
            .get_mut(mailbox)
            .ok_or_else(|| Error::protocol("COPY", "NO [TRYCREATE] no such mailbox"))?;
        target.push(copied);
        Ok(())
    }

    fn append_seen(
        &mut self,
        mailbox: &str,
        raw: &[u8],
        _date: DateTime<FixedOffset>,
    ) -> Result<()> {
        self.log(format!("APPEND {mailbox} (\\Seen)"));
        let mut state = self.server.state();
        if state.fail_append {
            return Err(Error::protocol("APPEND", "NO append refused"));
        }
        let target = state
            .folders
            .get_mut(mailbox)
            .ok_or_else(|| Error::protocol("APPEND", "NO [TRYCREATE] no such mailbox"))?;
        target.push(FakeMessage {
            raw: raw.to_vec(),
            seen: true,
            deleted: false,
        });
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<String>> {
        self.log("LIST \"\" \"*\"".into());
        let state = self.server.state();
        let mut lines: Vec<String> = state
            .folders
            .keys()
            .map(|name| format!("(\\HasNoChildren) \"/\" \"{name}\""))
            .collect();
        lines.extend(state.extra_list_lines.iter().cloned());
        Ok(lines)
    }

    fn logout(&mut self) -> Result<()> {
        self.log("LOGOUT".into());
        self.server.state().logouts += 1;
        Ok(())
    }
}

impl Connector for FakeServer {
    type Session = FakeSession;

    fn open(&self) -> Result<FakeSession> {
        if self.state().refuse_login {
            return Err(Error::Connection("imap login failed: NO authentication failed".into()));
        }
        Ok(FakeSession {
            server: self.clone(),
            selected: None,
        })
    }

    async fn deliver(&self, envelope: &Envelope, raw: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.fail_delivery {
            return Err(Error::protocol("SMTP", "550 relay denied"));
        }
        let recipients = envelope.to().iter().map(|a| a.to_string()).collect();
        state.delivered.push((recipients, raw.to_vec()));
        Ok(())
    }
}
