use std::net::TcpStream;

use chrono::{DateTime, FixedOffset};
use imap::types::Flag;

use crate::config::ImapEndpoint;
use crate::error::{Error, Result};
use crate::mime;

// ---------------------------------------------------------------------------
// Session surface
// ---------------------------------------------------------------------------

/// `SEARCH` criteria used by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    All,
    Unseen,
    /// Exact `Message-ID` header value, angle brackets included.
    MessageId(String),
}

impl SearchQuery {
    pub fn to_imap(&self) -> String {
        match self {
            SearchQuery::All => "ALL".into(),
            SearchQuery::Unseen => "UNSEEN".into(),
            SearchQuery::MessageId(id) => format!("HEADER Message-ID {}", quote(id)),
        }
    }
}

/// Flags this crate adds with `STORE +FLAGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFlag {
    Seen,
    Deleted,
}

impl StoreFlag {
    pub fn as_imap(self) -> &'static str {
        match self {
            StoreFlag::Seen => "\\Seen",
            StoreFlag::Deleted => "\\Deleted",
        }
    }
}

/// A message fetched with `(RFC822 FLAGS)`.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub raw: Vec<u8>,
    pub seen: bool,
}

/// A logged-in IMAP session with request/response semantics.
///
/// Sequence numbers refer to the currently selected mailbox and shift on
/// every expunge. Callers issue commands strictly one after another.
pub trait ImapOps {
    /// `SELECT`; returns the `EXISTS` count.
    fn select(&mut self, mailbox: &str) -> Result<u32>;
    /// Read-only select (`EXAMINE`); returns the `EXISTS` count.
    fn examine(&mut self, mailbox: &str) -> Result<u32>;
    /// Matching sequence numbers, ascending.
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<u32>>;
    fn fetch_message(&mut self, seq: u32) -> Result<Option<FetchedMessage>>;
    /// `Message-ID` header of `seq`, read without setting `\Seen`.
    fn fetch_message_id(&mut self, seq: u32) -> Result<Option<String>>;
    fn add_flag(&mut self, seq: u32, flag: StoreFlag) -> Result<()>;
    fn expunge(&mut self) -> Result<()>;
    fn copy(&mut self, seq: u32, mailbox: &str) -> Result<()>;
    /// `APPEND` flagged `\Seen` with the given internal date.
    fn append_seen(&mut self, mailbox: &str, raw: &[u8], date: DateTime<FixedOffset>)
        -> Result<()>;
    /// Raw `LIST "" "*"` lines with the `* LIST ` prefix removed.
    fn list(&mut self) -> Result<Vec<String>>;
    fn logout(&mut self) -> Result<()>;
}

/// Quote a string for use as an IMAP quoted argument.
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

// ---------------------------------------------------------------------------
// Live session over implicit TLS
// ---------------------------------------------------------------------------

type TlsSession = imap::Session<native_tls::TlsStream<TcpStream>>;

/// Real server session via the `imap` crate.
pub struct LiveSession {
    inner: TlsSession,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession").finish_non_exhaustive()
    }
}

impl LiveSession {
    /// Connect with implicit TLS and `LOGIN`.
    pub fn connect(endpoint: &ImapEndpoint, account: &str, password: &str) -> Result<Self> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| Error::Connection(format!("imap tls builder failed: {e}")))?;

        let client = imap::connect(
            (endpoint.server.as_str(), endpoint.port),
            &endpoint.server,
            &tls,
        )
        .map_err(|e| {
            Error::Connection(format!(
                "imap connect failed for '{}:{}': {}",
                endpoint.server, endpoint.port, e
            ))
        })?;

        let inner = client
            .login(account, password)
            .map_err(|(e, _client)| Error::Connection(format!("imap login failed: {e}")))?;

        log::debug!("IMAP session open on {}:{}", endpoint.server, endpoint.port);
        Ok(LiveSession { inner })
    }
}

impl ImapOps for LiveSession {
    fn select(&mut self, mailbox: &str) -> Result<u32> {
        let mailbox = self
            .inner
            .select(mailbox)
            .map_err(|e| Error::protocol("SELECT", e))?;
        Ok(mailbox.exists)
    }

    fn examine(&mut self, mailbox: &str) -> Result<u32> {
        let mailbox = self
            .inner
            .examine(mailbox)
            .map_err(|e| Error::protocol("EXAMINE", e))?;
        Ok(mailbox.exists)
    }

    fn search(&mut self, query: &SearchQuery) -> Result<Vec<u32>> {
        let found = self
            .inner
            .search(query.to_imap())
            .map_err(|e| Error::protocol("SEARCH", e))?;
        let mut seqs: Vec<u32> = found.into_iter().collect();
        seqs.sort_unstable();
        Ok(seqs)
    }

    fn fetch_message(&mut self, seq: u32) -> Result<Option<FetchedMessage>> {
        let fetches = self
            .inner
            .fetch(seq.to_string(), "(RFC822 FLAGS)")
            .map_err(|e| Error::protocol("FETCH", e))?;
        Ok(fetches.iter().find_map(|fetch| {
            fetch.body().map(|raw| FetchedMessage {
                raw: raw.to_vec(),
                seen: fetch.flags().iter().any(|f| matches!(f, Flag::Seen)),
            })
        }))
    }

    fn fetch_message_id(&mut self, seq: u32) -> Result<Option<String>> {
        let fetches = self
            .inner
            .fetch(seq.to_string(), "BODY.PEEK[HEADER.FIELDS (MESSAGE-ID)]")
            .map_err(|e| Error::protocol("FETCH", e))?;
        Ok(fetches
            .iter()
            .find_map(|fetch| fetch.header().or_else(|| fetch.body()))
            .and_then(mime::message_id))
    }

    fn add_flag(&mut self, seq: u32, flag: StoreFlag) -> Result<()> {
        self.inner
            .store(seq.to_string(), format!("+FLAGS ({})", flag.as_imap()))
            .map_err(|e| Error::protocol("STORE", e))?;
        Ok(())
    }

    fn expunge(&mut self) -> Result<()> {
        self.inner
            .expunge()
            .map_err(|e| Error::protocol("EXPUNGE", e))?;
        Ok(())
    }

    fn copy(&mut self, seq: u32, mailbox: &str) -> Result<()> {
        self.inner
            .run_command_and_check_ok(format!("COPY {seq} {}", quote(mailbox)))
            .map_err(|e| Error::protocol("COPY", e))
    }

    fn append_seen(
        &mut self,
        mailbox: &str,
        raw: &[u8],
        date: DateTime<FixedOffset>,
    ) -> Result<()> {
        self.inner
            .append_with_flags_and_date(mailbox, raw, &[Flag::Seen], Some(date))
            .map_err(|e| Error::protocol("APPEND", e))
    }

    fn list(&mut self) -> Result<Vec<String>> {
        let response = self
            .inner
            .run_command_and_read_response("LIST \"\" \"*\"")
            .map_err(|e| Error::protocol("LIST", e))?;
        Ok(list_lines(&response))
    }

    fn logout(&mut self) -> Result<()> {
        self.inner
            .logout()
            .map_err(|e| Error::protocol("LOGOUT", e))
    }
}

/// Pull the untagged `LIST` payloads out of a raw response.
fn list_lines(response: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(response)
        .lines()
        .filter_map(|line| line.strip_prefix("* LIST "))
        .map(|line| line.trim_end().to_string())
        .collect()
}
