use std::future::Future;
use std::sync::Arc;

use lettre::address::Envelope;

use crate::config::Config;
use crate::error::Result;
use crate::imap_ops::{ImapOps, LiveSession};
use crate::smtp;

/// Source of logged-in protocol sessions.
///
/// One IMAP session per logical operation, never shared or pooled.
pub trait Connector: Send + Sync + 'static {
    type Session: ImapOps + Send;

    /// Connect and log in. Failure here is a connection error.
    fn open(&self) -> Result<Self::Session>;

    /// Submit a serialized message to every envelope recipient over SMTP.
    fn deliver(&self, envelope: &Envelope, raw: &[u8])
        -> impl Future<Output = Result<()>> + Send;
}

/// Run `op` on a fresh session and log out afterwards, whatever `op` returned.
pub fn with_session<C, T>(connector: &C, op: impl FnOnce(&mut C::Session) -> Result<T>) -> Result<T>
where
    C: Connector + ?Sized,
{
    let mut session = connector.open()?;
    let out = op(&mut session);
    if let Err(e) = session.logout() {
        log::debug!("IMAP logout failed: {e}");
    }
    out
}

/// Connector for the configured account.
#[derive(Debug, Clone)]
pub struct LiveConnector {
    config: Arc<Config>,
}

impl LiveConnector {
    pub fn new(config: Arc<Config>) -> Self {
        LiveConnector { config }
    }
}

impl Connector for LiveConnector {
    type Session = LiveSession;

    fn open(&self) -> Result<LiveSession> {
        LiveSession::connect(&self.config.imap, &self.config.account, &self.config.password)
    }

    async fn deliver(&self, envelope: &Envelope, raw: &[u8]) -> Result<()> {
        smtp::submit(
            &self.config.smtp,
            &self.config.account,
            &self.config.password,
            envelope,
            raw,
        )
        .await
    }
}
