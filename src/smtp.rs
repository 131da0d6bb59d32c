use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::SmtpEndpoint;
use crate::error::{Error, Result};

/// Submit an already serialized message to the relay.
///
/// A fresh transport per call: negotiate TLS, `AUTH LOGIN`, submit to every
/// envelope recipient, `QUIT`. The bytes go out exactly as given so the
/// archived copy matches what was delivered.
pub async fn submit(
    endpoint: &SmtpEndpoint,
    username: &str,
    password: &str,
    envelope: &Envelope,
    raw: &[u8],
) -> Result<()> {
    let creds = Credentials::new(username.to_string(), password.to_string());

    let transport = if endpoint.use_starttls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&endpoint.server)
            .map_err(|e| Error::Connection(format!("SMTP relay error: {e}")))?
            .port(endpoint.port)
            .credentials(creds)
            .build()
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&endpoint.server)
            .map_err(|e| Error::Connection(format!("SMTP relay error: {e}")))?
            .port(endpoint.port)
            .credentials(creds)
            .build()
    };

    log::debug!(
        "SMTP submit via {}:{} to {} recipient(s)",
        endpoint.server,
        endpoint.port,
        envelope.to().len()
    );

    transport.send_raw(envelope, raw).await.map_err(|e| {
        if e.is_permanent() || e.is_transient() {
            Error::protocol("SMTP", e)
        } else {
            Error::Connection(format!("SMTP send failed: {e}"))
        }
    })?;

    Ok(())
}
