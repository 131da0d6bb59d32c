use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::keyring;

const DEFAULT_IMAP_SERVER: &str = "imap.gmx.com";
const DEFAULT_IMAP_PORT: u16 = 993;
const DEFAULT_SMTP_SERVER: &str = "mail.gmx.com";
const DEFAULT_SMTP_PORT: u16 = 587;
/// "Gelöscht", modified UTF-7 encoded.
const DEFAULT_TRASH: &str = "Gel&APY-scht";
const DEFAULT_LIST_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Runtime config (resolved once, shared read-only)
// ---------------------------------------------------------------------------

/// IMAP endpoint. Always implicit TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapEndpoint {
    pub server: String,
    pub port: u16,
}

impl Default for ImapEndpoint {
    fn default() -> Self {
        Self {
            server: DEFAULT_IMAP_SERVER.into(),
            port: DEFAULT_IMAP_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpEndpoint {
    pub server: String,
    pub port: u16,
    pub use_starttls: bool,
}

impl Default for SmtpEndpoint {
    fn default() -> Self {
        Self {
            server: DEFAULT_SMTP_SERVER.into(),
            port: DEFAULT_SMTP_PORT,
            use_starttls: true,
        }
    }
}

/// Everything an operation needs to reach the account. Built once at
/// startup, wrapped in an `Arc`, and handed to each component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Login name; also the From address of outgoing mail.
    pub account: String,
    pub password: String,
    /// Short key reported on every summary.
    pub account_key: String,
    pub account_label: String,
    pub imap: ImapEndpoint,
    pub smtp: SmtpEndpoint,
    pub inbox: String,
    /// Encoded name of the folder deletes are copied into.
    pub trash_folder: String,
    /// How many of the newest messages a listing returns.
    pub list_limit: usize,
}

impl Config {
    /// Config with the provider defaults and the given credentials.
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Config {
            account: account.into(),
            password: password.into(),
            account_key: "gmx".into(),
            account_label: "GMX".into(),
            imap: ImapEndpoint::default(),
            smtp: SmtpEndpoint::default(),
            inbox: "INBOX".into(),
            trash_folder: DEFAULT_TRASH.into(),
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum PasswordBackend {
    #[serde(rename = "keyring")]
    Keyring,
    #[serde(rename = "plaintext")]
    Plaintext { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub account: String,
    pub password: PasswordBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_label: Option<String>,
    #[serde(default)]
    pub imap: ImapEndpoint,
    #[serde(default)]
    pub smtp: SmtpEndpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_limit: Option<usize>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailbridge")
}

fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

impl FileConfig {
    pub fn load() -> Result<Option<Self>> {
        let path = config_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)
            .map_err(|e| Error::Validation(format!("read config: {e}")))?;
        Self::parse(&data).map(Some)
    }

    pub fn parse(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Validation(format!("parse config: {e}")))
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Validation(format!("create config dir: {e}")))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Validation(format!("serialize config: {e}")))?;
        fs::write(&path, data).map_err(|e| Error::Validation(format!("write config: {e}")))
    }

    /// Resolve into a runtime config with the given password.
    pub fn into_config(self, password: String) -> Config {
        let mut config = Config::new(self.account, password);
        if let Some(key) = self.account_key {
            config.account_key = key;
        }
        if let Some(label) = self.account_label {
            config.account_label = label;
        }
        if let Some(trash) = self.trash_folder {
            config.trash_folder = trash;
        }
        if let Some(limit) = self.list_limit {
            config.list_limit = limit;
        }
        config.imap = self.imap;
        config.smtp = self.smtp;
        config
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

impl Config {
    /// Try env vars. Returns None if account or password is missing.
    fn from_env() -> Option<Self> {
        let account = std::env::var("MAILBRIDGE_ACCOUNT").ok()?;
        let password = std::env::var("MAILBRIDGE_PASSWORD").ok()?;
        let mut config = Config::new(account, password);

        if let Ok(server) = std::env::var("MAILBRIDGE_IMAP_SERVER") {
            config.imap.server = server;
        }
        if let Some(port) = env_port("MAILBRIDGE_IMAP_PORT") {
            config.imap.port = port;
        }
        if let Ok(server) = std::env::var("MAILBRIDGE_SMTP_SERVER") {
            config.smtp.server = server;
        }
        if let Some(port) = env_port("MAILBRIDGE_SMTP_PORT") {
            config.smtp.port = port;
        }
        if let Ok(trash) = std::env::var("MAILBRIDGE_TRASH") {
            config.trash_folder = trash;
        }
        Some(config)
    }

    /// Env vars first, then the config file.
    pub fn resolve() -> Result<Self> {
        if let Some(config) = Self::from_env() {
            log::info!("Config loaded from environment variables");
            return Ok(config);
        }

        match FileConfig::load()? {
            Some(file) => {
                let password = match &file.password {
                    PasswordBackend::Plaintext { value } => value.clone(),
                    PasswordBackend::Keyring => {
                        keyring::get_password(&file.account, &file.imap.server)?
                    }
                };
                log::info!("Config loaded from {}", config_path().display());
                Ok(file.into_config(password))
            }
            None => Err(Error::Validation(
                "no account configured (set MAILBRIDGE_ACCOUNT and MAILBRIDGE_PASSWORD)".into(),
            )),
        }
    }
}

/// Try the keyring, fall back to plaintext in the config file.
pub fn store_password(account: &str, server: &str, password: &str) -> PasswordBackend {
    match keyring::set_password(account, server, password) {
        Ok(()) => {
            log::info!("Password stored in keyring for {}@{}", account, server);
            PasswordBackend::Keyring
        }
        Err(e) => {
            log::warn!("Keyring unavailable ({}), using plaintext", e);
            PasswordBackend::Plaintext {
                value: password.to_string(),
            }
        }
    }
}

fn env_port(var: &str) -> Option<u16> {
    std::env::var(var).ok().and_then(|p| p.parse().ok())
}
