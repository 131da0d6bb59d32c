use crate::error::{Error, Result};

const SERVICE: &str = "mailbridge";

fn key_id(account: &str, server: &str) -> String {
    format!("{account}@{server}")
}

fn entry(key: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(SERVICE, key).map_err(|e| {
        log::error!("keyring Entry::new failed for key={key:?}: {e}");
        Error::Validation(format!("keyring error: {e}"))
    })
}

pub fn get_password(account: &str, server: &str) -> Result<String> {
    let key = key_id(account, server);
    log::debug!("keyring GET: service={SERVICE:?} key={key:?}");
    entry(&key)?.get_password().map_err(|e| {
        log::warn!("keyring get_password failed for key={key:?}: {e}");
        Error::Validation(format!("keyring get: {e}"))
    })
}

pub fn set_password(account: &str, server: &str, password: &str) -> Result<()> {
    let key = key_id(account, server);
    log::debug!("keyring SET: service={SERVICE:?} key={key:?}");
    entry(&key)?.set_password(password).map_err(|e| {
        log::error!("keyring set_password failed for key={key:?}: {e}");
        Error::Validation(format!("keyring set: {e}"))
    })
}
