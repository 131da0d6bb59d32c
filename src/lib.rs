pub mod client;
pub mod codec;
pub mod compose;
pub mod config;
pub mod error;
pub mod folders;
pub mod imap_ops;
pub mod keyring;
pub mod mime;
pub mod models;
pub mod session;
pub mod smtp;
pub mod trash;

#[cfg(test)]
mod testing;

pub use client::MailClient;
pub use compose::{ComposeRequest, Recipients};
pub use config::Config;
pub use error::{Error, Result};
