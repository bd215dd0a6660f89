//! Authenticated request layer for the kin family-tree API.
//!
//! [`Client`] wraps every call: it attaches the stored bearer token, unwraps
//! the `{code, message, data}` envelope and, when the server reports an
//! expired session, runs a single token refresh on behalf of all requests
//! that hit the expiry, replaying them afterwards in the order they arrived.

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod net;
pub mod notify;
pub mod session;

pub use auth::{
    Credential, CredentialStorage, CredentialStore, FileCredentialStorage,
    MemoryCredentialStorage, RefreshCoordinator,
};
pub use client::{Client, ClientBuilder};
pub use config::Config;
pub use envelope::{classify, Outcome, RawResponse};
pub use error::{Error, Result};
pub use net::{RequestDescriptor, Transport};
pub use notify::{ConsoleSink, LogSink, NoticeSink, Notifier};

#[cfg(feature = "system-keyring")]
pub use auth::store::KeyringCredentialStorage;
