//! Session credentials, their storage and the token refresh protocol.

pub mod credential;
pub mod credential_store;
pub mod refresh;
pub mod store;

pub use credential::{Credential, LoginResponse, TokenPair};
pub use credential_store::CredentialStore;
pub use refresh::{RefreshCoordinator, DEFAULT_REFRESH_PATH};
pub use store::{CredentialStorage, FileCredentialStorage, MemoryCredentialStorage};
