pub mod credential_store;

pub use credential_store::{CredentialHandle, CredentialSource, CredentialStore};
