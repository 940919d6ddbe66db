//! Secrets: policy, generation, redaction and the persisted record.

mod generator;
mod policy;
mod secret;
mod store;

pub use generator::{CredentialGenerator, KEY_BYTES, generate, generate_key_with, generate_with};
pub use policy::{CharClass, SPECIAL_CHARS, SecretPolicy, validate};
pub use secret::Secret;
pub use store::{CredentialRecord, CredentialStore};
