pub mod ai;
pub mod config;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use ai::Gateway;
pub use config::Config;
pub use credentials::{CredentialStore, KeySource};
pub use error::DispatchError;
pub use provider::{KeyStatus, ProviderConfig, ProviderId, ProviderRegistry, WireFormat};
pub use state::{ChatMessage, ChatRole, Conversation};
pub use store::{FileStore, KeyValueStore, MemoryStore};
