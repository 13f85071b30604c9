//! Credential providers: per-service key formats and namespacing

mod registry;
mod types;

pub use registry::ProviderRegistry;
pub use types::*;
