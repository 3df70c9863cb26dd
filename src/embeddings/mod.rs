//! Text embedding providers used by the vector retrieval backends.

#[cfg(feature = "vector-db")]
mod fastembed_provider;
mod hashed;
mod provider;

#[cfg(feature = "vector-db")]
pub use fastembed_provider::FastEmbedProvider;
pub use hashed::HashedFeatureEmbedder;
pub use provider::{dot, normalize, EmbeddingProvider, HealthStatus};
