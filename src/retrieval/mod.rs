//! Semantic retrieval over analyzed code with a backend fallback chain.

pub mod backend;
pub mod flat;
pub mod fragment;
pub mod index;
pub mod keyword;
pub mod store;
pub mod vector_db;

pub use backend::{candidates_for, BackendCandidate, RetrievalBackend};
pub use flat::FlatVectorBackend;
pub use fragment::{Fragment, Fragmenter};
pub use index::{CorpusDocument, IndexEntry, IndexStats, QueryHit, RetrievalIndex};
pub use keyword::KeywordBackend;
pub use store::FragmentStore;
