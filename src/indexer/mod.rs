pub mod chunker;
pub mod source;
pub mod walker;

pub use chunker::{Chunk, ChunkError, Chunker};
pub use source::{detect_language, SourceError, SourceUnit};
pub use walker::Walker;
