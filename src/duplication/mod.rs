//! Cross-file duplicate detection via sliding-window content fingerprints.

pub mod fingerprint;
pub mod index;

pub use fingerprint::{fingerprint_content, normalize_window, Fingerprint};
pub use index::{compact, DuplicateGroup, DuplicationIndex, Occurrence, DUPLICATE_TITLE};
