use thiserror::Error;

/// Errors surfaced by the container, payload and manifest parsers.
///
/// Structural errors at the container level are fatal to the whole parse;
/// per-entry manifest problems are recovered locally (logged and skipped)
/// and never reach the caller as an `Err`.
#[derive(Debug, Error)]
pub enum Img4Error {
    /// A tag or length header ran past the end of the buffer, or a length
    /// field was internally inconsistent with the bytes that remain.
    #[error("malformed tag/length header at offset {offset:#x}")]
    MalformedHeader { offset: usize },

    /// A position required one tag class/number and found another.
    #[error("unexpected tag at offset {offset:#x}: expected {expected}, found {found}")]
    UnexpectedTag {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    /// A sequence's identifying string did not match the expected literal.
    #[error("sequence name mismatch: expected {expected:?}, found {found:?}")]
    NameMismatch {
        expected: &'static str,
        found: String,
    },

    /// The root of the buffer did not classify as IMG4/IM4P/IM4M/IM4R.
    #[error("buffer does not hold an IMG4, IM4P, IM4M or IM4R structure")]
    UnsupportedShape,

    /// A manifest partition or entry had fewer children than its fixed
    /// schema requires.
    #[error("truncated {context} at offset {offset:#x}")]
    TruncatedManifestEntry {
        context: &'static str,
        offset: usize,
    },
}

pub type Result<T> = std::result::Result<T, Img4Error>;
