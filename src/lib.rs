//! Parser for Apple's IMG4 firmware-container family.
//!
//! A restricted ASN.1 (DER-like) TLV encoding wraps a payload descriptor
//! (IM4P), a cryptographic manifest (IM4M) and an optional restore-info
//! block (IM4R). This crate classifies a buffer as one of the four
//! container shapes, extracts the payload's component tag, size and
//! compression state, recovers embedded AES key bags, and walks the
//! manifest's property tree.
//!
//! The decoder only ever reads: every [`tlv::Element`] is a bounds-checked
//! view into the caller's buffer, and the returned [`Image4Container`]
//! copies out the small fixed-size values it keeps (tags, key material)
//! while exposing the payload as an offset range into the original bytes.
//!
//! ```no_run
//! # fn demo(bytes: &[u8]) -> Result<(), img4_parse::Img4Error> {
//! let container = img4_parse::Image4Container::parse(bytes)?;
//! if let Some(payload) = &container.payload {
//!     println!("{}: {} bytes", payload.component, payload.size);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Signature verification, payload decryption and decompression are out
//! of scope; key bags and the compression probe give callers what they
//! need to do those themselves.

mod container;
mod error;
pub mod fourcc;
mod im4m;
mod im4p;
pub mod tlv;

pub use container::{ContainerKind, Image4Container};
pub use error::{Img4Error, Result};
pub use im4m::{Im4mManifest, Manifest, ManifestEntry, ManifestValue};
pub use im4p::{detect_compression, CompressionKind, Im4pFlags, Im4pPayload, KeyBag, KeyBagKind};
