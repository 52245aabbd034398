//! IM4P payload descriptor parsing: component tag, description, payload
//! extent, compression probe and embedded key bags (KBAGs).

use std::ops::Range;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{Img4Error, Result};
use crate::fourcc;
use crate::tlv::{Element, TAG_INTEGER, TAG_OCTET_STRING};

/// Compression scheme recognized by the payload probe. `None` means
/// "not one of the recognized schemes", not a guarantee of no
/// compression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CompressionKind {
    Lzss,
    Bvx2,
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Im4pFlags {
    pub encrypted: bool,
    pub has_keybag: bool,
    pub compression: CompressionKind,
}

/// Kind of an embedded AES key bag. Assigned by ordinal position in the
/// KBAG list (first entry production, second development); the format
/// carries no kind field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum KeyBagKind {
    Production,
    Development,
    Unknown,
}

impl KeyBagKind {
    fn from_ordinal(index: usize) -> KeyBagKind {
        match index {
            0 => KeyBagKind::Production,
            1 => KeyBagKind::Development,
            _ => KeyBagKind::Unknown,
        }
    }
}

/// AES key/IV pair extracted from an IM4P's KBAG OCTET STRING. Key
/// material is copied out of the backing buffer by value.
#[derive(Clone, Debug, Serialize)]
pub struct KeyBag {
    pub kind: KeyBagKind,
    pub iv: [u8; 16],
    pub key: [u8; 32],
}

impl KeyBag {
    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv)
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }
}

/// Decoded IM4P payload descriptor. The payload bytes themselves are not
/// copied; `payload_range` locates them inside the caller's buffer.
#[derive(Clone, Debug, Serialize)]
pub struct Im4pPayload {
    /// 4-character component tag, e.g. "ibot" or "krnl".
    pub component: String,
    pub description: String,
    /// Declared byte length of the payload OCTET STRING.
    pub size: usize,
    payload_offset: usize,
    pub flags: Im4pFlags,
    pub keybags: Vec<KeyBag>,
}

impl Im4pPayload {
    /// Range of the raw payload bytes inside the buffer this descriptor
    /// was parsed from.
    pub fn payload_range(&self) -> Range<usize> {
        self.payload_offset..self.payload_offset + self.size
    }

    /// Human-readable description of the component tag, when known.
    pub fn component_description(&self) -> Option<String> {
        fourcc::get_description(&self.component)
    }
}

/// Probes the first bytes of a payload for a known compression magic.
/// Advisory only; never fails.
pub fn detect_compression(payload: &[u8]) -> CompressionKind {
    if payload.starts_with(b"complzss") {
        CompressionKind::Lzss
    } else if payload.starts_with(b"bvx2") {
        CompressionKind::Bvx2
    } else {
        CompressionKind::None
    }
}

/// Parses a buffer known to start with an "IM4P" SEQUENCE. Positional
/// schema: 0 = name tag, 1 = component, 2 = description, 3 = payload
/// OCTET STRING, 4 = optional KBAG OCTET STRING.
pub(crate) fn parse_im4p(root: &Element<'_>) -> Result<Im4pPayload> {
    let name = root.sequence_name()?;
    if name != "IM4P" {
        return Err(Img4Error::NameMismatch {
            expected: "IM4P",
            found: name.to_string(),
        });
    }

    let component = root
        .child(1)?
        .ok_or(Img4Error::TruncatedManifestEntry {
            context: "IM4P component tag",
            offset: root.offset,
        })?
        .as_str()?
        .to_string();
    let description = root
        .child(2)?
        .ok_or(Img4Error::TruncatedManifestEntry {
            context: "IM4P description",
            offset: root.offset,
        })?
        .as_str()?
        .to_string();
    debug!("IM4P component {:?}, description {:?}", component, description);

    let payload = root.child(3)?.ok_or(Img4Error::TruncatedManifestEntry {
        context: "IM4P payload",
        offset: root.offset,
    })?;
    if !payload.tag.is_universal(TAG_OCTET_STRING) {
        return Err(Img4Error::UnexpectedTag {
            expected: "OCTET STRING payload",
            found: payload.tag.describe(),
            offset: payload.offset,
        });
    }
    let size = payload.value_len;
    let payload_offset = payload.value_start;
    let compression = detect_compression(payload.value());
    debug!("IM4P payload {} bytes, compression {:?}", size, compression);

    let mut keybags = Vec::new();
    let has_keybag = match root.child(4)? {
        Some(kbag) if kbag.tag.is_universal(TAG_OCTET_STRING) => {
            // KBAG contents are not container-level schema; a body that
            // fails to decode degrades to an empty entry list
            match parse_keybags(&kbag) {
                Ok(bags) => keybags = bags,
                Err(e) => warn!("KBAG contents unreadable: {}; continuing without entries", e),
            }
            true
        }
        Some(other) => {
            warn!(
                "IM4P[4] present but not an OCTET STRING ({}); ignoring",
                other.tag.describe()
            );
            true
        }
        None => false,
    };

    Ok(Im4pPayload {
        component,
        description,
        size,
        payload_offset,
        flags: Im4pFlags {
            encrypted: has_keybag,
            has_keybag,
            compression,
        },
        keybags,
    })
}

/// The KBAG OCTET STRING's value is itself a SEQUENCE of key-bag
/// SEQUENCEs: { INTEGER, 16-byte IV OCTET STRING, 32-byte key OCTET
/// STRING }. A malformed entry is skipped with a warning; it does not
/// abort the payload parse.
fn parse_keybags(kbag: &Element<'_>) -> Result<Vec<KeyBag>> {
    let list = Element::parse_at(kbag.buffer(), kbag.value_start)?;
    let count = list.count_children()?;
    debug!("KBAG holds {} entries", count);

    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        let entry = match list.child(index)? {
            Some(e) => e,
            None => break,
        };
        let Some(class) = entry.child(0)? else {
            warn!("KBAG entry {} empty; skipping", index);
            continue;
        };
        if !class.tag.is_universal(TAG_INTEGER) {
            warn!(
                "KBAG entry {} leads with {} instead of INTEGER; skipping",
                index,
                class.tag.describe()
            );
            continue;
        }
        let (Some(iv_el), Some(key_el)) = (entry.child(1)?, entry.child(2)?) else {
            warn!("KBAG entry {} missing IV or key; skipping", index);
            continue;
        };
        let Ok(iv) = <[u8; 16]>::try_from(iv_el.value()) else {
            warn!(
                "KBAG entry {} IV is {} bytes, expected 16; skipping",
                index,
                iv_el.value_len
            );
            continue;
        };
        let Ok(key) = <[u8; 32]>::try_from(key_el.value()) else {
            warn!(
                "KBAG entry {} key is {} bytes, expected 32; skipping",
                index,
                key_el.value_len
            );
            continue;
        };
        out.push(KeyBag {
            kind: KeyBagKind::from_ordinal(index),
            iv,
            key,
        });
    }
    Ok(out)
}
