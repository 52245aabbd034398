//! IM4M manifest parsing: version, MANB body, per-partition property
//! trees with typed values.
//!
//! Partition and entry boundaries use fixed-width private-tag label
//! skips (9 bytes for the first partition, 8 for subsequent ones, 7 per
//! entry). These widths are format-derived conventions confirmed against
//! real manifests, not general ASN.1 rules.

use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{Img4Error, Result};
use crate::fourcc;
use crate::tlv::{
    Element, TagClass, TAG_BOOLEAN, TAG_IA5_STRING, TAG_INTEGER, TAG_OCTET_STRING, TAG_SET,
    PRIVATE_TAG_MARKER,
};
use crate::tlv::decode_private_tag;

/// Decoded manifest entry value. The closed set of variants mirrors the
/// value tags observed in real manifests; anything else is `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum ManifestValue {
    String(String),
    /// OCTET STRING rendered as lowercase hex.
    HexBytes(String),
    Integer(u64),
    Boolean(bool),
    Unknown,
}

impl fmt::Display for ManifestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestValue::String(s) => f.write_str(s),
            ManifestValue::HexBytes(h) => f.write_str(h),
            ManifestValue::Integer(i) => write!(f, "{}", i),
            ManifestValue::Boolean(true) => f.write_str("TRUE"),
            ManifestValue::Boolean(false) => f.write_str("FALSE"),
            ManifestValue::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// One named property inside a manifest partition.
#[derive(Clone, Debug, Serialize)]
pub struct ManifestEntry {
    /// 4-character property tag, e.g. "BORD" or "DGST".
    pub name: String,
    pub value: ManifestValue,
}

impl ManifestEntry {
    /// Human-readable description of the property tag, when known.
    pub fn name_description(&self) -> Option<String> {
        fourcc::get_description(&self.name)
    }
}

/// A named partition of the manifest body, typically one per signed
/// firmware component.
#[derive(Clone, Debug, Serialize)]
pub struct Manifest {
    pub name: String,
    pub entries: Vec<ManifestEntry>,
}

/// Decoded IM4M manifest.
#[derive(Clone, Debug, Serialize)]
pub struct Im4mManifest {
    pub version: u64,
    pub manifests: Vec<Manifest>,
}

/// Parses a buffer known to start with an "IM4M" SEQUENCE: child 1 is
/// the version INTEGER, child 2 a SET wrapping a private label and the
/// MANB body. A manifest without the property SET decodes to an empty
/// partition list.
pub(crate) fn parse_im4m(root: &Element<'_>) -> Result<Im4mManifest> {
    let name = root.sequence_name()?;
    if name != "IM4M" {
        return Err(Img4Error::NameMismatch {
            expected: "IM4M",
            found: name.to_string(),
        });
    }

    let version = root
        .child(1)?
        .ok_or(Img4Error::TruncatedManifestEntry {
            context: "IM4M version",
            offset: root.offset,
        })?
        .as_u64()?;
    debug!("IM4M version {}", version);

    let Some(body_set) = root.child(2)? else {
        debug!("IM4M carries no manifest body");
        return Ok(Im4mManifest {
            version,
            manifests: Vec::new(),
        });
    };
    if !body_set.tag.constructed
        || !(body_set.tag.class == TagClass::ContextSpecific
            || body_set.tag.is_universal(TAG_SET))
    {
        return Err(Img4Error::UnexpectedTag {
            expected: "SET manifest body",
            found: body_set.tag.describe(),
            offset: body_set.offset,
        });
    }

    let buf = root.buffer();
    let mut pos = body_set.value_start;
    if buf.get(pos) == Some(&PRIVATE_TAG_MARKER) {
        let (_, width) = decode_private_tag(buf, pos)?;
        pos += width;
    }
    let manb = Element::parse_at(buf, pos)?;
    let manb_name = manb.sequence_name()?;
    if manb_name != "MANB" {
        return Err(Img4Error::NameMismatch {
            expected: "MANB",
            found: manb_name.to_string(),
        });
    }

    let manifests = match manb.child(1)? {
        Some(partitions) => parse_partitions(&partitions),
        None => {
            warn!("MANB has no partition SET; manifest body is empty");
            Vec::new()
        }
    };

    Ok(Im4mManifest { version, manifests })
}

/// Walks the SET of per-partition SEQUENCEs. The first partition sits
/// behind a 9-byte private label, subsequent ones behind 8-byte labels.
/// A partition that does not match the schema is logged and skipped;
/// one corrupt partition must not hide the rest of the manifest.
fn parse_partitions(set: &Element<'_>) -> Vec<Manifest> {
    let buf = set.buffer();
    let end = set.end();
    let mut pos = set.value_start;
    let mut index = 0usize;
    let mut out = Vec::new();

    while pos < end {
        let label_width = if index == 0 { 9 } else { 8 };
        if pos + label_width >= end {
            if end - pos > 1 {
                warn!(
                    "manifest partition area has {} trailing bytes; stopping",
                    end - pos
                );
            }
            break;
        }
        pos += label_width;

        let seq = match Element::parse_at(buf, pos) {
            Ok(s) if s.end() <= end => s,
            Ok(_) => {
                warn!("manifest partition {} overruns its SET; stopping", index);
                break;
            }
            Err(e) => {
                warn!("manifest partition {} header unreadable: {}; stopping", index, e);
                break;
            }
        };
        match parse_partition(&seq) {
            Ok(m) => {
                debug!("partition {:?}: {} entries", m.name, m.entries.len());
                out.push(m);
            }
            Err(e) => warn!("manifest partition {} skipped: {}", index, e),
        }
        pos = seq.end();
        index += 1;
    }
    out
}

fn parse_partition(seq: &Element<'_>) -> Result<Manifest> {
    let name = seq
        .child(0)?
        .ok_or(Img4Error::TruncatedManifestEntry {
            context: "manifest partition name",
            offset: seq.offset,
        })?
        .as_str()?
        .to_string();
    let entry_set = seq.child(1)?.ok_or(Img4Error::TruncatedManifestEntry {
        context: "manifest partition entry set",
        offset: seq.offset,
    })?;
    Ok(Manifest {
        name,
        entries: parse_entries(&entry_set),
    })
}

/// Walks a partition's entry SET. Each entry is a 2-element SEQUENCE
/// behind a fixed 7-byte private label. Malformed entries are logged
/// and skipped.
fn parse_entries(set: &Element<'_>) -> Vec<ManifestEntry> {
    let buf = set.buffer();
    let end = set.end();
    let mut pos = set.value_start;
    let mut out = Vec::new();

    while pos < end {
        if pos + 7 >= end {
            if end - pos > 1 {
                warn!("manifest entry area has {} trailing bytes; stopping", end - pos);
            }
            break;
        }
        pos += 7;

        let seq = match Element::parse_at(buf, pos) {
            Ok(s) if s.end() <= end => s,
            Ok(_) => {
                warn!("manifest entry overruns its SET at {:#x}; stopping", pos);
                break;
            }
            Err(e) => {
                warn!("manifest entry header unreadable at {:#x}: {}; stopping", pos, e);
                break;
            }
        };
        match parse_entry(&seq) {
            Ok(entry) => out.push(entry),
            Err(e) => warn!("manifest entry at {:#x} skipped: {}", seq.offset, e),
        }
        pos = seq.end();
    }
    out
}

fn parse_entry(seq: &Element<'_>) -> Result<ManifestEntry> {
    let name = seq
        .child(0)?
        .ok_or(Img4Error::TruncatedManifestEntry {
            context: "manifest entry name",
            offset: seq.offset,
        })?
        .as_str()?
        .to_string();
    let value_el = seq.child(1)?.ok_or(Img4Error::TruncatedManifestEntry {
        context: "manifest entry value",
        offset: seq.offset,
    })?;
    Ok(ManifestEntry {
        name,
        value: decode_value(&value_el)?,
    })
}

fn decode_value(el: &Element<'_>) -> Result<ManifestValue> {
    let v = if el.tag.is_universal(TAG_IA5_STRING) {
        ManifestValue::String(el.as_str()?.to_string())
    } else if el.tag.is_universal(TAG_OCTET_STRING) {
        ManifestValue::HexBytes(hex::encode(el.value()))
    } else if el.tag.is_universal(TAG_INTEGER) {
        ManifestValue::Integer(el.as_u64()?)
    } else if el.tag.is_universal(TAG_BOOLEAN) {
        ManifestValue::Boolean(el.value().first().is_some_and(|&b| b != 0))
    } else {
        debug!("manifest value at {:#x} has tag {}", el.offset, el.tag.describe());
        ManifestValue::Unknown
    };
    Ok(v)
}
