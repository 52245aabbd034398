//! Top-level Image4 dispatch: classify a buffer by its root sequence
//! name and parse the sub-components it carries.

use log::{debug, warn};
use serde::Serialize;

use crate::error::{Img4Error, Result};
use crate::im4m::{parse_im4m, Im4mManifest};
use crate::im4p::{parse_im4p, Im4pPayload};
use crate::tlv::{decode_private_tag, Element, TagClass, PRIVATE_TAG_MARKER, TAG_SEQUENCE};

/// Container shape detected at the buffer root.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    Img4,
    Im4p,
    Im4m,
    Im4r,
    Unknown,
}

/// Fully-owned result of one container parse. Payload bytes stay in the
/// caller's buffer; everything else is copied out.
#[derive(Clone, Debug, Serialize)]
pub struct Image4Container {
    pub kind: ContainerKind,
    pub payload: Option<Im4pPayload>,
    pub manifest: Option<Im4mManifest>,
    /// An IM4R restore-info wrapper was present. Its contents are opaque
    /// to this parser.
    pub im4r_present: bool,
}

impl Image4Container {
    /// Classifies and parses `bytes` as one of the four container
    /// shapes. Structural mismatches below an identified root are fatal;
    /// an unidentifiable root yields `UnsupportedShape`.
    pub fn parse(bytes: &[u8]) -> Result<Image4Container> {
        let root = match Element::parse_at(bytes, 0) {
            Ok(el) if el.tag.is_universal(TAG_SEQUENCE) => el,
            _ => return Err(Img4Error::UnsupportedShape),
        };
        let name = root.sequence_name().map_err(|_| Img4Error::UnsupportedShape)?;
        debug!("root sequence name {:?}", name);

        match name {
            "IMG4" => parse_full_container(&root),
            "IM4P" => Ok(Image4Container {
                kind: ContainerKind::Im4p,
                payload: Some(parse_im4p(&root)?),
                manifest: None,
                im4r_present: false,
            }),
            "IM4M" => Ok(Image4Container {
                kind: ContainerKind::Im4m,
                payload: None,
                manifest: Some(parse_im4m(&root)?),
                im4r_present: false,
            }),
            "IM4R" => Ok(Image4Container {
                kind: ContainerKind::Im4r,
                payload: None,
                manifest: None,
                im4r_present: true,
            }),
            other => {
                warn!("unknown root sequence name {:?}", other);
                Err(Img4Error::UnsupportedShape)
            }
        }
    }

    /// Cheap root classification that never fails: peeks at the root
    /// sequence name without parsing sub-components.
    pub fn classify(bytes: &[u8]) -> ContainerKind {
        let Ok(root) = Element::parse_at(bytes, 0) else {
            return ContainerKind::Unknown;
        };
        if !root.tag.is_universal(TAG_SEQUENCE) {
            return ContainerKind::Unknown;
        }
        match root.sequence_name() {
            Ok("IMG4") => ContainerKind::Img4,
            Ok("IM4P") => ContainerKind::Im4p,
            Ok("IM4M") => ContainerKind::Im4m,
            Ok("IM4R") => ContainerKind::Im4r,
            _ => ContainerKind::Unknown,
        }
    }
}

/// Full IMG4: child 1 is the IM4P SEQUENCE, later children are
/// context-specific wrappers around the IM4M ([0]) and IM4R ([1]).
fn parse_full_container(root: &Element<'_>) -> Result<Image4Container> {
    let im4p_el = root.child(1)?.ok_or(Img4Error::TruncatedManifestEntry {
        context: "IMG4 payload section",
        offset: root.offset,
    })?;
    let payload = parse_im4p(&im4p_el)?;

    let mut manifest = None;
    let mut im4r_present = false;
    let count = root.count_children()?;
    for index in 2..count {
        let Some(child) = root.child(index)? else {
            break;
        };
        if child.tag.class != TagClass::ContextSpecific || !child.tag.constructed {
            debug!(
                "IMG4 child {} has tag {}; ignoring",
                index,
                child.tag.describe()
            );
            continue;
        }
        match child.tag.number {
            0 => {
                let buf = root.buffer();
                let mut pos = child.value_start;
                if buf.get(pos) == Some(&PRIVATE_TAG_MARKER) {
                    let (_, width) = decode_private_tag(buf, pos)?;
                    pos += width;
                }
                let inner = Element::parse_at(buf, pos)?;
                manifest = Some(parse_im4m(&inner)?);
                debug!("IMG4 manifest section parsed");
            }
            1 => {
                im4r_present = true;
                debug!("IMG4 restore-info section present ({} bytes)", child.value_len);
            }
            n => debug!("IMG4 context-specific [{}] ignored", n),
        }
    }

    Ok(Image4Container {
        kind: ContainerKind::Img4,
        payload: Some(payload),
        manifest,
        im4r_present,
    })
}
