//! TLV primitives and element cursor for the restricted ASN.1 (DER-like)
//! encoding used by Image4 containers.
//!
//! Tag byte layout per X.690 8.1.2: bits 7-6 class, bit 5 constructed,
//! bits 4-0 tag number. Image4 additionally uses 0xFF-prefixed private
//! tag labels (continuation-bit encoded numbers with no length field of
//! their own) that prefix the element they name.

use log::debug;

use crate::error::{Img4Error, Result};

pub const TAG_BOOLEAN: u32 = 1;
pub const TAG_INTEGER: u32 = 2;
pub const TAG_OCTET_STRING: u32 = 4;
pub const TAG_SEQUENCE: u32 = 16;
pub const TAG_SET: u32 = 17;
pub const TAG_IA5_STRING: u32 = 22;

/// First byte of an Image4 private tag label.
pub const PRIVATE_TAG_MARKER: u8 = 0xFF;

/// Context-specific primitive tag 31 (0x9F); Image4 SETs use it as a
/// continuation marker with non-standard length semantics.
const SET_CONTINUATION: u8 = 0x9F;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// Decoded header byte of one TLV unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

impl Tag {
    pub fn from_byte(b: u8) -> Tag {
        let class = match b >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        Tag {
            class,
            constructed: b & 0x20 != 0,
            number: u32::from(b & 0x1F),
        }
    }

    pub fn is_universal(&self, number: u32) -> bool {
        self.class == TagClass::Universal && self.number == number
    }

    /// One-line rendering for diagnostics and error messages.
    pub fn describe(&self) -> String {
        format!(
            "{:?}/{}{}",
            self.class,
            self.number,
            if self.constructed { " (constructed)" } else { "" }
        )
    }
}

/// Decoded length field. `header_len` counts the bytes of the length
/// field itself: 1 for short form, k+1 for long form with k value bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Length {
    pub data_len: usize,
    pub header_len: usize,
}

/// Reads one length field at `pos`. Short form when the high bit is
/// clear; long form reads the low 7 bits as a count of following
/// big-endian length bytes.
pub fn decode_length(buf: &[u8], pos: usize) -> Result<Length> {
    let b0 = *buf
        .get(pos)
        .ok_or(Img4Error::MalformedHeader { offset: pos })?;
    if b0 & 0x80 == 0 {
        return Ok(Length {
            data_len: usize::from(b0 & 0x7F),
            header_len: 1,
        });
    }
    let n = usize::from(b0 & 0x7F);
    if n == 0 || n > 8 || pos + 1 + n > buf.len() {
        return Err(Img4Error::MalformedHeader { offset: pos });
    }
    let mut data_len = 0usize;
    for &b in &buf[pos + 1..pos + 1 + n] {
        data_len = (data_len << 8) | usize::from(b);
    }
    Ok(Length {
        data_len,
        header_len: n + 1,
    })
}

/// Decodes a private tag label at `pos`: the 0xFF marker followed by a
/// continuation-bit sequence of 7-bit groups. Returns the accumulated
/// tag number and the byte width of the label.
///
/// Observed files encode these labels in exactly 4 bytes regardless of
/// what the continuation bits would suggest, so a computed width longer
/// than 4 is clamped to 4; a shorter computed width is kept as-is.
/// Format-derived convention, not a general ASN.1 rule.
pub fn decode_private_tag(buf: &[u8], pos: usize) -> Result<(u32, usize)> {
    match buf.get(pos) {
        Some(&PRIVATE_TAG_MARKER) => {}
        Some(&b) => {
            return Err(Img4Error::UnexpectedTag {
                expected: "private tag marker (0xff)",
                found: format!("{:#04x}", b),
                offset: pos,
            })
        }
        None => return Err(Img4Error::MalformedHeader { offset: pos }),
    }
    let mut number = 0u32;
    let mut i = pos + 1;
    loop {
        let b = *buf
            .get(i)
            .ok_or(Img4Error::MalformedHeader { offset: pos })?;
        number = (number << 7) | u32::from(b & 0x7F);
        i += 1;
        if b & 0x80 == 0 {
            break;
        }
        if i - pos > 8 {
            return Err(Img4Error::MalformedHeader { offset: pos });
        }
    }
    let computed = i - pos;
    Ok((number, computed.min(4)))
}

/// Read-only view of one TLV element inside an immutable backing buffer.
/// Never copies; lifetime is bounded by the buffer's.
#[derive(Copy, Clone, Debug)]
pub struct Element<'a> {
    buf: &'a [u8],
    /// Offset of the tag byte.
    pub offset: usize,
    pub tag: Tag,
    pub value_start: usize,
    pub value_len: usize,
}

impl<'a> Element<'a> {
    /// Decodes the tag+length header at `pos` and bounds-checks the value
    /// range against the buffer.
    pub fn parse_at(buf: &'a [u8], pos: usize) -> Result<Element<'a>> {
        let b0 = *buf
            .get(pos)
            .ok_or(Img4Error::MalformedHeader { offset: pos })?;
        let tag = Tag::from_byte(b0);
        let len = decode_length(buf, pos + 1)?;
        let value_start = pos + 1 + len.header_len;
        let value_end = value_start
            .checked_add(len.data_len)
            .ok_or(Img4Error::MalformedHeader { offset: pos })?;
        if value_end > buf.len() {
            return Err(Img4Error::MalformedHeader { offset: pos });
        }
        Ok(Element {
            buf,
            offset: pos,
            tag,
            value_start,
            value_len: len.data_len,
        })
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn value(&self) -> &'a [u8] {
        &self.buf[self.value_start..self.value_start + self.value_len]
    }

    /// First byte past this element's value.
    pub fn end(&self) -> usize {
        self.value_start + self.value_len
    }

    /// Raw value span for string-shaped tags.
    pub fn as_str(&self) -> Result<&'a str> {
        std::str::from_utf8(self.value()).map_err(|_| Img4Error::UnexpectedTag {
            expected: "ASCII string value",
            found: self.tag.describe(),
            offset: self.offset,
        })
    }

    /// Big-endian unsigned INTEGER value. Requires a universal INTEGER
    /// tag; anything else is a caller-contract violation surfaced as
    /// `UnexpectedTag`.
    pub fn as_u64(&self) -> Result<u64> {
        if !self.tag.is_universal(TAG_INTEGER) {
            return Err(Img4Error::UnexpectedTag {
                expected: "INTEGER",
                found: self.tag.describe(),
                offset: self.offset,
            });
        }
        let mut bytes = self.value();
        while let Some((&0, rest)) = bytes.split_first() {
            bytes = rest;
        }
        if bytes.len() > 8 {
            return Err(Img4Error::MalformedHeader { offset: self.offset });
        }
        let mut acc = 0u64;
        for &b in bytes {
            acc = (acc << 8) | u64::from(b);
        }
        Ok(acc)
    }

    /// Shared enumeration over the immediate children of a constructed
    /// element, in encounter order. Private tag labels (0xFF) prefix the
    /// element that follows and are not counted as children; the 0x9F
    /// SET-continuation marker uses non-standard length accounting (long
    /// form lengths are 0x80 short of the real value in observed files).
    fn walk_children(&self, want: Option<usize>) -> Result<(usize, Option<Element<'a>>)> {
        if !self.tag.constructed {
            return Ok((0, None));
        }
        let end = self.end();
        let mut pos = self.value_start;
        let mut idx = 0usize;
        while pos < end {
            match self.buf[pos] {
                PRIVATE_TAG_MARKER => {
                    let (number, width) = decode_private_tag(self.buf, pos)?;
                    debug!(
                        "private tag label {:#x} ({} bytes) at {:#x}",
                        number, width, pos
                    );
                    pos += width;
                }
                SET_CONTINUATION => {
                    let len = decode_length(self.buf, pos + 1)?;
                    let mut data_len = len.data_len;
                    if len.header_len > 1 {
                        data_len = data_len
                            .checked_add(0x80)
                            .ok_or(Img4Error::MalformedHeader { offset: pos })?;
                    }
                    let value_start = pos + 1 + len.header_len;
                    let value_end = value_start
                        .checked_add(data_len)
                        .ok_or(Img4Error::MalformedHeader { offset: pos })?;
                    if value_end > end {
                        return Err(Img4Error::MalformedHeader { offset: pos });
                    }
                    let child = Element {
                        buf: self.buf,
                        offset: pos,
                        tag: Tag::from_byte(SET_CONTINUATION),
                        value_start,
                        value_len: data_len,
                    };
                    if want == Some(idx) {
                        return Ok((idx + 1, Some(child)));
                    }
                    idx += 1;
                    pos = value_start + data_len;
                }
                _ => {
                    let child = Element::parse_at(self.buf, pos)?;
                    if child.end() > end {
                        return Err(Img4Error::MalformedHeader { offset: pos });
                    }
                    if want == Some(idx) {
                        return Ok((idx + 1, Some(child)));
                    }
                    idx += 1;
                    pos = child.end();
                }
            }
        }
        Ok((idx, None))
    }

    /// Number of immediate children; zero for primitive elements.
    pub fn count_children(&self) -> Result<usize> {
        self.walk_children(None).map(|(n, _)| n)
    }

    /// The `index`-th immediate child, or `None` when out of range.
    pub fn child(&self, index: usize) -> Result<Option<Element<'a>>> {
        self.walk_children(Some(index)).map(|(_, el)| el)
    }

    /// First child of a SEQUENCE read as a string; used purely as a
    /// format tag ("IM4P", "IM4M", "IMG4", "MANB").
    pub fn sequence_name(&self) -> Result<&'a str> {
        if !self.tag.is_universal(TAG_SEQUENCE) {
            return Err(Img4Error::UnexpectedTag {
                expected: "SEQUENCE",
                found: self.tag.describe(),
                offset: self.offset,
            });
        }
        let name = self
            .child(0)?
            .ok_or(Img4Error::TruncatedManifestEntry {
                context: "sequence name",
                offset: self.offset,
            })?;
        name.as_str()
    }
}
