//! End-to-end decode of a synthetic IMG4 container carrying a key-bagged
//! payload and a multi-partition manifest.

use img4_parse::{
    CompressionKind, ContainerKind, Image4Container, Img4Error, KeyBagKind, ManifestValue,
};

fn encode_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let mut be = len.to_be_bytes().to_vec();
        while be.len() > 1 && be[0] == 0 {
            be.remove(0);
        }
        out.push(0x80 | be.len() as u8);
        out.extend_from_slice(&be);
    }
}

fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    encode_len(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

fn ia5(s: &str) -> Vec<u8> {
    tlv(0x16, s.as_bytes())
}

fn octet(b: &[u8]) -> Vec<u8> {
    tlv(0x04, b)
}

fn integer(v: u64) -> Vec<u8> {
    let mut be = v.to_be_bytes().to_vec();
    while be.len() > 1 && be[0] == 0 {
        be.remove(0);
    }
    tlv(0x02, &be)
}

fn boolean(v: bool) -> Vec<u8> {
    tlv(0x01, &[if v { 0xFF } else { 0x00 }])
}

fn seq(children: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x30, &children.concat())
}

/// 4-byte private label padded to the fixed widths used by manifests.
fn label(width: usize) -> Vec<u8> {
    let mut v = vec![0xFF, 0x84, 0x92, 0x05];
    v.resize(width, 0x00);
    v
}

fn manifest_entry(name: &str, value: Vec<u8>) -> Vec<u8> {
    let mut v = label(7);
    v.extend_from_slice(&seq(&[ia5(name), value]));
    v
}

fn manifest_partition(first: bool, name: &str, entries: &[u8]) -> Vec<u8> {
    let mut v = label(if first { 9 } else { 8 });
    v.extend_from_slice(&seq(&[ia5(name), tlv(0x31, entries)]));
    v
}

fn build_img4() -> Vec<u8> {
    // payload compressed with LZSS, carrying prod + dev key bags
    let payload_bytes = b"complzss-compressed-kernel-bytes".to_vec();
    let kbags = seq(&[
        seq(&[integer(1), octet(&[0x10; 16]), octet(&[0xA0; 32])]),
        seq(&[integer(2), octet(&[0x20; 16]), octet(&[0xB0; 32])]),
    ]);
    let im4p = seq(&[
        ia5("IM4P"),
        ia5("krnl"),
        ia5("KernelCache"),
        octet(&payload_bytes),
        octet(&kbags),
    ]);

    let partitions = [
        manifest_partition(
            true,
            "MANP",
            &[
                manifest_entry("BORD", integer(6)),
                manifest_entry("CPRO", boolean(true)),
                manifest_entry("love", ia5("26.1")),
            ]
            .concat(),
        ),
        manifest_partition(
            false,
            "krnl",
            &manifest_entry("DGST", octet(&[0xCA, 0xFE])),
        ),
    ]
    .concat();
    let manb = seq(&[ia5("MANB"), tlv(0x31, &partitions)]);
    let mut body_set = label(4);
    body_set.extend_from_slice(&manb);
    let im4m = seq(&[ia5("IM4M"), integer(0), tlv(0x31, &body_set)]);

    let im4r = seq(&[ia5("IM4R"), tlv(0x31, &[])]);
    seq(&[ia5("IMG4"), im4p, tlv(0xA0, &im4m), tlv(0xA1, &im4r)])
}

#[test]
fn decodes_full_container() {
    let buf = build_img4();
    assert_eq!(Image4Container::classify(&buf), ContainerKind::Img4);

    let c = Image4Container::parse(&buf).unwrap();
    assert_eq!(c.kind, ContainerKind::Img4);
    assert!(c.im4r_present);

    let p = c.payload.as_ref().unwrap();
    assert_eq!(p.component, "krnl");
    assert_eq!(p.description, "KernelCache");
    assert_eq!(p.component_description().as_deref(), Some("KernelCache"));
    assert_eq!(p.flags.compression, CompressionKind::Lzss);
    assert!(p.flags.encrypted && p.flags.has_keybag);
    assert_eq!(&buf[p.payload_range()], b"complzss-compressed-kernel-bytes");

    assert_eq!(p.keybags.len(), 2);
    assert_eq!(p.keybags[0].kind, KeyBagKind::Production);
    assert_eq!(p.keybags[0].iv_hex(), "10".repeat(16));
    assert_eq!(p.keybags[1].kind, KeyBagKind::Development);
    assert_eq!(p.keybags[1].key_hex(), "b0".repeat(32));

    let m = c.manifest.as_ref().unwrap();
    assert_eq!(m.version, 0);
    assert_eq!(m.manifests.len(), 2);

    let manp = &m.manifests[0];
    assert_eq!(manp.name, "MANP");
    assert_eq!(manp.entries[0].value, ManifestValue::Integer(6));
    assert_eq!(manp.entries[1].value.to_string(), "TRUE");
    assert_eq!(manp.entries[2].value, ManifestValue::String("26.1".into()));
    assert_eq!(
        manp.entries[0].name_description().as_deref(),
        Some("Board Identifier")
    );

    let krnl = &m.manifests[1];
    assert_eq!(krnl.name, "krnl");
    assert_eq!(krnl.entries[0].value, ManifestValue::HexBytes("cafe".into()));
}

#[test]
fn result_serializes_to_json() {
    let c = Image4Container::parse(&build_img4()).unwrap();
    let json = serde_json::to_value(&c).unwrap();
    assert_eq!(json["kind"], "Img4");
    assert_eq!(json["payload"]["component"], "krnl");
    assert_eq!(json["payload"]["flags"]["compression"], "Lzss");
    assert_eq!(json["manifest"]["version"], 0);
    assert_eq!(
        json["manifest"]["manifests"][0]["entries"][0]["name"],
        "BORD"
    );
    assert_eq!(
        json["manifest"]["manifests"][0]["entries"][1]["value"],
        serde_json::json!({ "type": "Boolean", "value": true })
    );
}

#[test]
fn truncated_header_fails_without_reading_past_the_end() {
    let mut buf = build_img4();
    buf.truncate(buf.len() / 2);
    assert!(matches!(
        Image4Container::parse(&buf),
        Err(Img4Error::MalformedHeader { .. }) | Err(Img4Error::UnsupportedShape)
    ));
}

#[test]
fn random_bytes_are_unsupported() {
    let noise: Vec<u8> = (0u16..512).map(|i| (i.wrapping_mul(193) >> 3) as u8).collect();
    assert_eq!(Image4Container::classify(&noise), ContainerKind::Unknown);
    assert!(matches!(
        Image4Container::parse(&noise),
        Err(Img4Error::UnsupportedShape)
    ));
}
