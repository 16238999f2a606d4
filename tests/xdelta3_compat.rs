//! Interop with the real xdelta3 decoder (RFC 3284 VCDIFF), mirroring the
//! teacher's own `bsdiff_qbspatch_compat`: patches are produced by the real
//! upstream tool for the format, not by a test-only fixture encoder, and
//! this crate's decoder must reproduce the target byte-for-byte.
//!
//! The `xdelta3` crate binds the real xdelta3 C library directly rather
//! than shelling out to a `bsdiff`-style standalone binary, so there is no
//! `tests/bin/` fixture to invoke — `xdelta3::encode` already is the real
//! encoder.

mod common;

use std::io::Cursor;

use blkdelta::{Bpatch, DontCareMap};

fn apply(patch: &[u8], source: &[u8]) -> Vec<u8> {
    let map = DontCareMap::identity();
    let hint = Bpatch::new(patch).hint_target_size().unwrap() as usize;
    let mut out = vec![0u8; hint];
    {
        let target = Cursor::new(&mut out);
        Bpatch::new(patch)
            .apply(Cursor::new(source.to_vec()), &map, target, &map, false)
            .unwrap();
    }
    out
}

#[test]
fn xdelta3_encoded_binary_diff_round_trips() {
    let mut source = Vec::new();
    for i in 0..20_000u32 {
        source.extend_from_slice(&i.to_le_bytes());
    }

    let mut target = source[4096..].to_vec();
    target.extend_from_slice(b"\x00\x01\x02\x03appended tail block");
    target[1000] ^= 0xFF;

    let patch = common::build_patch(&source, &target);
    let result = apply(&patch, &source);
    assert_eq!(result, target);
}

#[test]
fn xdelta3_encoded_text_diff_round_trips() {
    let source = "the quick brown fox jumps over the lazy dog\n".repeat(200);
    let mut target = source.replace("quick", "slow");
    target.push_str("one more line appended at the end\n");

    let patch = common::build_patch(source.as_bytes(), target.as_bytes());
    let result = apply(&patch, source.as_bytes());
    assert_eq!(result, target.as_bytes());
}

#[test]
fn xdelta3_encoded_patch_with_no_source_round_trips() {
    let target = b"a patch with no useful source reference at all".to_vec();
    let patch = common::build_patch(b"", &target);
    let result = apply(&patch, b"");
    assert_eq!(result, target);
}
