//! Fixture builder for end-to-end tests: wraps the real `xdelta3` encoder
//! plus XZ compression. Deliberately not shared with the library — the
//! library never creates patches, even under `cfg(test)`, since these
//! integration tests link against the ordinary (non-test) build of the
//! crate.

use std::io::Write;

use xz2::write::XzEncoder;

pub fn xz_compress(data: &[u8]) -> Vec<u8> {
    let mut enc = XzEncoder::new(Vec::new(), 6);
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Builds a real XZ+VCDIFF patch stream taking `source` to `target`, the
/// same pipeline a real xdelta3+xz invocation would produce.
pub fn build_patch(source: &[u8], target: &[u8]) -> Vec<u8> {
    let vcdiff = xdelta3::encode(target, source).expect("xdelta3 encode");
    xz_compress(&vcdiff)
}
