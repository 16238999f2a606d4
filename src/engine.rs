//! Patch engine (C5) and orchestration (C6).
//!
//! Glues the four streaming stages together: the XZ feeder, the VCDIFF
//! decoder, the source read cache, and the write queue. Single-threaded,
//! synchronous, no suspension points other than blocking file I/O — see
//! `apply`'s dispatch loop, which mirrors the decoder's own event sequence
//! one-for-one.

use std::io::{Read, Seek, Write};

use log::{debug, info, trace};

use crate::cache::{ReadCache, ReadFrontier};
use crate::dontcare::{DontCareMap, MapState};
use crate::error::{PatchError, Result};
use crate::tunables::{
    self, READ_CACHE_LENGTH, SOURCE_WINDOW_SIZE, TARGET_WINDOW_SIZE, WRITE_QUEUE_LENGTH,
};
use crate::vcdiff::header::{FileHeader, WindowHeader};
use crate::vcdiff::{Decoder, Event};
use crate::writequeue::WriteQueue;
use crate::xzfeed::XzFeeder;

/// Builds and runs one patch application over a memory-mapped (or otherwise
/// borrowed) XZ+VCDIFF patch buffer.
pub struct Bpatch<'p> {
    patch: &'p [u8],
    write_queue_length: usize,
    read_cache_length: usize,
}

impl<'p> Bpatch<'p> {
    pub fn new(patch: &'p [u8]) -> Self {
        Bpatch {
            patch,
            write_queue_length: WRITE_QUEUE_LENGTH,
            read_cache_length: READ_CACHE_LENGTH,
        }
    }

    /// Overrides the write queue depth (default [`WRITE_QUEUE_LENGTH`]).
    /// Callers must preserve the sizing invariant checked in `apply`, or
    /// in-place patching of a same-file source/target stops being safe.
    pub fn write_queue_length(mut self, n: usize) -> Self {
        self.write_queue_length = n;
        self
    }

    /// Overrides the read cache size (default [`READ_CACHE_LENGTH`]).
    pub fn read_cache_length(mut self, n: usize) -> Self {
        self.read_cache_length = n;
        self
    }

    /// Decompresses the whole patch up front and sums each window's target
    /// length, without running the decoder's instruction execution or
    /// touching a source at all. Lets a caller preallocate or truncate the
    /// target file before `apply` — `apply` itself requires the target
    /// already be sized to fit.
    pub fn hint_target_size(&self) -> Result<u64> {
        let mut xz = XzFeeder::new(self.patch)?;
        let mut buf = Vec::new();
        loop {
            let (filled, done) = xz.decompress_chunk()?;
            if filled {
                buf.extend_from_slice(xz.filled());
            }
            if done {
                break;
            }
        }

        let fh = FileHeader::try_parse(&buf)
            .ok_or_else(|| PatchError::corrupt("truncated VCDIFF file header"))?
            .map_err(PatchError::corrupt)?;

        let mut pos = fh.len;
        let mut total = 0u64;
        loop {
            match WindowHeader::try_parse(&buf[pos..]) {
                None => return Err(PatchError::corrupt("truncated VCDIFF window header")),
                Some(Err(msg)) => return Err(PatchError::corrupt(msg)),
                Some(Ok(None)) => return Ok(total),
                Some(Ok(Some(wh))) => {
                    total += wh.target_window_len;
                    pos += wh.len + (wh.data_len + wh.inst_len + wh.addr_len) as usize;
                }
            }
        }
    }

    /// Applies the patch, reading `source` through `source_map` and writing
    /// `target` through `target_map`. The target must already be sized to
    /// hold the logical output (see [`Bpatch::hint_target_size`]).
    ///
    /// `same_file` must be `true` whenever `source` and `target` are
    /// distinct handles onto the same underlying file (e.g. two
    /// `File::try_clone()`s) — that is what lets the read-frontier guard
    /// protect in-place patching. Passing `false` for a same-file pair
    /// disables the safety check; passing `true` for genuinely distinct
    /// files only costs a few redundant comparisons.
    pub fn apply<S, T>(
        &self,
        source: S,
        source_map: &DontCareMap,
        target: T,
        target_map: &DontCareMap,
        same_file: bool,
    ) -> Result<()>
    where
        S: Read + Seek,
        T: Write + Seek,
    {
        if !tunables::check_frontier_margin(
            self.write_queue_length,
            TARGET_WINDOW_SIZE,
            SOURCE_WINDOW_SIZE,
        ) {
            return Err(PatchError::ArgError(
                "write_queue_length is too small for SOURCE_WINDOW_SIZE: \
                 in-place patching would be unsafe"
                    .into(),
            ));
        }

        let mut source_state = MapState::new(source_map, source);
        let mut target_state = MapState::new(target_map, target);

        let mut frontier = ReadFrontier::default();
        let mut cache = ReadCache::new(self.read_cache_length);
        cache.prime(&mut source_state, &frontier, same_file)?;

        let mut queue = WriteQueue::new(self.write_queue_length);
        let mut xz = XzFeeder::new(self.patch)?;
        let mut decoder = Decoder::new();

        let mut windows_out = 0u64;
        let mut bytes_out = 0u64;

        loop {
            let event = decoder.step()?;
            trace!("decoder event: {event:?}");
            match event {
                Event::NeedInput => {
                    let (filled, done) = xz.decompress_chunk()?;
                    if filled {
                        decoder.feed_input(xz.filled());
                    }
                    if done {
                        decoder.set_no_more_input();
                    }
                }
                Event::GotHeader | Event::WinStart | Event::WinFinish => {}
                Event::GetSrcBlk(blkno) => {
                    debug!("engine requesting source block {blkno}");
                    let block = cache.get_block(blkno, &mut source_state, &frontier, same_file)?;
                    decoder.provide_source_block(blkno, block.as_slice());
                }
                Event::Output => {
                    let bytes = decoder.take_output();
                    bytes_out += bytes.len() as u64;
                    windows_out += 1;
                    queue.advance(&mut target_state, &mut frontier, &bytes)?;
                }
                Event::Done => break,
            }
        }

        queue.drain_all(&mut target_state, &mut frontier)?;
        debug_assert!(queue.is_empty());

        info!(
            "patch applied: {windows_out} windows, {bytes_out} bytes written, \
             {} cache misses",
            cache.misses()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn identity_map() -> DontCareMap {
        DontCareMap::identity()
    }

    fn xz_compress(data: &[u8]) -> Vec<u8> {
        use std::io::Write as _;
        use xz2::write::XzEncoder;
        let mut enc = XzEncoder::new(Vec::new(), 6);
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Builds a real xdelta3-encoded, XZ-compressed patch from `source` to
    /// `target`, the format this engine actually has to consume.
    fn build_patch(source: &[u8], target: &[u8]) -> Vec<u8> {
        let vcdiff = xdelta3::encode(target, source).expect("xdelta3 encode");
        xz_compress(&vcdiff)
    }

    #[test]
    fn applies_add_only_patch_to_an_empty_source() {
        let patch = build_patch(b"", b"hello world");

        let source = Cursor::new(Vec::<u8>::new());
        let mut out = Vec::new();
        let source_map = identity_map();
        let target_map = identity_map();
        {
            let target = Cursor::new(&mut out);
            Bpatch::new(&patch)
                .apply(source, &source_map, target, &target_map, false)
                .unwrap();
        }
        assert_eq!(&out, b"hello world");
    }

    #[test]
    fn copies_a_prefix_of_the_source_into_the_target() {
        let source_data: Vec<u8> = (0u8..=255).collect();
        let target_data = source_data[..64].to_vec();
        let patch = build_patch(&source_data, &target_data);

        let source = Cursor::new(source_data.clone());
        let mut out = Vec::new();
        let source_map = identity_map();
        let target_map = identity_map();
        {
            let target = Cursor::new(&mut out);
            Bpatch::new(&patch)
                .apply(source, &source_map, target, &target_map, false)
                .unwrap();
        }
        assert_eq!(out, target_data);
    }

    #[test]
    fn hint_target_size_matches_the_applied_output_length() {
        let patch = build_patch(b"", b"abcdefghij");

        let hint = Bpatch::new(&patch).hint_target_size().unwrap();
        assert_eq!(hint, 10);
    }

    #[test]
    fn corrupt_xz_tail_surfaces_as_corrupt_patch() {
        let mut patch = build_patch(b"", b"hello world, this is a longer payload");
        let tail = patch.len() - 1;
        patch[tail] ^= 0xFF;

        let source = Cursor::new(Vec::<u8>::new());
        let mut out = Vec::new();
        let source_map = identity_map();
        let target_map = identity_map();
        let target = Cursor::new(&mut out);
        let result = Bpatch::new(&patch).apply(source, &source_map, target, &target_map, false);
        assert!(result.is_err());
    }
}
