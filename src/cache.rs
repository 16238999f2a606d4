//! Source read cache (component C2).
//!
//! Presents the illusion that any block of the source is available to the
//! delta decoder. Holds the [`crate::tunables::READ_CACHE_LENGTH`] most
//! recently used fixed-size source blocks; position 0 is always the MRU
//! entry. A cache miss triggers a cold read through a [`crate::dontcare::MapState`],
//! guarded by the [`ReadFrontier`].

use std::io::{Read, Seek};

use log::debug;

use crate::dontcare::MapState;
use crate::error::{PatchError, Result};
use crate::tunables::BLOCK_SIZE;

/// One fixed-size block read from the source.
#[derive(Clone)]
pub struct SourceRead {
    pub blkno: u64,
    pub length: usize,
    pub data: Vec<u8>,
}

impl SourceRead {
    fn empty(blkno: u64) -> Self {
        SourceRead {
            blkno,
            length: 0,
            data: vec![0u8; BLOCK_SIZE],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.length]
    }
}

/// Tracks the byte offset below which a same-file source read is safe: the
/// end of the most recently flushed target write.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadFrontier(pub u64);

/// Most-recently-used source block cache.
///
/// The original bsdiff-style shuffle-on-hit relies on a sentinel loop; here
/// promotion is an explicit `Vec::remove` + `insert(0, ..)`, which is
/// equivalent and easier to read for a cache this small.
pub struct ReadCache {
    capacity: usize,
    entries: Vec<SourceRead>,
    misses: u64,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        ReadCache {
            capacity,
            entries: Vec::with_capacity(capacity),
            misses: 0,
        }
    }

    /// Cumulative number of cold reads issued since creation.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Reads blocks `0..capacity` sequentially from `source` into the cache
    /// at startup, exploiting the near-certainty that early source blocks
    /// are used first.
    pub fn prime<F: Read + Seek>(
        &mut self,
        source: &mut MapState<F>,
        frontier: &ReadFrontier,
        same_file: bool,
    ) -> Result<()> {
        source.seek(0)?;
        for blkno in 0..self.capacity as u64 {
            let mut read = SourceRead::empty(blkno);
            let n = source.read(&mut read.data, BLOCK_SIZE)?;
            read.length = n;
            if same_file {
                check_frontier(source, frontier, blkno)?;
            }
            self.entries.push(read);
            if n < BLOCK_SIZE {
                break;
            }
        }
        Ok(())
    }

    /// Returns the bytes for `blkno`, serving a cache hit or issuing a cold
    /// read on a miss. Promotes the served entry to the MRU position.
    pub fn get_block<F: Read + Seek>(
        &mut self,
        blkno: u64,
        source: &mut MapState<F>,
        frontier: &ReadFrontier,
        same_file: bool,
    ) -> Result<&SourceRead> {
        if let Some(pos) = self.entries.iter().position(|e| e.blkno == blkno) {
            if pos != 0 {
                let entry = self.entries.remove(pos);
                self.entries.insert(0, entry);
            }
            return Ok(&self.entries[0]);
        }

        debug!("read cache miss for block {blkno}, issuing cold read");
        self.misses += 1;
        let mut read = SourceRead::empty(blkno);
        source.seek(blkno * BLOCK_SIZE as u64)?;
        let n = source.read(&mut read.data, BLOCK_SIZE)?;
        read.length = n;

        if same_file {
            check_frontier(source, frontier, blkno)?;
        }

        if self.entries.len() >= self.capacity {
            self.entries.pop();
        }
        self.entries.insert(0, read);
        Ok(&self.entries[0])
    }
}

/// After a cold read, rejects the read if the source's physical position is
/// at or before the read frontier — those bytes would have been clobbered
/// by a pending (not yet flushed) target write.
///
/// Only meaningful when source and target alias the same underlying file;
/// callers pass `same_file = false` otherwise and this is a no-op. This is
/// the corrected semantics per the design notes: the original bsdiff-style
/// implementation compared the *source's* physical position before any seek
/// had even occurred, and did so unconditionally even when source and
/// target were different files. Here the check only fires for the aliasing
/// case, and always against the position *after* the read completed.
fn check_frontier<F: Read + Seek>(
    source: &mut MapState<F>,
    frontier: &ReadFrontier,
    blkno: u64,
) -> Result<()> {
    let pos = source.physical_position()?;
    if pos <= frontier.0 {
        return Err(PatchError::FrontierViolation {
            blkno,
            frontier: frontier.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::dontcare::DontCareMap;

    fn care_map() -> DontCareMap {
        DontCareMap::new(u64::MAX, vec![u64::MAX, 0]).unwrap()
    }

    #[test]
    fn cold_read_then_hit_returns_same_bytes() {
        let map = care_map();
        let mut data = vec![0u8; BLOCK_SIZE * 3];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let mut source = MapState::new(&map, Cursor::new(data.clone()));
        let frontier = ReadFrontier(0);
        let mut cache = ReadCache::new(2);

        let first = cache
            .get_block(1, &mut source, &frontier, false)
            .unwrap()
            .as_slice()
            .to_vec();
        assert_eq!(first, data[BLOCK_SIZE..2 * BLOCK_SIZE]);

        // Second call for the same block must not issue another cold read
        // and must return identical bytes; promotion is only an MRU move.
        let second = cache
            .get_block(1, &mut source, &frontier, false)
            .unwrap()
            .as_slice()
            .to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn eviction_drops_lru_entry() {
        let map = care_map();
        let data = vec![0u8; BLOCK_SIZE * 4];
        let mut source = MapState::new(&map, Cursor::new(data));
        let frontier = ReadFrontier(0);
        let mut cache = ReadCache::new(2);

        cache.get_block(0, &mut source, &frontier, false).unwrap();
        cache.get_block(1, &mut source, &frontier, false).unwrap();
        cache.get_block(2, &mut source, &frontier, false).unwrap();

        assert!(cache.entries.iter().any(|e| e.blkno == 2));
        assert!(cache.entries.iter().any(|e| e.blkno == 1));
        assert!(!cache.entries.iter().any(|e| e.blkno == 0));
    }

    #[test]
    fn frontier_violation_rejects_cold_read() {
        let map = care_map();
        let data = vec![0u8; BLOCK_SIZE * 2];
        let mut source = MapState::new(&map, Cursor::new(data));
        // Frontier at/after where block 0's read would land rejects it.
        let frontier = ReadFrontier(BLOCK_SIZE as u64);
        let mut cache = ReadCache::new(2);

        let result = cache.get_block(0, &mut source, &frontier, true);
        assert!(matches!(result, Err(PatchError::FrontierViolation { .. })));
    }

    #[test]
    fn frontier_check_skipped_for_distinct_files() {
        let map = care_map();
        let data = vec![0u8; BLOCK_SIZE * 2];
        let mut source = MapState::new(&map, Cursor::new(data));
        let frontier = ReadFrontier(BLOCK_SIZE as u64);
        let mut cache = ReadCache::new(2);

        // same_file = false: frontier never checked.
        assert!(cache.get_block(0, &mut source, &frontier, false).is_ok());
    }
}
