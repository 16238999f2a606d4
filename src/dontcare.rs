//! Don't-care map I/O (component C1).
//!
//! A [`DontCareMap`] describes a file as alternating runs of "care" and
//! "don't-care" blocks. A [`MapState`] is a cursor over one such map bound
//! to a file handle; it presents a gapless logical stream to the rest of the
//! engine by skipping don't-care runs as physical seeks.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{PatchError, Result};

/// Alternating care/don't-care block run lengths, plus the block size they
/// are measured in.
///
/// `regions` alternates strictly: even indices are counts of *care* blocks,
/// odd indices are counts of *don't-care* blocks. A leading zero-length care
/// region is permitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DontCareMap {
    block_size: u64,
    regions: Vec<u64>,
}

impl DontCareMap {
    /// Builds a map, validating that `regions` has even length.
    pub fn new(block_size: u64, regions: Vec<u64>) -> Result<Self> {
        if block_size == 0 {
            return Err(PatchError::MapParseError(
                "block_size must be positive".into(),
            ));
        }
        if regions.len() % 2 != 0 {
            return Err(PatchError::MapParseError(
                "region_count must be even".into(),
            ));
        }
        Ok(DontCareMap {
            block_size,
            regions,
        })
    }

    /// The default map: a single unbounded care region, 4096-byte blocks.
    pub fn identity() -> Self {
        DontCareMap {
            block_size: 4096,
            regions: vec![u64::MAX, 0],
        }
    }

    /// Parses the text don't-care map file format: whitespace-separated
    /// `block_size region_count region...`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = text.split_ascii_whitespace();
        let block_size: u64 = tokens
            .next()
            .ok_or_else(|| PatchError::MapParseError("missing block_size".into()))?
            .parse()
            .map_err(|_| PatchError::MapParseError("block_size is not an integer".into()))?;
        let region_count: usize = tokens
            .next()
            .ok_or_else(|| PatchError::MapParseError("missing region_count".into()))?
            .parse()
            .map_err(|_| PatchError::MapParseError("region_count is not an integer".into()))?;
        if region_count % 2 != 0 {
            return Err(PatchError::MapParseError(
                "region_count must be even".into(),
            ));
        }
        let mut regions = Vec::with_capacity(region_count);
        for _ in 0..region_count {
            let v: u64 = tokens
                .next()
                .ok_or_else(|| PatchError::MapParseError("truncated region list".into()))?
                .parse()
                .map_err(|_| PatchError::MapParseError("region value is not an integer".into()))?;
            regions.push(v);
        }
        DontCareMap::new(block_size, regions)
    }

    /// Total bytes across all care regions — the length of the logical
    /// stream.
    pub fn logical_len(&self) -> u64 {
        self.regions
            .iter()
            .step_by(2)
            .fold(0u64, |acc, &n| acc.saturating_add(n.saturating_mul(self.block_size)))
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }
}

/// A cursor over a [`DontCareMap`] attached to a file handle.
pub struct MapState<'m, F> {
    map: &'m DontCareMap,
    f: F,
    current_region_index: usize,
    progress_in_current_care_region: u64,
}

impl<'m, F> MapState<'m, F> {
    pub fn new(map: &'m DontCareMap, f: F) -> Self {
        MapState {
            map,
            f,
            current_region_index: 0,
            progress_in_current_care_region: 0,
        }
    }

    /// Releases the map state, returning the underlying file handle.
    pub fn into_inner(self) -> F {
        self.f
    }

    fn current_care_len(&self) -> u64 {
        self.map
            .regions
            .get(self.current_region_index)
            .copied()
            .unwrap_or(0)
            .saturating_mul(self.map.block_size)
    }

    fn current_dontcare_len(&self) -> u64 {
        self.map
            .regions
            .get(self.current_region_index + 1)
            .copied()
            .unwrap_or(0)
            .saturating_mul(self.map.block_size)
    }

    fn has_more_regions(&self) -> bool {
        self.current_region_index < self.map.regions.len()
    }
}

impl<'m, F: Seek> MapState<'m, F> {
    /// Physical byte offset the file sits at right now.
    pub fn physical_position(&mut self) -> Result<u64> {
        self.f
            .stream_position()
            .map_err(PatchError::SourceIoError)
    }

    /// Absolute logical seek: walks regions from the start, translating the
    /// logical offset into a physical one.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        let mut remaining = offset;
        let mut physical: u64 = 0;
        let mut i = 0;
        while i < self.map.regions.len() {
            let care = self.map.regions[i].saturating_mul(self.map.block_size);
            let dontcare = self
                .map
                .regions
                .get(i + 1)
                .copied()
                .unwrap_or(0)
                .saturating_mul(self.map.block_size);
            if remaining < care {
                self.current_region_index = i;
                self.progress_in_current_care_region = remaining;
                self.f
                    .seek(SeekFrom::Start(physical + remaining))
                    .map_err(PatchError::SourceIoError)?;
                return Ok(());
            }
            remaining -= care;
            physical = physical.saturating_add(care).saturating_add(dontcare);
            i += 2;
        }
        Err(PatchError::map_exhausted(format!(
            "seek offset {offset} exceeds the sum of care regions"
        )))
    }
}

impl<'m, F: Read + Seek> MapState<'m, F> {
    /// Fills up to `n` bytes of `dst` (`dst.len() >= n`), skipping
    /// don't-care runs transparently. Returns the number of bytes actually
    /// read; a short read is only tolerated at true end-of-source.
    pub fn read(&mut self, dst: &mut [u8], n: usize) -> Result<usize> {
        let mut filled = 0usize;
        let mut remaining = n;
        while remaining > 0 && self.has_more_regions() {
            let region_len = self.current_care_len();
            let in_region = region_len.saturating_sub(self.progress_in_current_care_region);

            if in_region == 0 {
                // Exhausted this care region; skip the following don't-care
                // run and advance.
                let skip = self.current_dontcare_len();
                if skip > 0 {
                    self.f
                        .seek(SeekFrom::Current(skip as i64))
                        .map_err(PatchError::SourceIoError)?;
                }
                self.current_region_index += 2;
                self.progress_in_current_care_region = 0;
                continue;
            }

            if in_region >= remaining as u64 {
                let got = self
                    .f
                    .read(&mut dst[filled..filled + remaining])
                    .map_err(PatchError::SourceIoError)?;
                self.progress_in_current_care_region += got as u64;
                filled += got;
                return Ok(filled);
            } else {
                let want = in_region as usize;
                let got = self
                    .f
                    .read(&mut dst[filled..filled + want])
                    .map_err(PatchError::SourceIoError)?;
                self.progress_in_current_care_region += got as u64;
                filled += got;
                remaining -= got;
                if got < want {
                    // Short physical read; tolerated only at end-of-source.
                    return Ok(filled);
                }
                let skip = self.current_dontcare_len();
                if skip > 0 {
                    self.f
                        .seek(SeekFrom::Current(skip as i64))
                        .map_err(PatchError::SourceIoError)?;
                }
                self.current_region_index += 2;
                self.progress_in_current_care_region = 0;
            }
        }
        Ok(filled)
    }
}

impl<'m, F: Write + Seek> MapState<'m, F> {
    /// Mirror of [`MapState::read`]. Writing off the end of the map is a
    /// fatal error.
    pub fn write(&mut self, src: &[u8], n: usize) -> Result<usize> {
        let mut written = 0usize;
        let mut remaining = n;

        if self.has_more_regions() && self.progress_in_current_care_region >= self.current_care_len()
        {
            let skip = self.current_dontcare_len();
            if skip > 0 {
                self.f
                    .seek(SeekFrom::Current(skip as i64))
                    .map_err(PatchError::TargetIoError)?;
            }
            self.current_region_index += 2;
            self.progress_in_current_care_region = 0;
        }

        while remaining > 0 {
            if !self.has_more_regions() {
                return Err(PatchError::map_exhausted(
                    "write past the end of the don't-care map",
                ));
            }

            let region_len = self.current_care_len();
            let in_region = region_len.saturating_sub(self.progress_in_current_care_region);

            if in_region >= remaining as u64 {
                self.f
                    .write_all(&src[written..written + remaining])
                    .map_err(PatchError::TargetIoError)?;
                self.progress_in_current_care_region += remaining as u64;
                written += remaining;
                return Ok(written);
            } else {
                let want = in_region as usize;
                self.f
                    .write_all(&src[written..written + want])
                    .map_err(PatchError::TargetIoError)?;
                self.progress_in_current_care_region += want as u64;
                written += want;
                remaining -= want;

                let skip = self.current_dontcare_len();
                if skip > 0 {
                    self.f
                        .seek(SeekFrom::Current(skip as i64))
                        .map_err(PatchError::TargetIoError)?;
                }
                self.current_region_index += 2;
                self.progress_in_current_care_region = 0;
            }
        }
        Ok(written)
    }

    /// Flushes the underlying file handle.
    pub fn flush(&mut self) -> Result<()> {
        self.f.flush().map_err(PatchError::TargetIoError)
    }
}
