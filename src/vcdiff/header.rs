//! VCDIFF file and window headers, parsed incrementally from whatever
//! prefix of the stream has been fed in so far.

use super::varint;

pub const MAGIC: [u8; 4] = [0xD6, 0xC3, 0xC4, 0x00];

pub const WIN_SOURCE: u8 = 0x01;
pub const WIN_ADLER32: u8 = 0x04;

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    /// Byte length of the fixed 5-byte header (magic + hdr_indicator).
    pub len: usize,
}

impl FileHeader {
    /// Attempts to parse the file header from the front of `buf`. Returns
    /// `None` if `buf` does not yet hold enough bytes — the caller should
    /// request more input and retry, never treating a short buffer here as
    /// an error.
    pub fn try_parse(buf: &[u8]) -> Option<Result<Self, String>> {
        if buf.len() < 5 {
            return None;
        }
        if buf[0..4] != MAGIC {
            return Some(Err("bad VCDIFF magic".into()));
        }
        let hdr_indicator = buf[4];
        if hdr_indicator != 0 {
            return Some(Err(
                "secondary compressors, custom code tables, and application \
                 data are not supported"
                    .into(),
            ));
        }
        Some(Ok(FileHeader { len: 5 }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowHeader {
    pub win_indicator: u8,
    pub source_segment_len: u64,
    pub source_segment_pos: u64,
    pub target_window_len: u64,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub adler32: Option<u32>,
    /// Total bytes consumed from the stream to parse this header.
    pub len: usize,
}

impl WindowHeader {
    /// Attempts to parse one window header from the front of `buf`. Returns
    /// `Ok(None)` at a clean end-of-stream (`buf` is empty), `Ok(Some(_,
    /// bytes_consumed))` on success, and `None` if `buf` does not yet hold a
    /// complete header (ask for more input).
    pub fn try_parse(buf: &[u8]) -> Option<Result<Option<Self>, String>> {
        if buf.is_empty() {
            return Some(Ok(None));
        }

        let mut pos = 0usize;
        let win_indicator = buf[pos];
        pos += 1;

        let mut source_segment_len = 0u64;
        let mut source_segment_pos = 0u64;
        if win_indicator & WIN_SOURCE != 0 {
            let (len, n) = varint::read_u64(&buf[pos..])?;
            pos += n;
            source_segment_len = len;
            let (segpos, n) = varint::read_u64(&buf[pos..])?;
            pos += n;
            source_segment_pos = segpos;
        }

        let (_delta_encoding_len, n) = varint::read_u64(&buf[pos..])?;
        pos += n;

        let (target_window_len, n) = varint::read_u64(&buf[pos..])?;
        pos += n;

        if pos >= buf.len() {
            return None;
        }
        let delta_indicator = buf[pos];
        pos += 1;
        if delta_indicator != 0 {
            return Some(Err("secondary section compression is not supported".into()));
        }

        let (data_len, n) = varint::read_u64(&buf[pos..])?;
        pos += n;
        let (inst_len, n) = varint::read_u64(&buf[pos..])?;
        pos += n;
        let (addr_len, n) = varint::read_u64(&buf[pos..])?;
        pos += n;

        let mut adler32 = None;
        if win_indicator & WIN_ADLER32 != 0 {
            if pos + 4 > buf.len() {
                return None;
            }
            adler32 = Some(u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap()));
            pos += 4;
        }

        Some(Ok(Some(WindowHeader {
            win_indicator,
            source_segment_len,
            source_segment_pos,
            target_window_len,
            data_len,
            inst_len,
            addr_len,
            adler32,
            len: pos,
        })))
    }

    pub fn uses_source(&self) -> bool {
        self.win_indicator & WIN_SOURCE != 0
    }
}
