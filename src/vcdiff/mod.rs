//! Streaming VCDIFF (RFC 3284) framing.
//!
//! The decoder never reads or seeks anything itself. It consumes whatever
//! plaintext bytes [`crate::xzfeed::XzFeeder`] has produced so far, and
//! pauses at well-defined points to ask its driver (`crate::engine`) for
//! more input or for a source block, mirroring the blocking `GETSRCBLK`
//! style callback xdelta3 itself uses. This module owns the framing only:
//! finding file/window header boundaries, tracking which source blocks a
//! window's source segment needs, and buffering one window's body at a
//! time. Actual instruction execution — parsing the real xdelta3 default
//! code table's ADD/RUN/COPY opcodes, the near/same address caches, the
//! overlapping self-copy semantics — is delegated to the `xdelta3` crate,
//! which is the real decoder and will accept any patch the real `xdelta3`
//! tool produces. See DESIGN.md for why this decoder used to reimplement
//! that instruction space itself and why that was replaced.
//!
//! Secondary compression, application-specific code tables, and
//! cross-window target addressing (`VCD_TARGET`) are not supported.

pub mod header;
pub mod varint;

use header::{FileHeader, WindowHeader};

use crate::error::{PatchError, Result};
use crate::tunables::BLOCK_SIZE;

/// One step of decoder progress, matching the driver's dispatch points.
#[derive(Debug)]
pub enum Event {
    /// No complete header or window is buffered yet; feed more bytes.
    NeedInput,
    /// The file header has been parsed. Emitted once, before the first
    /// window.
    GotHeader,
    /// A new window's header has been parsed and decoding of its body is
    /// about to begin.
    WinStart,
    /// The window's source segment needs the given source block before
    /// decoding can continue.
    GetSrcBlk(u64),
    /// A window's target bytes are ready via [`Decoder::take_output`].
    Output,
    /// The current window is fully decoded and its bytes have been taken.
    WinFinish,
    /// No more windows remain and no more input will arrive.
    Done,
}

#[derive(Debug)]
enum Phase {
    FileHeader,
    WindowHeader,
    AwaitSource,
    Executing,
    Output,
    Finish,
}

pub struct Decoder {
    input: Vec<u8>,
    cursor: usize,
    no_more_input: bool,
    phase: Phase,

    cur_header: Option<WindowHeader>,
    header_bytes: Vec<u8>,
    body: Vec<u8>,

    source_segment: Vec<u8>,
    source_segment_pos: u64,
    source_next_blkno: u64,
    source_end_blkno: u64,

    target_buf: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            input: Vec::new(),
            cursor: 0,
            no_more_input: false,
            phase: Phase::FileHeader,
            cur_header: None,
            header_bytes: Vec::new(),
            body: Vec::new(),
            source_segment: Vec::new(),
            source_segment_pos: 0,
            source_next_blkno: 0,
            source_end_blkno: 0,
            target_buf: Vec::new(),
        }
    }

    /// Appends freshly decompressed bytes to the pending input.
    pub fn feed_input(&mut self, chunk: &[u8]) {
        if self.cursor > 0 {
            self.input.drain(0..self.cursor);
            self.cursor = 0;
        }
        self.input.extend_from_slice(chunk);
    }

    /// Tells the decoder that no further input will ever be fed, so a
    /// `NeedInput` with an empty remainder means the stream is finished.
    pub fn set_no_more_input(&mut self) {
        self.no_more_input = true;
    }

    fn remaining(&self) -> &[u8] {
        &self.input[self.cursor..]
    }

    /// Supplies a source block requested by a preceding [`Event::GetSrcBlk`].
    pub fn provide_source_block(&mut self, blkno: u64, data: &[u8]) {
        let block_start = blkno * BLOCK_SIZE as u64;
        let seg_start = self.source_segment_pos;
        let seg_end = seg_start + self.source_segment.len() as u64;
        let blk_end = block_start + data.len() as u64;

        let overlap_start = block_start.max(seg_start);
        let overlap_end = blk_end.min(seg_end);
        if overlap_start < overlap_end {
            let src_off = (overlap_start - block_start) as usize;
            let dst_off = (overlap_start - seg_start) as usize;
            let len = (overlap_end - overlap_start) as usize;
            self.source_segment[dst_off..dst_off + len]
                .copy_from_slice(&data[src_off..src_off + len]);
        }
        self.source_next_blkno += 1;
    }

    /// Advances the decoder by one step, returning the next event.
    pub fn step(&mut self) -> Result<Event> {
        loop {
            match self.phase {
                Phase::FileHeader => match FileHeader::try_parse(self.remaining()) {
                    None => {
                        if self.no_more_input {
                            return Err(PatchError::corrupt("truncated VCDIFF file header"));
                        }
                        return Ok(Event::NeedInput);
                    }
                    Some(Err(msg)) => return Err(PatchError::corrupt(msg)),
                    Some(Ok(fh)) => {
                        self.cursor += fh.len;
                        self.phase = Phase::WindowHeader;
                        return Ok(Event::GotHeader);
                    }
                },

                Phase::WindowHeader => match WindowHeader::try_parse(self.remaining()) {
                    None => {
                        if self.no_more_input {
                            return Err(PatchError::corrupt("truncated VCDIFF window header"));
                        }
                        return Ok(Event::NeedInput);
                    }
                    Some(Err(msg)) => return Err(PatchError::corrupt(msg)),
                    Some(Ok(None)) => {
                        if self.no_more_input {
                            return Ok(Event::Done);
                        }
                        return Ok(Event::NeedInput);
                    }
                    Some(Ok(Some(wh))) => {
                        let body_len = (wh.data_len + wh.inst_len + wh.addr_len) as usize;
                        if self.remaining().len() < wh.len + body_len {
                            if self.no_more_input {
                                return Err(PatchError::corrupt("truncated VCDIFF window body"));
                            }
                            return Ok(Event::NeedInput);
                        }

                        self.header_bytes =
                            self.input[self.cursor..self.cursor + wh.len].to_vec();
                        self.cursor += wh.len;
                        self.body = self.input[self.cursor..self.cursor + body_len].to_vec();
                        self.cursor += body_len;

                        let mut target_buf = Vec::new();
                        target_buf.try_reserve(wh.target_window_len as usize).map_err(|_| {
                            PatchError::OutOfMemory(format!(
                                "target window of {} bytes exceeds available memory",
                                wh.target_window_len
                            ))
                        })?;
                        self.target_buf = target_buf;

                        if wh.uses_source() {
                            let mut seg = Vec::new();
                            seg.try_reserve_exact(wh.source_segment_len as usize)
                                .map_err(|_| {
                                    PatchError::OutOfMemory(format!(
                                        "source segment of {} bytes exceeds available memory",
                                        wh.source_segment_len
                                    ))
                                })?;
                            seg.resize(wh.source_segment_len as usize, 0);
                            self.source_segment = seg;
                            self.source_segment_pos = wh.source_segment_pos;
                            self.source_next_blkno = wh.source_segment_pos / BLOCK_SIZE as u64;
                            self.source_end_blkno = (wh.source_segment_pos
                                + wh.source_segment_len.saturating_sub(1))
                                / BLOCK_SIZE as u64;
                        } else {
                            self.source_segment.clear();
                            self.source_segment_pos = 0;
                            self.source_next_blkno = 0;
                            self.source_end_blkno = 0;
                        }

                        self.cur_header = Some(wh);
                        self.phase = Phase::AwaitSource;
                        return Ok(Event::WinStart);
                    }
                },

                Phase::AwaitSource => {
                    if self.source_next_blkno <= self.source_end_blkno
                        && !self.source_segment.is_empty()
                    {
                        let blkno = self.source_next_blkno;
                        return Ok(Event::GetSrcBlk(blkno));
                    }
                    self.phase = Phase::Executing;
                }

                Phase::Executing => {
                    self.decode_window_body()?;
                    self.phase = Phase::Output;
                    return Ok(Event::Output);
                }

                Phase::Output => {
                    // Caller is expected to call take_output() before
                    // stepping again; if they didn't, do nothing harmful.
                    self.phase = Phase::Finish;
                }

                Phase::Finish => {
                    self.cur_header = None;
                    self.phase = Phase::WindowHeader;
                    return Ok(Event::WinFinish);
                }
            }
        }
    }

    /// Takes the fully decoded bytes for the window that just produced
    /// [`Event::Output`]. Must be called exactly once per `Output` event.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.target_buf)
    }

    /// Reassembles this window as a standalone one-window VCDIFF stream
    /// (file header + this window's header and body, verbatim) and asks
    /// the real xdelta3 decoder to execute its instructions against the
    /// buffered source segment. This is what makes this crate able to
    /// apply patches actually produced by the `xdelta3` tool, rather than
    /// only patches produced by its own test fixtures.
    fn decode_window_body(&mut self) -> Result<()> {
        let header = self.cur_header.as_ref().expect("window header set");

        let mut standalone = Vec::with_capacity(5 + self.header_bytes.len() + self.body.len());
        standalone.extend_from_slice(&header::MAGIC);
        standalone.push(0); // hdr_indicator: no app header, no secondary table
        standalone.extend_from_slice(&self.header_bytes);
        standalone.extend_from_slice(&self.body);

        let decoded = xdelta3::decode(&standalone, &self.source_segment)
            .map_err(|e| PatchError::corrupt(format!("xdelta3 decode error: {e}")))?;

        if decoded.len() as u64 != header.target_window_len {
            return Err(PatchError::corrupt(format!(
                "window decoded to {} bytes, header declared {}",
                decoded.len(),
                header.target_window_len
            )));
        }

        self.target_buf = decoded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_header() -> Vec<u8> {
        vec![0xD6, 0xC3, 0xC4, 0x00, 0x00]
    }

    /// Drives the decoder to completion, answering every `GetSrcBlk`
    /// request out of `source` (sliced at [`BLOCK_SIZE`] granularity, as
    /// the real engine would).
    fn run_to_completion(stream: &[u8], source: &[u8]) -> Vec<u8> {
        let mut dec = Decoder::new();
        dec.feed_input(stream);
        dec.set_no_more_input();
        let mut out = Vec::new();
        loop {
            match dec.step().unwrap() {
                Event::NeedInput => panic!("decoder starved of input in a fully-buffered test"),
                Event::GetSrcBlk(blkno) => {
                    let start = (blkno * BLOCK_SIZE as u64) as usize;
                    let chunk = if start < source.len() {
                        &source[start..(start + BLOCK_SIZE).min(source.len())]
                    } else {
                        &[][..]
                    };
                    dec.provide_source_block(blkno, chunk);
                }
                Event::Output => out.extend_from_slice(&dec.take_output()),
                Event::Done => break,
                _ => {}
            }
        }
        out
    }

    #[test]
    fn decodes_a_real_xdelta3_add_only_patch() {
        let target = b"hello world";
        let patch = xdelta3::encode(target, b"").expect("xdelta3 encode");
        assert_eq!(run_to_completion(&patch, b""), target);
    }

    #[test]
    fn decodes_a_real_xdelta3_patch_against_a_source() {
        let mut source = b"the quick brown fox jumps over the lazy dog ".repeat(50);
        let mut target = source.clone();
        target.truncate(source.len() - 10);
        target.extend_from_slice(b"and a friendly cat too");
        source.shrink_to_fit();

        let patch = xdelta3::encode(&target, &source).expect("xdelta3 encode");
        assert_eq!(run_to_completion(&patch, &source), target);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut dec = Decoder::new();
        dec.feed_input(&[0, 1, 2, 3, 4]);
        dec.set_no_more_input();
        assert!(dec.step().is_err());
    }

    #[test]
    fn truncated_file_header_requests_more_input() {
        let mut dec = Decoder::new();
        dec.feed_input(&file_header()[..3]);
        assert!(matches!(dec.step().unwrap(), Event::NeedInput));
    }
}
