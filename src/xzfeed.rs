//! XZ feeder (component C4).
//!
//! Drives the XZ decoder in a loop until its output buffer is full or the
//! stream ends, then hands the filled buffer to the delta decoder. The
//! input side is always the whole memory-mapped patch: the decoder consumes
//! from it as needed, so the feeder only tracks how much of the patch bytes
//! it has handed over so far.

use xz2::stream::{Action, Status, Stream};

use crate::error::{PatchError, Result};
use crate::tunables::{XZ_DICT_SIZE, XZ_OUTPUT_SIZE};

/// Drives one `xz2::stream::Stream` decoder over a borrowed, fully
/// memory-mapped patch buffer.
pub struct XzFeeder<'p> {
    patch: &'p [u8],
    input_pos: usize,
    stream: Stream,
    output: Vec<u8>,
    filled_len: usize,
}

impl<'p> XzFeeder<'p> {
    pub fn new(patch: &'p [u8]) -> Result<Self> {
        let stream = Stream::new_stream_decoder(XZ_DICT_SIZE, 0)
            .map_err(|e| PatchError::corrupt(format!("failed to start XZ decoder: {e}")))?;
        Ok(XzFeeder {
            patch,
            input_pos: 0,
            stream,
            output: vec![0u8; XZ_OUTPUT_SIZE],
            filled_len: 0,
        })
    }

    /// Steps the XZ decoder until its output buffer is full or the stream
    /// ends. Returns `done = true` once `LZMA_STREAM_END` has been seen;
    /// any other non-OK status is a fatal [`PatchError::CorruptPatch`].
    pub fn decompress_chunk(&mut self) -> Result<(bool, bool)> {
        let mut total_out = 0usize;

        loop {
            let before_in = self.stream.total_in();
            let before_out = self.stream.total_out();

            let input = &self.patch[self.input_pos..];
            let action = if input.is_empty() {
                Action::Finish
            } else {
                Action::Run
            };

            let status = self
                .stream
                .process(input, &mut self.output[total_out..], action)
                .map_err(|e| PatchError::corrupt(format!("XZ decode error: {e}")))?;

            let consumed_in = (self.stream.total_in() - before_in) as usize;
            let produced_out = (self.stream.total_out() - before_out) as usize;
            self.input_pos += consumed_in;
            total_out += produced_out;

            match status {
                Status::Ok => {
                    if total_out >= self.output.len() {
                        self.filled_len = total_out;
                        return Ok((true, false));
                    }
                    if consumed_in == 0 && produced_out == 0 {
                        // No forward progress with input exhausted and the
                        // stream not yet finished: malformed patch.
                        return Err(PatchError::corrupt(
                            "XZ decoder stalled before STREAM_END",
                        ));
                    }
                }
                Status::StreamEnd => {
                    self.filled_len = total_out;
                    return Ok((true, true));
                }
                Status::GetCheck | Status::MemNeeded => {
                    return Err(PatchError::corrupt(format!(
                        "unexpected XZ decoder status: {status:?}"
                    )));
                }
            }
        }
    }

    /// The bytes produced by the most recent [`XzFeeder::decompress_chunk`]
    /// call.
    pub fn filled(&self) -> &[u8] {
        &self.output[..self.filled_len]
    }
}
