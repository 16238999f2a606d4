//! Write queue (component C3).
//!
//! Owns a ring of fixed-size target windows and delays physical writes by
//! `WRITE_QUEUE_LENGTH` windows behind the decoder's current output
//! position. That delay is what keeps the [`crate::cache::ReadFrontier`] far
//! enough behind the decoder for in-place (source == target) patching to be
//! safe — see the sizing invariant in [`crate::tunables`].

use std::io::{Seek, Write};

use crate::cache::ReadFrontier;
use crate::dontcare::MapState;
use crate::error::Result;
use crate::tunables::TARGET_WINDOW_SIZE;

/// A fixed-size output window queued for the target.
#[derive(Clone)]
pub struct TargetWrite {
    pub start: u64,
    pub length: usize,
    pub data: Vec<u8>,
}

impl TargetWrite {
    fn empty() -> Self {
        TargetWrite {
            start: 0,
            length: 0,
            data: vec![0u8; TARGET_WINDOW_SIZE],
        }
    }
}

pub struct WriteQueue {
    slots: Vec<TargetWrite>,
    /// Total windows queued so far; drives which slot the next window lands
    /// in. Distinct from the flushed count: a slot is only flushed once this
    /// counter has lapped it, which is what creates the N-window delay.
    produced: u64,
    windows_written: u64,
}

impl WriteQueue {
    pub fn new(length: usize) -> Self {
        WriteQueue {
            slots: (0..length).map(|_| TargetWrite::empty()).collect(),
            produced: 0,
            windows_written: 0,
        }
    }

    /// Flushes the slot the next window would land in if it's still holding
    /// an unflushed window, then fills it from the bytes the decoder
    /// currently has available. `avail_out` is consumed in full: the
    /// caller's decoder handle should be told afterward that its output
    /// buffer is empty.
    pub fn advance<F: Write + Seek>(
        &mut self,
        target: &mut MapState<F>,
        frontier: &mut ReadFrontier,
        avail_out: &[u8],
    ) -> Result<()> {
        let idx = (self.produced % self.slots.len() as u64) as usize;
        if self.slots[idx].length > 0 {
            let slot = &self.slots[idx];
            target.seek(slot.start)?;
            target.write(&slot.data, slot.length)?;
            flush_target(target)?;
            frontier.0 = slot.start + slot.length as u64;
            self.slots[idx].length = 0;
            self.windows_written += 1;
        }

        let slot = &mut self.slots[idx];
        slot.start = self.produced * TARGET_WINDOW_SIZE as u64;
        let n = avail_out.len().min(slot.data.len());
        slot.data[..n].copy_from_slice(&avail_out[..n]);
        slot.length = n;
        self.produced += 1;
        Ok(())
    }

    /// Invoked once after the decoder signals end-of-stream: flushes every
    /// still-buffered window so the queue is empty (`length == 0`
    /// everywhere) when the patch run completes.
    pub fn drain_all<F: Write + Seek>(
        &mut self,
        target: &mut MapState<F>,
        frontier: &mut ReadFrontier,
    ) -> Result<()> {
        for _ in 0..self.slots.len() {
            self.advance(target, frontier, &[])?;
        }
        Ok(())
    }

    /// True once [`WriteQueue::drain_all`] has flushed every slot.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.length == 0)
    }
}

fn flush_target<F: Write + Seek>(target: &mut MapState<F>) -> Result<()> {
    // MapState::write already calls write_all on the underlying handle; the
    // explicit flush here matches the teacher's own `self.target.flush()?`
    // at the end of patching, giving buffered writers (e.g. BufWriter) a
    // chance to push bytes to the OS before the frontier advances.
    target.flush()
}
