// SPDX-License-Identifier: Apache-2.0

//! Circular sample storage shared by all channels.
//!
//! Samples are interleaved round-robin (channel 0, 1, ..., N-1, 0, 1, ...). Because the pivot and
//! the [`ChannelScheduler`](crate::scheduler::ChannelScheduler) are always reset together and the
//! buffer size is a multiple of the channel count, slot `i` always holds a sample of channel
//! `i % n_channels`.

use crate::config::{Configuration, BUFFER_CAPACITY};

/// Mask of the 10 significant bits of a stored sample
pub const SAMPLE_MASK: u16 = 0x03ff;

/// Bring a possibly negative slot offset into `[0, size)`.
///
/// Negative offsets are lifted by repeated addition of `size`, so an offset behind the pivot
/// lands on the slot it names instead of being truncated towards zero. A `size` of 0 yields 0.
pub fn normalize(offset: isize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    let size = size as isize;
    let mut offset = offset;
    while offset < 0 {
        offset += size;
    }
    (offset % size) as usize
}

/// Index of the next slot to be written.
#[derive(Default, Debug, Ord, PartialOrd, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pivot(usize);

impl Pivot {
    /// Get current slot index
    pub fn get(&self) -> usize {
        self.0
    }

    /// Add with defined wrapping. Result will be within range \[0, `limit` - 1\].
    pub fn wrapping_add(&self, rhs: usize, limit: usize) -> usize {
        normalize(self.0 as isize + (rhs % limit.max(1)) as isize, limit)
    }

    /// Subtract with defined wrapping. Result will be within range \[0, `limit` - 1\].
    pub fn wrapping_sub(&self, rhs: usize, limit: usize) -> usize {
        normalize(self.0 as isize - (rhs % limit.max(1)) as isize, limit)
    }
}

/// Fixed-capacity ring of 10-bit samples.
///
/// Only the first [`size`](SampleBuffer::size) slots are in use; the rest of the
/// [`BUFFER_CAPACITY`] backing array is ignored until a reset grows the buffer again.
pub struct SampleBuffer {
    /// Backing storage, one 10-bit sample per slot
    slots: [u16; BUFFER_CAPACITY],
    /// Slots in use, `n_channels * n_samples`
    size: usize,
    /// Next slot to write
    pivot: Pivot,
}

impl SampleBuffer {
    /// Empty buffer sized for the power-up [`Configuration`]
    pub const fn new() -> Self {
        Self {
            slots: [0; BUFFER_CAPACITY],
            size: Configuration::DEFAULT.buf_size(),
            pivot: Pivot(0),
        }
    }

    /// Clear every slot, return the pivot to 0 and resize to `n_channels * n_samples`.
    ///
    /// The size is capped at [`BUFFER_CAPACITY`]; [`Configuration::apply`] already guarantees it
    /// fits.
    pub fn reset(&mut self, n_channels: usize, n_samples: usize) {
        self.slots = [0; BUFFER_CAPACITY];
        self.size = (n_channels * n_samples).min(BUFFER_CAPACITY);
        self.pivot = Pivot(0);
    }

    /// Slots in use
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slot the next sample goes to
    pub fn pivot(&self) -> usize {
        self.pivot.get()
    }

    /// Store the low 10 bits of `value` at slot `pivot` (wrapped into the buffer)
    pub fn write(&mut self, value: u16, pivot: usize) {
        let slot = normalize(pivot as isize, self.size);
        self.slots[slot] = value & SAMPLE_MASK;

        #[cfg(feature = "trace_samples")]
        trace!("slot {} <- {}", slot as u32, value & SAMPLE_MASK);
    }

    /// Sample stored at `index` (wrapped into the buffer)
    pub fn read(&self, index: usize) -> u16 {
        self.slots[normalize(index as isize, self.size)]
    }

    /// Step the pivot to the next slot, wrapping at the end. Returns the new pivot.
    pub fn advance(&mut self) -> usize {
        self.pivot = Pivot(self.pivot.wrapping_add(1, self.size));
        self.pivot.get()
    }

    /// Write `value` at the pivot and advance. Returns the slot written.
    pub fn push(&mut self, value: u16) -> usize {
        let slot = self.pivot.get();
        self.write(value, slot);
        self.advance();
        slot
    }

    /// Copy `size` samples in chronological order starting at slot `start` into `out`.
    ///
    /// Returns the number of samples copied, which is the smaller of the buffer size and
    /// `out.len()`.
    pub fn copy_from(&self, start: usize, out: &mut [u16]) -> usize {
        let len = self.size.min(out.len());
        let start = Pivot(normalize(start as isize, self.size));
        for (offset, sample) in out[..len].iter_mut().enumerate() {
            *sample = self.slots[start.wrapping_add(offset, self.size)];
        }
        len
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
