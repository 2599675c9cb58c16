// SPDX-License-Identifier: Apache-2.0

//! Round-robin input multiplexing.

use crate::config::MAX_CHANNELS;

/// Selects the channel for the next conversion, cycling through `0..n_channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelScheduler {
    /// Channel the next conversion belongs to
    current: usize,
    /// Channels in one cycle
    n_channels: usize,
}

impl ChannelScheduler {
    /// Start at channel 0. `n_channels` is forced into `1..=MAX_CHANNELS`.
    pub const fn new(n_channels: usize) -> Self {
        let n_channels = if n_channels == 0 {
            1
        } else if n_channels > MAX_CHANNELS {
            MAX_CHANNELS
        } else {
            n_channels
        };
        Self {
            current: 0,
            n_channels,
        }
    }

    /// Channel of the conversion in progress
    pub fn current(&self) -> usize {
        self.current
    }

    /// Move to the next channel after a conversion completed.
    ///
    /// Returns `true` when the scheduler wrapped back to channel 0, i.e. a full sample group
    /// has landed.
    pub fn advance(&mut self) -> bool {
        self.current += 1;
        if self.current >= self.n_channels {
            self.current = 0;
            true
        } else {
            false
        }
    }

    /// Restart the cycle at channel 0 with a new channel count
    pub fn reset(&mut self, n_channels: usize) {
        *self = Self::new(n_channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_completes_on_wrap() {
        let mut scheduler = ChannelScheduler::new(3);
        let completed: [bool; 6] = core::array::from_fn(|_| scheduler.advance());
        assert_eq!(completed, [false, false, true, false, false, true]);
        assert_eq!(scheduler.current(), 0);
    }

    #[test]
    fn single_channel_completes_every_conversion() {
        let mut scheduler = ChannelScheduler::new(1);
        assert!(scheduler.advance());
        assert!(scheduler.advance());
        assert_eq!(scheduler.current(), 0);
    }

    #[test]
    fn reset_returns_to_channel_zero() {
        let mut scheduler = ChannelScheduler::new(4);
        scheduler.advance();
        scheduler.advance();
        scheduler.reset(2);
        assert_eq!(scheduler.current(), 0);
        assert!(!scheduler.advance());
        assert!(scheduler.advance());
    }
}
