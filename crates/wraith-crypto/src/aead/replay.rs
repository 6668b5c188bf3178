//! Sliding-window anti-replay admission for a single receive direction.
//!
//! One instance guards one keypair's receive counter. A counter is
//! admitted if it has not been seen before and is not older than the
//! window behind the highest counter admitted so far.

/// Width of the replay window in bits.
const WINDOW_SIZE: u64 = 2048;

/// Sliding-window replay filter, one per keypair receive direction.
pub struct ReplayProtection {
    /// Highest counter admitted so far (`u64::MAX` sentinel means "none yet").
    highest: u64,
    /// Bitmap of the `WINDOW_SIZE` counters below and including `highest`.
    /// Bit `i` set means `highest - i` has been seen.
    window: Vec<u64>,
    seen_any: bool,
}

impl ReplayProtection {
    /// Create a fresh filter with no counters admitted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            highest: 0,
            window: vec![0u64; (WINDOW_SIZE / 64) as usize],
            seen_any: false,
        }
    }

    /// Check whether `counter` is acceptable and, if so, record it.
    ///
    /// Returns `false` for a replay (already seen) or a counter too far
    /// behind the current window to be representable.
    pub fn check_and_update(&mut self, counter: u64) -> bool {
        if !self.seen_any {
            self.seen_any = true;
            self.highest = counter;
            self.set_bit(0);
            return true;
        }

        if counter > self.highest {
            let advance = counter - self.highest;
            if advance >= WINDOW_SIZE {
                self.window.iter_mut().for_each(|w| *w = 0);
            } else {
                self.shift_left(advance);
            }
            self.highest = counter;
            self.set_bit(0);
            return true;
        }

        let behind = self.highest - counter;
        if behind >= WINDOW_SIZE {
            return false;
        }
        if self.test_bit(behind) {
            return false;
        }
        self.set_bit(behind);
        true
    }

    /// Reset to the empty state (used on rekey).
    pub fn reset(&mut self) {
        self.highest = 0;
        self.seen_any = false;
        self.window.iter_mut().for_each(|w| *w = 0);
    }

    fn shift_left(&mut self, n: u64) {
        let words = self.window.len();
        let word_shift = (n / 64) as usize;
        let bit_shift = n % 64;

        if word_shift >= words {
            self.window.iter_mut().for_each(|w| *w = 0);
            return;
        }

        for i in (0..words).rev() {
            let from_word = i.checked_sub(word_shift);
            let hi = from_word.map(|f| self.window[f]).unwrap_or(0);
            let lo_word = from_word.and_then(|f| f.checked_sub(1));
            let lo = lo_word.map(|f| self.window[f]).unwrap_or(0);
            self.window[i] = if bit_shift == 0 {
                hi
            } else {
                (hi << bit_shift) | (lo >> (64 - bit_shift))
            };
        }
    }

    fn set_bit(&mut self, pos: u64) {
        let word = (pos / 64) as usize;
        let bit = pos % 64;
        self.window[word] |= 1u64 << bit;
    }

    fn test_bit(&self, pos: u64) -> bool {
        let word = (pos / 64) as usize;
        let bit = pos % 64;
        (self.window[word] >> bit) & 1 == 1
    }
}

impl Default for ReplayProtection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_sequence_all_accepted() {
        let mut rp = ReplayProtection::new();
        for i in 0..1000 {
            assert!(rp.check_and_update(i));
        }
    }

    #[test]
    fn exact_duplicate_rejected() {
        let mut rp = ReplayProtection::new();
        assert!(rp.check_and_update(5));
        assert!(!rp.check_and_update(5));
    }

    #[test]
    fn out_of_order_within_window_accepted_once() {
        let mut rp = ReplayProtection::new();
        assert!(rp.check_and_update(10));
        assert!(rp.check_and_update(8));
        assert!(rp.check_and_update(9));
        assert!(!rp.check_and_update(8));
        assert!(!rp.check_and_update(9));
    }

    #[test]
    fn far_behind_window_rejected() {
        let mut rp = ReplayProtection::new();
        assert!(rp.check_and_update(10_000));
        assert!(!rp.check_and_update(0));
    }

    #[test]
    fn large_forward_jump_clears_window() {
        let mut rp = ReplayProtection::new();
        assert!(rp.check_and_update(0));
        assert!(rp.check_and_update(1_000_000));
        assert!(rp.check_and_update(999_999 - (WINDOW_SIZE - 2)));
    }

    #[test]
    fn reset_clears_state() {
        let mut rp = ReplayProtection::new();
        assert!(rp.check_and_update(42));
        rp.reset();
        assert!(rp.check_and_update(42));
    }
}
