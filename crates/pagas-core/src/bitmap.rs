//! Per-page validity bitmap.
//!
//! One bit per page of an allocation: set means the page is locally
//! resident and current as of the last synchronization (owned, cached, or
//! materialised by an explicit prefetch). The fault engine and the
//! synchronization protocol are the only writers.
//!
//! Besides point queries and range updates, the bitmap answers
//! "maximal contiguous valid run containing index", which the accessors use
//! to coalesce repeated validity checks over sequential reads.

use std::ops::Range;

const WORD_BITS: usize = 64;

/// Bitmap with one bit per page.
#[derive(Debug, Clone)]
pub struct ValidityBitmap {
    words: Vec<u64>,
    len: usize,
}

/// Mask with bits `[lo, hi)` of a word set.
fn mask(lo: usize, hi: usize) -> u64 {
    debug_assert!(lo <= hi && hi <= WORD_BITS);
    if hi - lo == WORD_BITS {
        u64::MAX
    } else {
        ((1u64 << (hi - lo)) - 1) << lo
    }
}

impl ValidityBitmap {
    /// Create a bitmap of `len` pages, all invalid.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of pages tracked.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitmap tracks no pages.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether page `index` is valid.
    pub fn check(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Mark pages `[start, end)` valid.
    pub fn set_range(&mut self, start: usize, end: usize) {
        self.update_range(start, end, true);
    }

    /// Mark pages `[start, end)` invalid.
    pub fn clear_range(&mut self, start: usize, end: usize) {
        self.update_range(start, end, false);
    }

    /// Mark every page invalid.
    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Number of valid pages.
    pub fn count_valid(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn update_range(&mut self, start: usize, end: usize, value: bool) {
        debug_assert!(start <= end && end <= self.len);
        if start == end {
            return;
        }
        let (first_word, first_bit) = (start / WORD_BITS, start % WORD_BITS);
        let (last_word, last_bit) = ((end - 1) / WORD_BITS, (end - 1) % WORD_BITS + 1);
        if first_word == last_word {
            let m = mask(first_bit, last_bit);
            if value {
                self.words[first_word] |= m;
            } else {
                self.words[first_word] &= !m;
            }
            return;
        }
        let head = mask(first_bit, WORD_BITS);
        let tail = mask(0, last_bit);
        if value {
            self.words[first_word] |= head;
            self.words[last_word] |= tail;
            self.words[first_word + 1..last_word].fill(u64::MAX);
        } else {
            self.words[first_word] &= !head;
            self.words[last_word] &= !tail;
            self.words[first_word + 1..last_word].fill(0);
        }
    }

    /// Maximal contiguous run `[start, end)` of valid pages containing
    /// `index`. Returns the empty range `index..index` when the page is
    /// invalid.
    pub fn valid_run(&self, index: usize) -> Range<usize> {
        debug_assert!(index < self.len);
        if !self.check(index) {
            return index..index;
        }
        let word = index / WORD_BITS;
        let bit = index % WORD_BITS;

        // Consecutive set bits at and below `bit`.
        let below = (!(self.words[word] << (WORD_BITS - 1 - bit))).leading_zeros() as usize;
        let mut start = index + 1 - below;
        if below == bit + 1 {
            let mut w = word;
            while w > 0 && self.words[w - 1] == u64::MAX {
                w -= 1;
                start -= WORD_BITS;
            }
            if w > 0 {
                start -= (!self.words[w - 1]).leading_zeros() as usize;
            }
        }

        // Consecutive set bits at and above `bit`.
        let above = (!(self.words[word] >> bit)).trailing_zeros() as usize;
        let mut end = index + above;
        if bit + above == WORD_BITS {
            let mut w = word + 1;
            while w < self.words.len() && self.words[w] == u64::MAX {
                end += WORD_BITS;
                w += 1;
            }
            if w < self.words.len() {
                end += (!self.words[w]).trailing_zeros() as usize;
            }
        }

        start..end.min(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_invalid() {
        let bm = ValidityBitmap::new(200);
        assert_eq!(bm.len(), 200);
        assert_eq!(bm.count_valid(), 0);
        assert!(!bm.check(0));
        assert!(!bm.check(199));
    }

    #[test]
    fn test_set_and_clear_within_word() {
        let mut bm = ValidityBitmap::new(64);
        bm.set_range(3, 10);
        assert!(!bm.check(2));
        assert!(bm.check(3));
        assert!(bm.check(9));
        assert!(!bm.check(10));
        bm.clear_range(5, 7);
        assert!(bm.check(4));
        assert!(!bm.check(5));
        assert!(!bm.check(6));
        assert!(bm.check(7));
    }

    #[test]
    fn test_set_across_words() {
        let mut bm = ValidityBitmap::new(300);
        bm.set_range(60, 200);
        assert_eq!(bm.count_valid(), 140);
        assert!(!bm.check(59));
        assert!(bm.check(60));
        assert!(bm.check(199));
        assert!(!bm.check(200));
        bm.clear_range(64, 192);
        assert_eq!(bm.count_valid(), 12);
    }

    #[test]
    fn test_clear_all() {
        let mut bm = ValidityBitmap::new(130);
        bm.set_range(0, 130);
        assert_eq!(bm.count_valid(), 130);
        bm.clear_all();
        assert_eq!(bm.count_valid(), 0);
    }

    #[test]
    fn test_valid_run_invalid_page_is_empty() {
        let bm = ValidityBitmap::new(100);
        assert_eq!(bm.valid_run(42), 42..42);
    }

    #[test]
    fn test_valid_run_within_word() {
        let mut bm = ValidityBitmap::new(64);
        bm.set_range(10, 20);
        assert_eq!(bm.valid_run(10), 10..20);
        assert_eq!(bm.valid_run(15), 10..20);
        assert_eq!(bm.valid_run(19), 10..20);
    }

    #[test]
    fn test_valid_run_spans_words() {
        let mut bm = ValidityBitmap::new(400);
        bm.set_range(50, 350);
        assert_eq!(bm.valid_run(63), 50..350);
        assert_eq!(bm.valid_run(64), 50..350);
        assert_eq!(bm.valid_run(200), 50..350);
        assert_eq!(bm.valid_run(349), 50..350);
    }

    #[test]
    fn test_valid_run_clamped_to_len() {
        let mut bm = ValidityBitmap::new(70);
        bm.set_range(60, 70);
        assert_eq!(bm.valid_run(65), 60..70);
    }

    #[test]
    fn test_valid_run_split_by_hole() {
        let mut bm = ValidityBitmap::new(128);
        bm.set_range(0, 128);
        bm.clear_range(64, 65);
        assert_eq!(bm.valid_run(10), 0..64);
        assert_eq!(bm.valid_run(70), 65..128);
    }
}
