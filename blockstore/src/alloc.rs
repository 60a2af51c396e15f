const WORD_BITS: usize = u64::BITS as usize;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

/// A fixed length bit vector tracking which slots are in use.
///
/// Bit `i` lives in word `i / 64` at position `i % 64`. Bits past `bit_count` in the
/// last word are never set, which lets [`Bitmap::ffz`] and [`Bitmap::total_set`] work a
/// whole word at a time without masking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    bit_count: usize,
}

impl Bitmap {
    /// Creates a bitmap of `bit_count` clear bits. Returns `None` for an empty bitmap.
    pub fn new(bit_count: usize) -> Option<Self> {
        if bit_count == 0 {
            return None;
        }
        Some(Self::zeroed(bit_count))
    }

    /// Callers guarantee `bit_count > 0`.
    pub(crate) fn zeroed(bit_count: usize) -> Self {
        debug_assert!(bit_count > 0);
        Self {
            words: vec![0; (bit_count + WORD_BITS - 1) / WORD_BITS],
            bit_count,
        }
    }

    /// Rebuilds a bitmap from its byte form (see [`Bitmap::to_bytes`]). Bits beyond
    /// `bit_count` in the last byte are dropped.
    pub fn from_bytes(bit_count: usize, bytes: &[u8]) -> Option<Self> {
        let mut bmp = Self::new(bit_count)?;
        if bytes.len() < bmp.byte_len() {
            return None;
        }

        for (word, chunk) in bmp.words.iter_mut().zip(bytes.chunks(WORD_BITS / 8)) {
            let mut raw = [0; WORD_BITS / 8];
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }
        // `bytes` may be longer than needed, so clear whatever landed past the end.
        let tail = bit_count % WORD_BITS;
        if tail != 0 {
            if let Some(last) = bmp.words.last_mut() {
                *last &= (1_u64 << tail) - 1;
            }
        }
        Some(bmp)
    }

    /// Encodes the bitmap as `ceil(bit_count / 8)` bytes. Bit `i` is bit `i % 8` of
    /// byte `i / 8`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.truncate(self.byte_len());
        bytes
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Number of bytes in the encoded form.
    pub fn byte_len(&self) -> usize {
        (self.bit_count + 7) / 8
    }

    pub fn get(&self, bit: usize) -> State {
        if self.test(bit) {
            State::Used
        } else {
            State::Free
        }
    }

    /// Returns true if `bit` is set. Out of range bits read as clear.
    pub fn test(&self, bit: usize) -> bool {
        if bit >= self.bit_count {
            return false;
        }
        let (word, mask) = Self::locate(bit);
        self.words[word] & mask != 0
    }

    /// Marks `bit` as set. Out of range bits are ignored.
    pub fn set(&mut self, bit: usize) {
        if bit >= self.bit_count {
            return;
        }
        let (word, mask) = Self::locate(bit);
        self.words[word] |= mask;
    }

    /// Marks `bit` as clear. Out of range bits are ignored.
    pub fn reset(&mut self, bit: usize) {
        if bit >= self.bit_count {
            return;
        }
        let (word, mask) = Self::locate(bit);
        self.words[word] &= !mask;
    }

    /// Finds the lowest clear bit, or `None` when every bit is set.
    pub fn ffz(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(pos, word)| pos * WORD_BITS + word.trailing_ones() as usize)
            // A partial last word has clear padding bits past the end.
            .filter(|&bit| bit < self.bit_count)
    }

    /// Counts set bits across the whole range.
    pub fn total_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over the indices of set bits in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(pos, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let offset = rest.trailing_zeros() as usize;
                // Clear the lowest set bit.
                rest &= rest - 1;
                Some(pos * WORD_BITS + offset)
            })
        })
    }

    fn locate(bit: usize) -> (usize, u64) {
        (bit / WORD_BITS, 1_u64 << (bit % WORD_BITS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bitmap_is_rejected() {
        assert!(Bitmap::new(0).is_none());
    }

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new(4096).unwrap();

        bmp.set(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new(4096).unwrap();

        bmp.set(0);
        bmp.set(4095);

        assert!(bmp.test(0));
        assert!(bmp.test(4095));
        assert_eq!(bmp.total_set(), 2);
    }

    #[test]
    fn can_toggle_bit_between_free_and_used() {
        let mut bmp = Bitmap::new(100).unwrap();
        bmp.set(9);
        bmp.set(10);
        bmp.set(11);

        bmp.reset(10);

        assert_eq!(bmp.get(10), State::Free);
        // Neighbours are untouched.
        assert!(bmp.test(9));
        assert!(bmp.test(11));
    }

    #[test]
    fn out_of_range_bits_are_ignored() {
        let mut bmp = Bitmap::new(10).unwrap();

        bmp.set(10);
        bmp.set(usize::MAX);
        bmp.reset(64);

        assert!(!bmp.test(10));
        assert!(!bmp.test(usize::MAX));
        assert_eq!(bmp.total_set(), 0);
        assert_eq!(bmp.ffz(), Some(0));
    }

    #[test]
    fn ffz_on_fresh_bitmap_is_zero() {
        assert_eq!(Bitmap::new(1).unwrap().ffz(), Some(0));
        assert_eq!(Bitmap::new(256).unwrap().ffz(), Some(0));
    }

    #[test]
    fn ffz_skips_leading_set_bits() {
        let mut bmp = Bitmap::new(300).unwrap();
        for k in 0..200 {
            assert_eq!(bmp.ffz(), Some(k));
            bmp.set(k);
        }
        assert_eq!(bmp.ffz(), Some(200));
    }

    #[test]
    fn ffz_returns_lowest_hole() {
        let mut bmp = Bitmap::new(256).unwrap();
        (0..256).for_each(|i| bmp.set(i));
        bmp.reset(200);
        bmp.reset(70);

        assert_eq!(bmp.ffz(), Some(70));
    }

    #[test]
    fn ffz_on_full_bitmap_finds_nothing() {
        // Sizes on and off a word boundary.
        for &n in &[1, 7, 63, 64, 65, 255, 256] {
            let mut bmp = Bitmap::new(n).unwrap();
            (0..n).for_each(|i| bmp.set(i));
            assert_eq!(bmp.ffz(), None, "bitmap of {} bits", n);
            assert_eq!(bmp.total_set(), n);
        }
    }

    #[test]
    fn iter_set_lists_indices_in_order() {
        let mut bmp = Bitmap::new(200).unwrap();
        for &i in &[199, 0, 64, 63, 130] {
            bmp.set(i);
        }

        assert_eq!(bmp.iter_set().collect::<Vec<_>>(), vec![0, 63, 64, 130, 199]);
    }

    #[test]
    fn can_serialize_and_deserialize_state() {
        let mut bmp = Bitmap::new(70).unwrap();
        bmp.set(10);
        bmp.set(11);
        bmp.set(69);

        let bytes = bmp.to_bytes();
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[1], 0b0000_1100);

        let read_bmp = Bitmap::from_bytes(70, &bytes).unwrap();
        assert_eq!(read_bmp, bmp);
    }

    #[test]
    fn from_bytes_drops_bits_past_the_end() {
        let bmp = Bitmap::from_bytes(4, &[0xFF; 8]).unwrap();

        assert_eq!(bmp.total_set(), 4);
        assert_eq!(bmp.ffz(), None);
    }

    #[test]
    fn from_bytes_rejects_short_input() {
        assert!(Bitmap::from_bytes(17, &[0, 0]).is_none());
    }
}
