//! Fixed-length bit vector used for free-slot tracking.

use std::fmt;

/// A bit vector of `len()` bits packed into `num_chars()` bytes.
///
/// Bit `i` lives in byte `i / 8` at bit position `i % 8`. Padding bits past
/// `len()` are always zero.
///
/// Indexing past the end is a programming error: [`set`](Self::set),
/// [`reset`](Self::reset) and [`test`](Self::test) panic instead of
/// returning an error, so callers validate indices first.
///
/// # Example
/// ```
/// use microsql::record::Bitmap;
///
/// let mut bitmap = Bitmap::new(10);
/// bitmap.set(3);
/// assert!(bitmap.test(3));
/// assert_eq!(bitmap.num_chars(), 2);
/// assert_eq!(bitmap.to_string(), "[00010000.00]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    size: usize,
    buffer: Vec<u8>,
}

impl Bitmap {
    /// Bytes needed to hold `num_bits` bits.
    #[inline]
    pub const fn chars_for(num_bits: usize) -> usize {
        num_bits.div_ceil(8)
    }

    /// Create a bitmap with every bit cleared.
    pub fn new(num_bits: usize) -> Self {
        Self {
            size: num_bits,
            buffer: vec![0u8; Self::chars_for(num_bits)],
        }
    }

    /// Deserialize from the first `chars_for(num_bits)` bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is too short.
    pub fn from_bytes(buf: &[u8], num_bits: usize) -> Self {
        let num_chars = Self::chars_for(num_bits);
        assert!(buf.len() >= num_chars, "buffer too small for bitmap");
        let mut bitmap = Self {
            size: num_bits,
            buffer: buf[..num_chars].to_vec(),
        };
        bitmap.clear_padding();
        bitmap
    }

    /// Serialize into `buf`, which must be exactly `num_chars()` long.
    ///
    /// # Panics
    /// Panics if `buf.len() != self.num_chars()`.
    pub fn write_to(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.num_chars(), "bitmap buffer length mismatch");
        buf.copy_from_slice(&self.buffer);
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[inline]
    pub fn num_chars(&self) -> usize {
        self.buffer.len()
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn set(&mut self, bit: usize) {
        assert!(bit < self.size, "bit {} out of range for {} bits", bit, self.size);
        self.buffer[bit / 8] |= 1 << (bit % 8);
    }

    pub fn reset(&mut self, bit: usize) {
        assert!(bit < self.size, "bit {} out of range for {} bits", bit, self.size);
        self.buffer[bit / 8] &= !(1 << (bit % 8));
    }

    pub fn test(&self, bit: usize) -> bool {
        assert!(bit < self.size, "bit {} out of range for {} bits", bit, self.size);
        self.buffer[bit / 8] & (1 << (bit % 8)) != 0
    }

    pub fn set_all(&mut self) {
        self.buffer.fill(0xFF);
        self.clear_padding();
    }

    pub fn reset_all(&mut self) {
        self.buffer.fill(0);
    }

    /// Index of the lowest set bit.
    pub fn first_set(&self) -> Option<usize> {
        self.buffer
            .iter()
            .enumerate()
            .find(|(_, &byte)| byte != 0)
            .map(|(i, &byte)| i * 8 + byte.trailing_zeros() as usize)
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.buffer.iter().map(|b| b.count_ones() as usize).sum()
    }

    fn clear_padding(&mut self) {
        let tail = self.size % 8;
        if tail != 0 {
            if let Some(last) = self.buffer.last_mut() {
                *last &= (1u8 << tail) - 1;
            }
        }
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..self.size {
            if i % 8 == 0 && i != 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", u8::from(self.test(i)))?;
        }
        write!(f, "]")
    }
}
