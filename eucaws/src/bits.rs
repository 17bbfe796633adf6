//! Read and write unsigned integers of any width up to 32 bits, most significant bit first.
//!
//! # Examples
//!
//! ```
//! use eucaws::bits::{BitReader, BitWriter};
//! let mut writer = BitWriter::new();
//! writer.write(5, 3);
//! writer.write(300, 9);
//! let bytes = writer.into_bytes();
//! assert_eq!(vec![0b1011_0010, 0b1100_0000], bytes);
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(5, reader.read(3).unwrap());
//! assert_eq!(300, reader.read(9).unwrap());
//! assert_eq!(4, reader.bits_remaining());
//! ```

/// A single-pass cursor over a byte buffer.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

/// Packs values into bytes, the inverse of a `BitReader`.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    position: usize,
}

/// Returned when a read asks for more bits than are left.
///
/// Nothing is consumed by a failed read.
#[derive(Clone, Copy, Debug, Fail, PartialEq)]
#[fail(
    display = "tried to read {} bits at bit {} with only {} bits remaining",
    requested,
    position,
    remaining
)]
pub struct Underrun {
    /// The number of bits asked for.
    pub requested: u8,

    /// The bit position of the read.
    pub position: usize,

    /// The number of bits that were left.
    pub remaining: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new reader positioned at the first bit of the buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::bits::BitReader;
    /// let reader = BitReader::new(&[0xff, 0x00]);
    /// assert_eq!(16, reader.bits_remaining());
    /// ```
    pub fn new(bytes: &'a [u8]) -> BitReader<'a> {
        BitReader {
            bytes: bytes,
            position: 0,
        }
    }

    /// Reads the next `width` bits as an unsigned integer.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or more than 32.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::bits::BitReader;
    /// let mut reader = BitReader::new(&[0b0110_0100, 0b1000_0000]);
    /// assert_eq!(100, reader.read(8).unwrap());
    /// assert_eq!(1, reader.read(1).unwrap());
    /// assert!(reader.read(8).is_err());
    /// assert_eq!(0, reader.read(7).unwrap());
    /// ```
    pub fn read(&mut self, width: u8) -> Result<u32, Underrun> {
        assert!(width >= 1 && width <= 32, "invalid bit width: {}", width);
        let remaining = self.bits_remaining();
        if usize::from(width) > remaining {
            return Err(Underrun {
                requested: width,
                position: self.position,
                remaining: remaining,
            });
        }
        let mut value = 0u64;
        for _ in 0..width {
            let byte = self.bytes[self.position / 8];
            let bit = (byte >> (7 - self.position % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            self.position += 1;
        }
        Ok(value as u32)
    }

    /// Reads one bit as a boolean.
    pub fn read_bool(&mut self) -> Result<bool, Underrun> {
        self.read(1).map(|bit| bit == 1)
    }

    /// Returns the number of bits consumed so far.
    pub fn bits_read(&self) -> usize {
        self.position
    }

    /// Returns the number of bits left in the buffer.
    pub fn bits_remaining(&self) -> usize {
        self.bytes.len() * 8 - self.position
    }
}

impl BitWriter {
    /// Creates a new, empty writer.
    pub fn new() -> BitWriter {
        BitWriter::default()
    }

    /// Appends the low `width` bits of `value`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or more than 32.
    pub fn write(&mut self, value: u32, width: u8) {
        assert!(width >= 1 && width <= 32, "invalid bit width: {}", width);
        for i in (0..width).rev() {
            if self.position % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (7 - self.position % 8);
            }
            self.position += 1;
        }
    }

    /// Returns the number of bits written so far.
    pub fn bits_written(&self) -> usize {
        self.position
    }

    /// Returns the written bytes, with the last byte zero-padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the written bytes, zero-padded to at least `len` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::bits::BitWriter;
    /// let mut writer = BitWriter::new();
    /// writer.write(1, 1);
    /// assert_eq!(vec![0x80, 0, 0], writer.into_padded_bytes(3));
    /// ```
    pub fn into_padded_bytes(mut self, len: usize) -> Vec<u8> {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
        self.bytes
    }
}
