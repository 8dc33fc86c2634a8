//! LSB-first bit packing for message bodies.

use crate::error::{NetError, Result};

#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    bit_position: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written, rounded up.
    pub fn byte_len(&self) -> usize {
        self.bit_position.div_ceil(8)
    }

    pub fn bits_written(&self) -> usize {
        self.bit_position
    }

    /// Writes the low `bits` bits of `value`. `bits` must be in 1..=32.
    pub fn write_bits(&mut self, value: u32, bits: u32) {
        debug_assert!(bits > 0 && bits <= 32);

        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        let value = value & mask;

        self.buffer.resize((self.bit_position + bits as usize).div_ceil(8), 0);

        for i in 0..bits {
            let byte_idx = self.bit_position / 8;
            let bit_idx = self.bit_position % 8;
            if (value >> i) & 1 == 1 {
                self.buffer[byte_idx] |= 1 << bit_idx;
            }
            self.bit_position += 1;
        }
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_bits(u32::from(value), 1);
    }

    /// Writes `bits` zero bits, 32 at a time.
    pub fn write_padding(&mut self, bits: u32) {
        for _ in 0..bits / 32 {
            self.write_bits(0, 32);
        }
        let remainder = bits % 32;
        if remainder > 0 {
            self.write_bits(0, remainder);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_position
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u32> {
        debug_assert!(bits > 0 && bits <= 32);

        if self.bits_remaining() < bits as usize {
            return Err(NetError::MalformedMessage("truncated"));
        }

        let mut value = 0u32;
        for i in 0..bits {
            let byte = self.data[self.bit_position / 8];
            let bit = (byte >> (self.bit_position % 8)) & 1;
            value |= u32::from(bit) << i;
            self.bit_position += 1;
        }
        Ok(value)
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Consumes `bits` bits that must all be zero.
    pub fn read_padding(&mut self, bits: u32) -> Result<()> {
        for _ in 0..bits / 32 {
            if self.read_bits(32)? != 0 {
                return Err(NetError::MalformedMessage("non-zero padding"));
            }
        }
        let remainder = bits % 32;
        if remainder > 0 && self.read_bits(remainder)? != 0 {
            return Err(NetError::MalformedMessage("non-zero padding"));
        }
        Ok(())
    }

    /// Rejects trailing bytes and set bits after the last field, so that a
    /// decoded message re-encodes to exactly the input.
    pub fn finish(self) -> Result<()> {
        if self.data.len() != self.bit_position.div_ceil(8) {
            return Err(NetError::MalformedMessage("trailing bytes"));
        }
        let used = self.bit_position % 8;
        if used != 0 {
            let last = self.data[self.data.len() - 1];
            if last >> used != 0 {
                return Err(NetError::MalformedMessage("trailing bits"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_fields_across_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0b1111, 4);
        writer.write_bool(true);
        writer.write_bits(0xABCD, 16);
        assert_eq!(writer.byte_len(), 3);

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1111);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_bits(16).unwrap(), 0xABCD);
        reader.finish().unwrap();
    }

    #[test]
    fn full_width_values() {
        let mut writer = BitWriter::new();
        writer.write_bits(u32::MAX, 32);
        writer.write_bits(7, 3);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 5);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(32).unwrap(), u32::MAX);
        assert_eq!(reader.read_bits(3).unwrap(), 7);
        reader.finish().unwrap();
    }

    #[test]
    fn truncated_read_fails() {
        let mut reader = BitReader::new(&[0xFF]);
        assert!(matches!(
            reader.read_bits(9),
            Err(NetError::MalformedMessage("truncated"))
        ));
    }

    #[test]
    fn finish_rejects_leftovers() {
        let mut reader = BitReader::new(&[0x01, 0x00]);
        reader.read_bits(1).unwrap();
        assert!(reader.finish().is_err());

        let mut reader = BitReader::new(&[0b0000_0011]);
        reader.read_bits(1).unwrap();
        assert!(reader.finish().is_err());
    }

    #[test]
    fn padding_must_be_zero() {
        let mut writer = BitWriter::new();
        writer.write_padding(70);
        assert_eq!(writer.bits_written(), 70);
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        reader.read_padding(70).unwrap();
        reader.finish().unwrap();

        let mut reader = BitReader::new(&[0x00, 0x10]);
        assert!(reader.read_padding(16).is_err());
    }
}
