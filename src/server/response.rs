use scursor::WriteCursor;

use crate::common::traits::Serialize;
use crate::error::RequestError;
use crate::types::Bitfield;

/// Read-bits reply: byte count followed by the packed values
pub(crate) struct BitfieldReply<'a> {
    count: u16,
    bits: &'a Bitfield,
}

impl<'a> BitfieldReply<'a> {
    pub(crate) fn new(count: u16, bits: &'a Bitfield) -> Self {
        Self { count, bits }
    }
}

impl Serialize for BitfieldReply<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        let byte_count = crate::common::bits::num_bytes_for_bits(self.count);
        cursor.write_u8(byte_count as u8)?;
        for byte in &self.bits.as_bytes()[..byte_count] {
            cursor.write_u8(*byte)?;
        }
        Ok(())
    }
}

/// Read-registers reply: byte count followed by the big-endian values
pub(crate) struct RegistersReply<'a> {
    registers: &'a [u16],
}

impl<'a> RegistersReply<'a> {
    pub(crate) fn new(registers: &'a [u16]) -> Self {
        Self { registers }
    }
}

impl Serialize for RegistersReply<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u8((2 * self.registers.len()) as u8)?;
        for value in self.registers {
            cursor.write_u16_be(*value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize_to_vec(item: &dyn Serialize) -> Vec<u8> {
        let mut buffer = [0u8; 64];
        let mut cursor = WriteCursor::new(&mut buffer);
        item.serialize(&mut cursor).unwrap();
        let end = cursor.position();
        buffer[..end].to_vec()
    }

    #[test]
    fn packs_bitfield_reply_with_byte_count() {
        let mut bits = Bitfield::new();
        bits.set(0, true);
        bits.set(2, true);
        bits.set(8, true);
        let reply = BitfieldReply::new(10, &bits);
        assert_eq!(serialize_to_vec(&reply), vec![0x02, 0x05, 0x01]);
    }

    #[test]
    fn writes_registers_reply_big_endian() {
        let registers = [0x000Au16, 0x0102];
        let reply = RegistersReply::new(&registers);
        assert_eq!(serialize_to_vec(&reply), vec![0x04, 0x00, 0x0A, 0x01, 0x02]);
    }
}
