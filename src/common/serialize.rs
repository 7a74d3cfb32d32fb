use scursor::WriteCursor;

use crate::common::traits::Serialize;
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::types::{coil_to_u16, AddressRange, Indexed};

impl Serialize for AddressRange {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.start)?;
        cursor.write_u16_be(self.count)?;
        Ok(())
    }
}

impl Serialize for Indexed<bool> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(coil_to_u16(self.value))?;
        Ok(())
    }
}

impl Serialize for Indexed<u16> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(self.value)?;
        Ok(())
    }
}

impl Serialize for ExceptionCode {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u8((*self).into())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize_to_vec(item: &dyn Serialize) -> Vec<u8> {
        let mut buffer = [0u8; 16];
        let mut cursor = WriteCursor::new(&mut buffer);
        item.serialize(&mut cursor).unwrap();
        let end = cursor.position();
        buffer[..end].to_vec()
    }

    #[test]
    fn serializes_address_range_big_endian() {
        let range = AddressRange::try_from(0x0102, 0x0304).unwrap();
        assert_eq!(serialize_to_vec(&range), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn serializes_coil_states_as_defined_constants() {
        assert_eq!(
            serialize_to_vec(&Indexed::new(0x00AC, true)),
            vec![0x00, 0xAC, 0xFF, 0x00]
        );
        assert_eq!(
            serialize_to_vec(&Indexed::new(0x00AC, false)),
            vec![0x00, 0xAC, 0x00, 0x00]
        );
    }

    #[test]
    fn serializes_exception_code_as_single_byte() {
        assert_eq!(
            serialize_to_vec(&ExceptionCode::IllegalDataAddress),
            vec![0x02]
        );
    }
}
