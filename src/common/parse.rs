use scursor::ReadCursor;

use crate::common::traits::Parse;
use crate::error::RequestError;
use crate::types::{coil_from_u16, AddressRange, Indexed};

impl Parse for AddressRange {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        let start = cursor.read_u16_be()?;
        let count = cursor.read_u16_be()?;
        Ok(AddressRange::try_from(start, count)?)
    }
}

impl Parse for Indexed<bool> {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        let index = cursor.read_u16_be()?;
        let state = coil_from_u16(cursor.read_u16_be()?)?;
        Ok(Indexed::new(index, state))
    }
}

impl Parse for Indexed<u16> {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        let index = cursor.read_u16_be()?;
        let value = cursor.read_u16_be()?;
        Ok(Indexed::new(index, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AduParseError;

    #[test]
    fn coil_write_body_accepts_only_the_two_defined_states() {
        let mut on = ReadCursor::new(&[0x00, 0xAC, 0xFF, 0x00]);
        assert_eq!(
            Indexed::<bool>::parse(&mut on),
            Ok(Indexed::new(0x00AC, true))
        );

        let mut off = ReadCursor::new(&[0x00, 0xAC, 0x00, 0x00]);
        assert_eq!(
            Indexed::<bool>::parse(&mut off),
            Ok(Indexed::new(0x00AC, false))
        );

        let mut bogus = ReadCursor::new(&[0x00, 0xAC, 0x12, 0x34]);
        assert_eq!(
            Indexed::<bool>::parse(&mut bogus),
            Err(AduParseError::UnknownCoilState(0x1234).into())
        );
    }

    #[test]
    fn register_write_body_decodes_big_endian() {
        let mut cursor = ReadCursor::new(&[0x00, 0x07, 0x0B, 0xAD]);
        assert_eq!(
            Indexed::<u16>::parse(&mut cursor),
            Ok(Indexed::new(7, 0x0BAD))
        );
    }

    #[test]
    fn range_body_is_validated_during_decode() {
        let mut zero = ReadCursor::new(&[0x00, 0x40, 0x00, 0x00]);
        assert_eq!(
            AddressRange::parse(&mut zero),
            Err(crate::error::InvalidRange::CountOfZero.into())
        );

        let mut overflowing = ReadCursor::new(&[0xFF, 0xFE, 0x00, 0x03]);
        assert_eq!(
            AddressRange::parse(&mut overflowing),
            Err(crate::error::InvalidRange::AddressOverflow(0xFFFE, 3).into())
        );

        let mut valid = ReadCursor::new(&[0x00, 0x40, 0x00, 0x08]);
        assert_eq!(
            AddressRange::parse(&mut valid),
            Ok(AddressRange::try_from(0x40, 8).unwrap())
        );
    }

    #[test]
    fn truncated_bodies_are_rejected() {
        let mut cursor = ReadCursor::new(&[0x00, 0x07, 0x0B]);
        assert_eq!(
            Indexed::<u16>::parse(&mut cursor),
            Err(AduParseError::InsufficientBytes.into())
        );
    }
}
