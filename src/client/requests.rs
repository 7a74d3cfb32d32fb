use scursor::{ReadCursor, WriteCursor};

use crate::common::frame::Frame;
use crate::common::function::FunctionCode;
use crate::common::traits::{Parse, Serialize};
use crate::error::{AduParseError, InvalidRange, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{AddressRange, BitIterator, RegisterIterator};

/// Validate the echoed function code, turning an exception reply into the
/// matching error
pub(crate) fn expect_function(
    cursor: &mut ReadCursor,
    function: FunctionCode,
) -> Result<(), RequestError> {
    let received = cursor.read_u8()?;
    if received == function.get_value() {
        return Ok(());
    }
    if received == function.as_error() {
        let code = cursor.read_u8()?;
        return Err(exception_reply(code));
    }
    Err(AduParseError::UnknownResponseFunction(
        received,
        function.get_value(),
        function.as_error(),
    )
    .into())
}

pub(crate) fn exception_reply(code: u8) -> RequestError {
    match ExceptionCode::get(code) {
        Some(ex) => RequestError::Exception(ex),
        None => AduParseError::UnknownExceptionCode(code).into(),
    }
}

pub(crate) fn parse_bits_reply<'a>(
    function: FunctionCode,
    reply: &'a Frame,
    range: AddressRange,
) -> Result<BitIterator<'a>, RequestError> {
    let mut cursor = ReadCursor::new(reply.payload());
    expect_function(&mut cursor, function)?;

    let byte_count = cursor.read_u8()? as usize;
    let expected = crate::common::bits::num_bytes_for_bits(range.count);
    if byte_count != expected {
        return Err(AduParseError::RequestByteCountMismatch(expected, byte_count).into());
    }

    BitIterator::parse_all(range, &mut cursor)
}

pub(crate) fn parse_registers_reply<'a>(
    function: FunctionCode,
    reply: &'a Frame,
    range: AddressRange,
) -> Result<RegisterIterator<'a>, RequestError> {
    let mut cursor = ReadCursor::new(reply.payload());
    expect_function(&mut cursor, function)?;

    let byte_count = cursor.read_u8()? as usize;
    let expected = 2 * (range.count as usize);
    if byte_count != expected {
        return Err(AduParseError::RequestByteCountMismatch(expected, byte_count).into());
    }

    RegisterIterator::parse_all(range, &mut cursor)
}

/// Validate a reply that echoes part of the request verbatim
pub(crate) fn expect_echo<P>(
    function: FunctionCode,
    reply: &Frame,
    request: &P,
) -> Result<(), RequestError>
where
    P: Parse + PartialEq,
{
    let mut cursor = ReadCursor::new(reply.payload());
    expect_function(&mut cursor, function)?;

    let echoed = P::parse(&mut cursor)?;
    if cursor.remaining() != 0 {
        return Err(AduParseError::TrailingBytes(cursor.remaining()).into());
    }
    if &echoed != request {
        return Err(AduParseError::ReplyEchoMismatch.into());
    }
    Ok(())
}

pub(crate) fn coils_range(start: u16, values: &[bool]) -> Result<AddressRange, InvalidRange> {
    let count = count_of(values, crate::constants::limits::MAX_WRITE_COILS_COUNT)?;
    AddressRange::try_from(start, count)?.of_write_coils()
}

pub(crate) fn registers_range(start: u16, values: &[u16]) -> Result<AddressRange, InvalidRange> {
    let count = count_of(values, crate::constants::limits::MAX_WRITE_REGISTERS_COUNT)?;
    AddressRange::try_from(start, count)?.of_write_registers()
}

fn count_of<V>(values: &[V], limit: u16) -> Result<u16, InvalidRange> {
    u16::try_from(values.len())
        .map_err(|_| InvalidRange::CountTooLargeForType(u16::MAX, limit))
}

/// Write-multiple-coils request body
pub(crate) struct MultipleCoils<'a> {
    pub(crate) range: AddressRange,
    pub(crate) values: &'a [bool],
}

impl Serialize for MultipleCoils<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.range.serialize(cursor)?;
        cursor.write_u8(crate::common::bits::num_bytes_for_bits(self.range.count) as u8)?;

        let mut byte = 0u8;
        let mut bit = 0;
        for value in self.values {
            if *value {
                byte |= 1 << bit;
            }
            bit += 1;
            if bit == 8 {
                cursor.write_u8(byte)?;
                byte = 0;
                bit = 0;
            }
        }
        if bit != 0 {
            cursor.write_u8(byte)?;
        }
        Ok(())
    }
}

/// Write-multiple-registers request body
pub(crate) struct MultipleRegisters<'a> {
    pub(crate) range: AddressRange,
    pub(crate) values: &'a [u16],
}

impl Serialize for MultipleRegisters<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.range.serialize(cursor)?;
        cursor.write_u8((2 * self.values.len()) as u8)?;
        for value in self.values {
            cursor.write_u16_be(*value)?;
        }
        Ok(())
    }
}

/// Opaque PDU body passed through untouched
pub(crate) struct RawBody<'a>(pub(crate) &'a [u8]);

impl Serialize for RawBody<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        for byte in self.0 {
            cursor.write_u8(*byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::{FrameDestination, FrameHeader};
    use crate::types::Indexed;

    fn reply_frame(payload: &[u8]) -> Frame {
        let mut frame = Frame::new(FrameHeader::new_rtu_header(FrameDestination::UnitId(
            crate::types::UnitId::new(1),
        )));
        frame.set(payload);
        frame
    }

    #[test]
    fn turns_exception_reply_into_error() {
        let frame = reply_frame(&[0x83, 0x02]);
        let err = parse_registers_reply(
            FunctionCode::ReadHoldingRegisters,
            &frame,
            AddressRange::try_from(0, 1).unwrap(),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            RequestError::Exception(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn rejects_unknown_exception_code() {
        let frame = reply_frame(&[0x83, 0x09]);
        let err = parse_registers_reply(
            FunctionCode::ReadHoldingRegisters,
            &frame,
            AddressRange::try_from(0, 1).unwrap(),
        )
        .err()
        .unwrap();
        assert_eq!(err, AduParseError::UnknownExceptionCode(0x09).into());
    }

    #[test]
    fn rejects_unexpected_reply_function() {
        let frame = reply_frame(&[0x04, 0x02, 0x00, 0x01]);
        let err = parse_registers_reply(
            FunctionCode::ReadHoldingRegisters,
            &frame,
            AddressRange::try_from(0, 1).unwrap(),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            AduParseError::UnknownResponseFunction(0x04, 0x03, 0x83).into()
        );
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        let frame = reply_frame(&[0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
        let err = parse_registers_reply(
            FunctionCode::ReadHoldingRegisters,
            &frame,
            AddressRange::try_from(0, 1).unwrap(),
        )
        .err()
        .unwrap();
        assert_eq!(err, AduParseError::RequestByteCountMismatch(2, 4).into());
    }

    #[test]
    fn parses_register_values_from_reply() {
        let frame = reply_frame(&[0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        let values: Vec<Indexed<u16>> = parse_registers_reply(
            FunctionCode::ReadHoldingRegisters,
            &frame,
            AddressRange::try_from(0, 2).unwrap(),
        )
        .unwrap()
        .collect();
        assert_eq!(values, vec![Indexed::new(0, 10), Indexed::new(1, 258)]);
    }

    #[test]
    fn parses_packed_bits_from_reply() {
        let frame = reply_frame(&[0x01, 0x01, 0x05]);
        let values: Vec<Indexed<bool>> = parse_bits_reply(
            FunctionCode::ReadCoils,
            &frame,
            AddressRange::try_from(0, 3).unwrap(),
        )
        .unwrap()
        .collect();
        assert_eq!(
            values,
            vec![
                Indexed::new(0, true),
                Indexed::new(1, false),
                Indexed::new(2, true)
            ]
        );
    }

    #[test]
    fn detects_echo_mismatch() {
        let frame = reply_frame(&[0x06, 0x00, 0x01, 0x00, 0xFF]);
        let err = expect_echo(
            FunctionCode::WriteSingleRegister,
            &frame,
            &Indexed::new(1, 0x00FEu16),
        )
        .err()
        .unwrap();
        assert_eq!(err, AduParseError::ReplyEchoMismatch.into());
    }

    #[test]
    fn accepts_exact_echo() {
        let frame = reply_frame(&[0x06, 0x00, 0x01, 0x00, 0xFF]);
        expect_echo(
            FunctionCode::WriteSingleRegister,
            &frame,
            &Indexed::new(1, 0x00FFu16),
        )
        .unwrap();
    }

    #[test]
    fn packs_coil_request_bits_lsb_first() {
        let request = MultipleCoils {
            range: AddressRange::try_from(0, 10).unwrap(),
            values: &[
                true, false, true, false, false, false, false, false, true, true,
            ],
        };
        let mut buffer = [0u8; 16];
        let mut cursor = WriteCursor::new(&mut buffer);
        request.serialize(&mut cursor).unwrap();
        let end = cursor.position();
        assert_eq!(
            &buffer[..end],
            &[0x00, 0x00, 0x00, 0x0A, 0x02, 0x05, 0x03]
        );
    }
}
