use scursor::WriteCursor;

use crate::common::buffer::ReadBuffer;
use crate::common::frame::{Frame, FrameDestination, FrameHeader, FunctionField};
use crate::common::function::FunctionCode;
use crate::common::traits::Serialize;
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, RequestError};

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    pub(crate) const CRC_LENGTH: usize = 2;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH + CRC_LENGTH;
}

/// CRC-16/MODBUS over the unit identifier and the PDU that follows it
pub(crate) fn crc16(unit_id: u8, pdu: &[u8]) -> u16 {
    let crc = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);
    let mut digest = crc.digest();
    digest.update(&[unit_id]);
    digest.update(pdu);
    digest.finalize()
}

#[derive(Clone, Copy)]
enum ParserType {
    Request,
    Response,
}

#[derive(Clone, Copy)]
enum ParseState {
    /// waiting for the unit id and the function code
    Address,
    /// a count-carrying body: wait for the byte at this offset, it holds how
    /// much follows (unit id, offset)
    AwaitLengthByte(u8, usize),
    /// body size known, wait for it plus the CRC (unit id, body length)
    AwaitBody(u8, usize),
}

/// Body length of an RTU frame, derived from its function code
#[derive(Clone, Copy)]
enum LengthMode {
    /// body size is a constant of the function code
    Fixed(usize),
    /// a length byte at this offset gives the rest
    Offset(usize),
    /// no way to size the frame
    Unknown,
}

pub(crate) struct RtuParser {
    state: ParseState,
    parser_type: ParserType,
}

impl RtuParser {
    pub(crate) fn new_request_parser() -> Self {
        Self {
            state: ParseState::Address,
            parser_type: ParserType::Request,
        }
    }

    pub(crate) fn new_response_parser() -> Self {
        Self {
            state: ParseState::Address,
            parser_type: ParserType::Response,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = ParseState::Address;
    }

    fn length_mode(&self, raw_function_code: u8) -> LengthMode {
        // replies may carry the exception form, requests never do
        if matches!(self.parser_type, ParserType::Response) && raw_function_code & 0x80 != 0 {
            return LengthMode::Fixed(1);
        }

        let function = match FunctionCode::get(raw_function_code) {
            Some(function) => function,
            None => return LengthMode::Unknown,
        };

        match self.parser_type {
            // every request is addr+qty or addr+value, except the two
            // multi-writes which append a length byte and a payload
            ParserType::Request => match function {
                FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
                    LengthMode::Offset(5)
                }
                _ => LengthMode::Fixed(4),
            },
            // read replies lead with a byte count, write replies echo four
            // bytes of the request
            ParserType::Response => match function {
                FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters => LengthMode::Offset(1),
                _ => LengthMode::Fixed(4),
            },
        }
    }

    pub(crate) fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        decode_level: FrameDecodeLevel,
    ) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Address => {
                if cursor.len() < 2 {
                    return Ok(None);
                }

                let unit_id = cursor.read_u8()?;
                // the function code stays in the buffer so the frame can be
                // copied out in one piece later
                let raw_function_code = cursor.peek_at(0)?;

                self.state = match self.length_mode(raw_function_code) {
                    LengthMode::Fixed(length) => ParseState::AwaitBody(unit_id, length),
                    LengthMode::Offset(offset) => ParseState::AwaitLengthByte(unit_id, offset),
                    LengthMode::Unknown => {
                        return Err(RequestError::BadFrame(
                            FrameParseError::UnknownFunctionCode(raw_function_code),
                        ))
                    }
                };

                self.parse(cursor, decode_level)
            }
            ParseState::AwaitLengthByte(unit_id, offset) => {
                if cursor.len() < constants::FUNCTION_CODE_LENGTH + offset {
                    return Ok(None);
                }

                let remainder =
                    cursor.peek_at(constants::FUNCTION_CODE_LENGTH + offset - 1)? as usize;
                self.state = ParseState::AwaitBody(unit_id, offset + remainder);

                self.parse(cursor, decode_level)
            }
            ParseState::AwaitBody(unit_id, length) => {
                let pdu_length = constants::FUNCTION_CODE_LENGTH + length;
                if pdu_length > crate::common::frame::constants::MAX_ADU_LENGTH {
                    return Err(RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
                        pdu_length,
                        crate::common::frame::constants::MAX_ADU_LENGTH,
                    )));
                }

                if cursor.len() < pdu_length + constants::CRC_LENGTH {
                    return Ok(None);
                }

                let mut frame = Frame::new(FrameHeader::new_rtu_header(
                    FrameDestination::from_rtu_address(unit_id),
                ));
                frame.set(cursor.read(pdu_length)?);

                let received_crc = cursor.read_u16_le()?;
                let expected_crc = crc16(unit_id, frame.payload());
                if received_crc != expected_crc {
                    return Err(RequestError::BadFrame(
                        FrameParseError::CrcValidationFailure(received_crc, expected_crc),
                    ));
                }

                if decode_level.enabled() {
                    tracing::info!(
                        "RTU RX - {}",
                        RtuDisplay::new(
                            decode_level,
                            frame.header.destination,
                            frame.payload(),
                            received_crc
                        )
                    );
                }

                self.state = ParseState::Address;
                Ok(Some(frame))
            }
        }
    }
}

pub(crate) fn format_rtu(
    buffer: &mut [u8; crate::common::frame::constants::MAX_BUFFER_LENGTH],
    header: FrameHeader,
    function: FunctionField,
    body: &dyn Serialize,
    decode: DecodeLevel,
) -> Result<usize, RequestError> {
    let end_position = {
        let mut cursor = WriteCursor::new(buffer.as_mut());
        cursor.write_u8(header.destination.value())?;
        cursor.write_u8(function.get_value())?;
        body.serialize(&mut cursor)?;
        cursor.position()
    };

    if end_position > constants::MAX_FRAME_LENGTH - constants::CRC_LENGTH {
        return Err(RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
            end_position,
            constants::MAX_FRAME_LENGTH - constants::CRC_LENGTH,
        )));
    }

    let crc = crc16(
        header.destination.value(),
        &buffer[constants::HEADER_LENGTH..end_position],
    );

    {
        let mut cursor = WriteCursor::new(buffer.as_mut());
        cursor.seek_to(end_position)?;
        cursor.write_u16_le(crc)?;
    }

    if decode.frame.enabled() {
        tracing::info!(
            "RTU TX - {}",
            RtuDisplay::new(
                decode.frame,
                header.destination,
                &buffer[constants::HEADER_LENGTH..end_position],
                crc
            )
        );
    }

    Ok(end_position + constants::CRC_LENGTH)
}

struct RtuDisplay<'a> {
    level: FrameDecodeLevel,
    destination: FrameDestination,
    data: &'a [u8],
    crc: u16,
}

impl<'a> RtuDisplay<'a> {
    fn new(
        level: FrameDecodeLevel,
        destination: FrameDestination,
        data: &'a [u8],
        crc: u16,
    ) -> Self {
        RtuDisplay {
            level,
            destination,
            data,
            crc,
        }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "address: {} crc: {:#06X} (len = {})",
            self.destination,
            self.crc,
            self.data.len(),
        )?;
        if self.level.payload_enabled() {
            crate::phys::format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitId;

    // read holding registers: unit 1, start 0, qty 2
    const READ_REGISTERS_REQUEST: &[u8] = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];

    struct FixedBody(&'static [u8]);

    impl Serialize for FixedBody {
        fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
            for byte in self.0 {
                cursor.write_u8(*byte)?;
            }
            Ok(())
        }
    }

    fn frame_up(pdu_with_unit: &[u8]) -> Vec<u8> {
        let mut message = pdu_with_unit.to_vec();
        let crc = crc16(pdu_with_unit[0], &pdu_with_unit[1..]);
        message.extend_from_slice(&crc.to_le_bytes());
        message
    }

    fn parse_one(parser: &mut RtuParser, input: &[u8]) -> Result<Option<Frame>, RequestError> {
        let mut buffer = ReadBuffer::new();
        for byte in input {
            buffer.push_for_test(*byte);
        }
        parser.parse(&mut buffer, FrameDecodeLevel::Nothing)
    }

    #[test]
    fn crc_of_reference_message_matches_known_value() {
        assert_eq!(crc16(0x01, &[0x03, 0x00, 0x00, 0x00, 0x0A]), 0xC5CD);
    }

    #[test]
    fn formats_read_registers_request() {
        let mut buffer = [0u8; crate::common::frame::constants::MAX_BUFFER_LENGTH];
        let length = format_rtu(
            &mut buffer,
            FrameHeader::new_rtu_header(FrameDestination::UnitId(UnitId::new(1))),
            FunctionField::Valid(FunctionCode::ReadHoldingRegisters),
            &FixedBody(&[0x00, 0x00, 0x00, 0x02]),
            DecodeLevel::nothing(),
        )
        .unwrap();
        assert_eq!(&buffer[..length], READ_REGISTERS_REQUEST);
    }

    #[test]
    fn parses_request_frame_and_validates_crc() {
        let mut parser = RtuParser::new_request_parser();
        let frame = parse_one(&mut parser, READ_REGISTERS_REQUEST)
            .unwrap()
            .unwrap();
        assert_eq!(
            frame.header,
            FrameHeader::new_rtu_header(FrameDestination::UnitId(UnitId::new(1)))
        );
        assert_eq!(frame.payload(), &[0x03, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn parses_broadcast_destination() {
        // write single register, unit 0
        let message = frame_up(&[0x00, 0x06, 0x00, 0x10, 0x00, 0x05]);
        let mut parser = RtuParser::new_request_parser();
        let frame = parse_one(&mut parser, &message).unwrap().unwrap();
        assert_eq!(frame.header.destination, FrameDestination::Broadcast);
    }

    #[test]
    fn parses_response_with_length_prefix() {
        // read holding registers response: unit 1, 4 bytes, [0x000A, 0x0102]
        let message = frame_up(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        let mut parser = RtuParser::new_response_parser();
        let frame = parse_one(&mut parser, &message).unwrap().unwrap();
        assert_eq!(frame.payload(), &[0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
    }

    #[test]
    fn parses_exception_response_with_single_byte_body() {
        let message = frame_up(&[0x01, 0x83, 0x02]);
        let mut parser = RtuParser::new_response_parser();
        let frame = parse_one(&mut parser, &message).unwrap().unwrap();
        assert_eq!(frame.payload(), &[0x83, 0x02]);
    }

    #[test]
    fn rejects_corrupted_crc() {
        let mut message = READ_REGISTERS_REQUEST.to_vec();
        *message.last_mut().unwrap() ^= 0x01;

        let mut parser = RtuParser::new_request_parser();
        let err = parse_one(&mut parser, &message).err().unwrap();
        assert!(matches!(
            err,
            RequestError::BadFrame(FrameParseError::CrcValidationFailure(_, 0x0BC4))
        ));
    }

    #[test]
    fn rejects_unknown_function_code() {
        let mut parser = RtuParser::new_request_parser();
        let err = parse_one(&mut parser, &[0x01, 0x2B, 0x00, 0x00])
            .err()
            .unwrap();
        assert_eq!(
            err,
            RequestError::BadFrame(FrameParseError::UnknownFunctionCode(0x2B))
        );
    }

    #[test]
    fn request_parser_rejects_exception_function_codes() {
        let mut parser = RtuParser::new_request_parser();
        let err = parse_one(&mut parser, &[0x01, 0x83, 0x02]).err().unwrap();
        assert_eq!(
            err,
            RequestError::BadFrame(FrameParseError::UnknownFunctionCode(0x83))
        );
    }
}
