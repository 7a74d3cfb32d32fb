use scursor::WriteCursor;

use crate::common::buffer::ReadBuffer;
use crate::common::frame::{Frame, FrameDestination, FrameHeader, FunctionField, TxId};
use crate::common::traits::Serialize;
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    // the length field counts the unit identifier, so it can exceed the PDU
    // limit by exactly one
    pub(crate) const MAX_LENGTH_FIELD: usize = crate::common::frame::constants::MAX_ADU_LENGTH + 1;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MbapHeader {
    tx_id: TxId,
    len_field: u16,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    /// waiting for the seven header bytes
    Header,
    /// header decoded, waiting for this many ADU bytes
    Body(MbapHeader, usize),
}

pub(crate) struct MbapParser {
    state: ParseState,
}

impl MbapParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Header,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = ParseState::Header;
    }

    fn decode_header(cursor: &mut ReadBuffer) -> Result<(MbapHeader, usize), RequestError> {
        let tx_id = TxId::new(cursor.read_u16_be()?);

        let protocol_id = cursor.read_u16_be()?;
        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        let len_field = cursor.read_u16_be()?;
        let unit_id = UnitId::new(cursor.read_u8()?);

        if len_field as usize > constants::MAX_LENGTH_FIELD {
            return Err(FrameParseError::FrameLengthTooBig(
                len_field as usize,
                constants::MAX_LENGTH_FIELD,
            )
            .into());
        }

        // the unit identifier already consumed one count, the rest is the ADU
        let adu_length = (len_field as usize)
            .checked_sub(1)
            .ok_or(FrameParseError::MbapLengthZero)?;

        let header = MbapHeader {
            tx_id,
            len_field,
            unit_id,
        };
        Ok((header, adu_length))
    }

    pub(crate) fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        decode_level: FrameDecodeLevel,
    ) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Header => {
                if cursor.len() < constants::HEADER_LENGTH {
                    return Ok(None);
                }

                let (header, adu_length) = Self::decode_header(cursor)?;
                self.state = ParseState::Body(header, adu_length);
                self.parse(cursor, decode_level)
            }
            ParseState::Body(header, adu_length) => {
                if cursor.len() < adu_length {
                    return Ok(None);
                }

                let mut frame = Frame::new(FrameHeader::new_tcp_header(
                    FrameDestination::UnitId(header.unit_id),
                    header.tx_id,
                ));
                frame.set(cursor.read(adu_length)?);
                self.state = ParseState::Header;

                if decode_level.enabled() {
                    tracing::info!(
                        "MBAP RX - {}",
                        MbapDisplay::new(decode_level, header, frame.payload())
                    );
                }

                Ok(Some(frame))
            }
        }
    }
}

pub(crate) fn format_mbap(
    buffer: &mut [u8; crate::common::frame::constants::MAX_BUFFER_LENGTH],
    header: FrameHeader,
    function: FunctionField,
    body: &dyn Serialize,
    decode: DecodeLevel,
) -> Result<usize, RequestError> {
    let tx_id = header.tx_id.ok_or(InternalError::MissingTransactionId)?;
    let unit_id = header.destination.value();

    let mut cursor = WriteCursor::new(buffer.as_mut());

    cursor.write_u16_be(tx_id.to_u16())?;
    cursor.write_u16_be(0)?; // protocol id
    let length_position = cursor.position();
    cursor.skip(2)?; // patched once the PDU size is known
    cursor.write_u8(unit_id)?;

    let pdu_start = cursor.position();
    cursor.write_u8(function.get_value())?;
    body.serialize(&mut cursor)?;
    let pdu_end = cursor.position();

    // unit identifier plus PDU
    let len_field = (pdu_end - pdu_start + 1) as u16;
    cursor.seek_to(length_position)?;
    cursor.write_u16_be(len_field)?;
    cursor.seek_to(pdu_end)?;

    if decode.frame.enabled() {
        let mbap = MbapHeader {
            tx_id,
            len_field,
            unit_id: UnitId::new(unit_id),
        };
        tracing::info!(
            "MBAP TX - {}",
            MbapDisplay::new(decode.frame, mbap, &buffer[pdu_start..pdu_end])
        );
    }

    Ok(pdu_end)
}

pub(crate) struct MbapDisplay<'a> {
    level: FrameDecodeLevel,
    header: MbapHeader,
    bytes: &'a [u8],
}

impl<'a> MbapDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, header: MbapHeader, bytes: &'a [u8]) -> Self {
        MbapDisplay {
            level,
            header,
            bytes,
        }
    }
}

impl std::fmt::Display for MbapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {} unit: {} len: {}",
            self.header.tx_id, self.header.unit_id, self.header.len_field
        )?;
        if self.level.payload_enabled() {
            crate::phys::format_bytes(f, self.bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::function::FunctionCode;

    // write single coil to unit 0x11, tx id 9
    const COIL_FRAME: &[u8] = &[
        0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00,
    ];

    struct FixedBody(&'static [u8]);

    impl Serialize for FixedBody {
        fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
            for byte in self.0 {
                cursor.write_u8(*byte)?;
            }
            Ok(())
        }
    }

    fn feed(buffer: &mut ReadBuffer, bytes: &[u8]) {
        for byte in bytes {
            buffer.push_for_test(*byte);
        }
    }

    fn decode_one(input: &[u8]) -> Result<Option<Frame>, RequestError> {
        let mut parser = MbapParser::new();
        let mut buffer = ReadBuffer::new();
        feed(&mut buffer, input);
        parser.parse(&mut buffer, FrameDecodeLevel::Nothing)
    }

    #[test]
    fn formats_the_seven_byte_header_and_length() {
        let mut buffer = [0u8; crate::common::frame::constants::MAX_BUFFER_LENGTH];
        let written = format_mbap(
            &mut buffer,
            FrameHeader::new_tcp_header(
                FrameDestination::UnitId(UnitId::new(0x11)),
                TxId::new(9),
            ),
            FunctionField::Valid(FunctionCode::WriteSingleCoil),
            &FixedBody(&[0x00, 0xAC, 0xFF, 0x00]),
            DecodeLevel::nothing(),
        )
        .unwrap();
        assert_eq!(&buffer[..written], COIL_FRAME);
    }

    #[test]
    fn decodes_a_whole_frame() {
        let frame = decode_one(COIL_FRAME).unwrap().unwrap();
        assert_eq!(frame.header.tx_id, Some(TxId::new(9)));
        assert_eq!(
            frame.header.destination,
            FrameDestination::UnitId(UnitId::new(0x11))
        );
        assert_eq!(frame.payload(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
    }

    #[test]
    fn waits_for_missing_header_and_body_bytes() {
        let mut parser = MbapParser::new();
        let mut buffer = ReadBuffer::new();

        // three header bytes are not enough to commit to anything
        feed(&mut buffer, &COIL_FRAME[..3]);
        assert!(parser
            .parse(&mut buffer, FrameDecodeLevel::Nothing)
            .unwrap()
            .is_none());

        // the full header alone is still not a frame
        feed(&mut buffer, &COIL_FRAME[3..7]);
        assert!(parser
            .parse(&mut buffer, FrameDecodeLevel::Nothing)
            .unwrap()
            .is_none());

        feed(&mut buffer, &COIL_FRAME[7..]);
        let frame = parser
            .parse(&mut buffer, FrameDecodeLevel::Nothing)
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload(), &COIL_FRAME[7..]);
    }

    #[test]
    fn accepts_the_largest_legal_frame() {
        // length field 0xFE covers the unit id plus a 253-byte ADU
        let mut input = vec![0x00, 0x09, 0x00, 0x00, 0x00, 0xFE, 0x11];
        input.resize(input.len() + 253, 0x5A);

        let frame = decode_one(&input).unwrap().unwrap();
        assert_eq!(frame.payload().len(), 253);
        assert!(frame.payload().iter().all(|byte| *byte == 0x5A));
    }

    #[test]
    fn rejects_nonzero_protocol_id() {
        let input = [0x00, 0x09, 0x00, 0x01, 0x00, 0x06, 0x11];
        assert_eq!(
            decode_one(&input).err().unwrap(),
            RequestError::BadFrame(FrameParseError::UnknownProtocolId(1))
        );
    }

    #[test]
    fn rejects_zero_length_field() {
        let input = [0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x11];
        assert_eq!(
            decode_one(&input).err().unwrap(),
            RequestError::BadFrame(FrameParseError::MbapLengthZero)
        );
    }

    #[test]
    fn rejects_oversized_length_field() {
        let input = [0x00, 0x09, 0x00, 0x00, 0x01, 0x00, 0x11];
        assert_eq!(
            decode_one(&input).err().unwrap(),
            RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
                0x100,
                constants::MAX_LENGTH_FIELD
            ))
        );
    }
}
