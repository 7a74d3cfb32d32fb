use crate::common::buffer::ReadBuffer;
use crate::common::function::FunctionCode;
use crate::common::traits::Serialize;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::phys::{Deadline, PhysLayer, Timeouts, Transport};
use crate::serial::frame::RtuParser;
use crate::tcp::frame::MbapParser;
use crate::types::UnitId;

pub(crate) mod constants {
    /// maximum PDU length: function code plus body
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
    /// scratch size covering the largest framed message (MBAP header + PDU)
    pub(crate) const MAX_BUFFER_LENGTH: usize = 260;
}

#[derive(PartialEq, Copy, Clone, Debug)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }

    pub(crate) fn next(&mut self) -> TxId {
        self.value = self.value.wrapping_add(1);
        TxId::new(self.value)
    }
}

impl Default for TxId {
    fn default() -> Self {
        TxId::new(0)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

/// Where a frame is headed: a specific unit or every RTU device on the bus
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum FrameDestination {
    UnitId(UnitId),
    Broadcast,
}

impl FrameDestination {
    pub(crate) fn from_rtu_address(value: u8) -> Self {
        if value == crate::constants::BROADCAST_ADDRESS {
            FrameDestination::Broadcast
        } else {
            FrameDestination::UnitId(UnitId::new(value))
        }
    }

    pub(crate) fn value(&self) -> u8 {
        match self {
            FrameDestination::UnitId(id) => id.value,
            FrameDestination::Broadcast => crate::constants::BROADCAST_ADDRESS,
        }
    }

    pub(crate) fn is_broadcast(&self) -> bool {
        matches!(self, FrameDestination::Broadcast)
    }
}

impl std::fmt::Display for FrameDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameDestination::UnitId(id) => write!(f, "{id}"),
            FrameDestination::Broadcast => f.write_str("BCAST"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct FrameHeader {
    pub(crate) destination: FrameDestination,
    /// transaction id, present on TCP only
    pub(crate) tx_id: Option<TxId>,
}

impl FrameHeader {
    pub(crate) fn new_tcp_header(destination: FrameDestination, tx_id: TxId) -> Self {
        FrameHeader {
            destination,
            tx_id: Some(tx_id),
        }
    }

    pub(crate) fn new_rtu_header(destination: FrameDestination) -> Self {
        FrameHeader {
            destination,
            tx_id: None,
        }
    }
}

/// One received message: addressing plus the PDU bytes
pub(crate) struct Frame {
    pub(crate) header: FrameHeader,
    length: usize,
    adu: [u8; constants::MAX_ADU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: FrameHeader) -> Frame {
        Frame {
            header,
            length: 0,
            adu: [0; constants::MAX_ADU_LENGTH],
        }
    }

    pub(crate) fn set(&mut self, src: &[u8]) -> bool {
        if src.len() > self.adu.len() {
            return false;
        }

        self.adu[0..src.len()].copy_from_slice(src);
        self.length = src.len();
        true
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.adu[0..self.length]
    }
}

/// The function-code byte of an outgoing PDU
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum FunctionField {
    Valid(FunctionCode),
    Exception(FunctionCode),
    Raw(u8),
}

impl FunctionField {
    pub(crate) fn get_value(self) -> u8 {
        match self {
            FunctionField::Valid(fc) => fc.get_value(),
            FunctionField::Exception(fc) => fc.as_error(),
            FunctionField::Raw(value) => value,
        }
    }
}

impl std::fmt::Display for FunctionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionField::Valid(fc) => write!(f, "{fc}"),
            FunctionField::Exception(fc) => write!(f, "EXCEPTION TO {fc}"),
            FunctionField::Raw(value) => write!(f, "RAW FUNCTION ({value:#04X})"),
        }
    }
}

pub(crate) enum FrameParser {
    Rtu(RtuParser),
    Mbap(MbapParser),
}

/// Pulls bytes through the transport until the parser produces one complete,
/// validated frame
pub(crate) struct FramedReader {
    parser: FrameParser,
    pub(crate) buffer: ReadBuffer,
}

impl FramedReader {
    pub(crate) fn rtu_request() -> Self {
        Self {
            parser: FrameParser::Rtu(RtuParser::new_request_parser()),
            buffer: ReadBuffer::new(),
        }
    }

    pub(crate) fn rtu_response() -> Self {
        Self {
            parser: FrameParser::Rtu(RtuParser::new_response_parser()),
            buffer: ReadBuffer::new(),
        }
    }

    pub(crate) fn tcp() -> Self {
        Self {
            parser: FrameParser::Mbap(MbapParser::new()),
            buffer: ReadBuffer::new(),
        }
    }

    pub(crate) fn next_frame<T: Transport>(
        &mut self,
        phys: &mut PhysLayer<T>,
        timeouts: Timeouts,
        decode: DecodeLevel,
    ) -> Result<Frame, RequestError> {
        // a failed exchange may have left residue behind
        self.buffer.clear();
        match &mut self.parser {
            FrameParser::Rtu(parser) => parser.reset(),
            FrameParser::Mbap(parser) => parser.reset(),
        }

        let deadline = Deadline::new(timeouts.read);
        loop {
            let parsed = match &mut self.parser {
                FrameParser::Rtu(parser) => parser.parse(&mut self.buffer, decode.frame)?,
                FrameParser::Mbap(parser) => parser.parse(&mut self.buffer, decode.frame)?,
            };
            match parsed {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer
                        .fill_one(phys, &deadline, timeouts.byte, decode.physical)?
                }
            }
        }
    }
}

#[derive(Copy, Clone)]
enum FrameKind {
    Rtu,
    Tcp,
}

/// Formats outgoing frames into an owned scratch buffer
pub(crate) struct FrameWriter {
    kind: FrameKind,
    buffer: [u8; constants::MAX_BUFFER_LENGTH],
}

impl FrameWriter {
    pub(crate) fn rtu() -> Self {
        Self {
            kind: FrameKind::Rtu,
            buffer: [0; constants::MAX_BUFFER_LENGTH],
        }
    }

    pub(crate) fn tcp() -> Self {
        Self {
            kind: FrameKind::Tcp,
            buffer: [0; constants::MAX_BUFFER_LENGTH],
        }
    }

    pub(crate) fn format(
        &mut self,
        header: FrameHeader,
        function: FunctionField,
        body: &dyn Serialize,
        decode: DecodeLevel,
    ) -> Result<&[u8], RequestError> {
        let length = match self.kind {
            FrameKind::Rtu => {
                crate::serial::frame::format_rtu(&mut self.buffer, header, function, body, decode)?
            }
            FrameKind::Tcp => {
                crate::tcp::frame::format_mbap(&mut self.buffer, header, function, body, decode)?
            }
        };
        Ok(&self.buffer[..length])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_id_increments_before_first_use() {
        let mut tx_id = TxId::default();
        assert_eq!(tx_id.next(), TxId::new(1));
        assert_eq!(tx_id.next(), TxId::new(2));
    }

    #[test]
    fn tx_id_wraps_around() {
        let mut tx_id = TxId::new(u16::MAX - 1);
        assert_eq!(tx_id.next(), TxId::new(u16::MAX));
        assert_eq!(tx_id.next(), TxId::new(0));
        assert_eq!(tx_id.next(), TxId::new(1));
    }

    #[test]
    fn unit_zero_is_the_rtu_broadcast_destination() {
        assert_eq!(
            FrameDestination::from_rtu_address(0),
            FrameDestination::Broadcast
        );
        assert_eq!(
            FrameDestination::from_rtu_address(0x2A),
            FrameDestination::UnitId(UnitId::new(0x2A))
        );
        assert!(FrameDestination::Broadcast.is_broadcast());
        assert_eq!(FrameDestination::Broadcast.value(), 0);
    }
}
