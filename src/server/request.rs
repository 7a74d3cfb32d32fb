use scursor::ReadCursor;

use crate::common::frame::{FrameHeader, FrameWriter, FunctionField};
use crate::common::function::FunctionCode;
use crate::common::traits::{Parse, Serialize};
use crate::decode::{AppDecodeLevel, DecodeLevel};
use crate::error::{AduParseError, InvalidRange, RequestError};
use crate::exception::ExceptionCode;
use crate::server::handler::{HandlerError, RequestHandler};
use crate::server::response::{BitfieldReply, RegistersReply};
use crate::types::{
    AddressRange, BitIterator, Bitfield, DataValuesDisplay, Indexed, ReadBitsRange,
    ReadRegistersRange, RegisterIterator, WriteCoils, WriteRegisters,
};

#[derive(Debug)]
pub(crate) enum Request<'a> {
    ReadCoils(ReadBitsRange),
    ReadDiscreteInputs(ReadBitsRange),
    ReadHoldingRegisters(ReadRegistersRange),
    ReadInputRegisters(ReadRegistersRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(WriteCoils<'a>),
    WriteMultipleRegisters(WriteRegisters<'a>),
}

/// The subset of requests a server acts on under broadcast: the four writes.
/// Reads have no broadcast form since nothing may answer.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub(crate) enum BroadcastRequest<'a> {
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(WriteCoils<'a>),
    WriteMultipleRegisters(WriteRegisters<'a>),
}

impl BroadcastRequest<'_> {
    /// Run the write against the handler. The outcome is dropped: under
    /// broadcast there is no reply channel, not even for exceptions.
    pub(crate) fn dispatch(self, handler: &mut dyn RequestHandler) {
        let _ = match self {
            BroadcastRequest::WriteSingleCoil(value) => handler.write_single_coil(value),
            BroadcastRequest::WriteSingleRegister(value) => handler.write_single_register(value),
            BroadcastRequest::WriteMultipleCoils(values) => handler.write_multiple_coils(values),
            BroadcastRequest::WriteMultipleRegisters(values) => {
                handler.write_multiple_registers(values)
            }
        };
    }
}

impl<'a> Request<'a> {
    pub(crate) fn get_function(&self) -> FunctionCode {
        match self {
            Request::ReadCoils(_) => FunctionCode::ReadCoils,
            Request::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Request::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Request::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Request::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Request::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Request::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub(crate) fn into_broadcast_request(self) -> Option<BroadcastRequest<'a>> {
        match self {
            Request::WriteSingleCoil(value) => Some(BroadcastRequest::WriteSingleCoil(value)),
            Request::WriteSingleRegister(value) => {
                Some(BroadcastRequest::WriteSingleRegister(value))
            }
            Request::WriteMultipleCoils(values) => {
                Some(BroadcastRequest::WriteMultipleCoils(values))
            }
            Request::WriteMultipleRegisters(values) => {
                Some(BroadcastRequest::WriteMultipleRegisters(values))
            }
            _ => None,
        }
    }

    pub(crate) fn get_reply<'b>(
        &self,
        header: FrameHeader,
        handler: &mut dyn RequestHandler,
        writer: &'b mut FrameWriter,
        level: DecodeLevel,
    ) -> Result<&'b [u8], RequestError> {
        fn write_result<'b, B>(
            function: FunctionCode,
            header: FrameHeader,
            writer: &'b mut FrameWriter,
            result: Result<B, HandlerError>,
            level: DecodeLevel,
        ) -> Result<&'b [u8], RequestError>
        where
            B: Serialize,
        {
            match result {
                Ok(body) => writer.format(header, FunctionField::Valid(function), &body, level),
                Err(HandlerError::Exception(ex)) => {
                    writer.format(header, FunctionField::Exception(function), &ex, level)
                }
                Err(HandlerError::Abort) => Err(RequestError::Aborted),
            }
        }

        let function = self.get_function();

        match self {
            Request::ReadCoils(range) => {
                let mut bits = Bitfield::new();
                let result = handler.read_coils(range.get(), &mut bits);
                let count = range.get().count;
                write_result(
                    function,
                    header,
                    writer,
                    result.map(|_| BitfieldReply::new(count, &bits)),
                    level,
                )
            }
            Request::ReadDiscreteInputs(range) => {
                let mut bits = Bitfield::new();
                let result = handler.read_discrete_inputs(range.get(), &mut bits);
                let count = range.get().count;
                write_result(
                    function,
                    header,
                    writer,
                    result.map(|_| BitfieldReply::new(count, &bits)),
                    level,
                )
            }
            Request::ReadHoldingRegisters(range) => {
                let mut registers =
                    [0u16; crate::constants::limits::MAX_READ_REGISTERS_COUNT as usize];
                let count = range.get().count as usize;
                let result = handler.read_holding_registers(range.get(), &mut registers[..count]);
                write_result(
                    function,
                    header,
                    writer,
                    result.map(|_| RegistersReply::new(&registers[..count])),
                    level,
                )
            }
            Request::ReadInputRegisters(range) => {
                let mut registers =
                    [0u16; crate::constants::limits::MAX_READ_REGISTERS_COUNT as usize];
                let count = range.get().count as usize;
                let result = handler.read_input_registers(range.get(), &mut registers[..count]);
                write_result(
                    function,
                    header,
                    writer,
                    result.map(|_| RegistersReply::new(&registers[..count])),
                    level,
                )
            }
            Request::WriteSingleCoil(value) => {
                let result = handler.write_single_coil(*value);
                write_result(function, header, writer, result.map(|_| *value), level)
            }
            Request::WriteSingleRegister(value) => {
                let result = handler.write_single_register(*value);
                write_result(function, header, writer, result.map(|_| *value), level)
            }
            Request::WriteMultipleCoils(values) => {
                let result = handler.write_multiple_coils(*values);
                write_result(function, header, writer, result.map(|_| values.range), level)
            }
            Request::WriteMultipleRegisters(values) => {
                let result = handler.write_multiple_registers(*values);
                write_result(function, header, writer, result.map(|_| values.range), level)
            }
        }
    }

    pub(crate) fn parse(
        function: FunctionCode,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        fn expect_empty(cursor: &ReadCursor) -> Result<(), RequestError> {
            if cursor.remaining() != 0 {
                return Err(AduParseError::TrailingBytes(cursor.remaining()).into());
            }
            Ok(())
        }

        match function {
            FunctionCode::ReadCoils => {
                let range = AddressRange::parse(cursor)?.of_read_bits()?;
                expect_empty(cursor)?;
                Ok(Request::ReadCoils(range))
            }
            FunctionCode::ReadDiscreteInputs => {
                let range = AddressRange::parse(cursor)?.of_read_bits()?;
                expect_empty(cursor)?;
                Ok(Request::ReadDiscreteInputs(range))
            }
            FunctionCode::ReadHoldingRegisters => {
                let range = AddressRange::parse(cursor)?.of_read_registers()?;
                expect_empty(cursor)?;
                Ok(Request::ReadHoldingRegisters(range))
            }
            FunctionCode::ReadInputRegisters => {
                let range = AddressRange::parse(cursor)?.of_read_registers()?;
                expect_empty(cursor)?;
                Ok(Request::ReadInputRegisters(range))
            }
            FunctionCode::WriteSingleCoil => {
                let value = Indexed::<bool>::parse(cursor)?;
                expect_empty(cursor)?;
                Ok(Request::WriteSingleCoil(value))
            }
            FunctionCode::WriteSingleRegister => {
                let value = Indexed::<u16>::parse(cursor)?;
                expect_empty(cursor)?;
                Ok(Request::WriteSingleRegister(value))
            }
            FunctionCode::WriteMultipleCoils => {
                let range = AddressRange::parse(cursor)?.of_write_coils()?;
                let byte_count = cursor.read_u8()? as usize;
                let expected = crate::common::bits::num_bytes_for_bits(range.count);
                if byte_count != expected {
                    return Err(
                        AduParseError::RequestByteCountMismatch(expected, byte_count).into()
                    );
                }
                Ok(Request::WriteMultipleCoils(WriteCoils::new(
                    range,
                    BitIterator::parse_all(range, cursor)?,
                )))
            }
            FunctionCode::WriteMultipleRegisters => {
                let range = AddressRange::parse(cursor)?.of_write_registers()?;
                let byte_count = cursor.read_u8()? as usize;
                let expected = 2 * (range.count as usize);
                if byte_count != expected {
                    return Err(
                        AduParseError::RequestByteCountMismatch(expected, byte_count).into()
                    );
                }
                Ok(Request::WriteMultipleRegisters(WriteRegisters::new(
                    range,
                    RegisterIterator::parse_all(range, cursor)?,
                )))
            }
        }
    }
}

/// Map a request-parse failure to the exception answered on the wire.
///
/// Range violations echo the standard's split between address and value
/// errors; anything else is not answerable and propagates to the caller.
pub(crate) fn exception_for_request_error(err: &RequestError) -> Option<ExceptionCode> {
    match err {
        RequestError::BadArgument(InvalidRange::AddressOverflow(_, _)) => {
            Some(ExceptionCode::IllegalDataAddress)
        }
        RequestError::BadArgument(_) => Some(ExceptionCode::IllegalDataValue),
        RequestError::BadResponse(_) => Some(ExceptionCode::IllegalDataValue),
        _ => None,
    }
}

pub(crate) struct RequestDisplay<'a, 'b> {
    request: &'a Request<'b>,
    level: AppDecodeLevel,
}

impl<'a, 'b> RequestDisplay<'a, 'b> {
    pub(crate) fn new(level: AppDecodeLevel, request: &'a Request<'b>) -> Self {
        Self { request, level }
    }
}

impl std::fmt::Display for RequestDisplay<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.request.get_function())?;

        if !self.level.data_headers() {
            return Ok(());
        }

        match self.request {
            Request::ReadCoils(range) | Request::ReadDiscreteInputs(range) => {
                write!(f, " {}", range.get())
            }
            Request::ReadHoldingRegisters(range) | Request::ReadInputRegisters(range) => {
                write!(f, " {}", range.get())
            }
            Request::WriteSingleCoil(value) => write!(f, " {value}"),
            Request::WriteSingleRegister(value) => write!(f, " {value}"),
            Request::WriteMultipleCoils(values) => {
                write!(
                    f,
                    " {}",
                    DataValuesDisplay::new(self.level, values.range, values.iterator)
                )
            }
            Request::WriteMultipleRegisters(values) => {
                write!(
                    f,
                    " {}",
                    DataValuesDisplay::new(self.level, values.range, values.iterator)
                )
            }
        }
    }
}
