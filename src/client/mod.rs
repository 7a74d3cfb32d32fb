use std::time::Duration;

use crate::common::frame::{
    Frame, FrameDestination, FrameHeader, FramedReader, FrameWriter, FunctionField, TxId,
};
use crate::common::function::FunctionCode;
use crate::common::traits::Serialize;
use crate::decode::DecodeLevel;
use crate::error::{
    AduParseError, FrameParseError, InvalidRequest, RequestError,
};
use crate::phys::{Deadline, PhysLayer, Timeouts, Transport};
use crate::types::{AddressRange, BitIterator, Indexed, RegisterIterator, UnitId};

mod requests;

enum Framing {
    Rtu {
        destination: UnitId,
        spacing: Option<Duration>,
    },
    Tcp {
        destination: UnitId,
        tx_id: TxId,
    },
}

/// A Modbus client (master) that drives one request/reply exchange at a time
/// over a caller-supplied [`Transport`].
///
/// Reads return zero-copy iterators over the reply held in the client's
/// scratch buffer; writes validate the echoed fields of the reply. On RTU,
/// a destination of [`UnitId::broadcast`] makes write requests fire and
/// forget: the request is transmitted and no reply is awaited.
pub struct Client<T: Transport> {
    phys: PhysLayer<T>,
    reader: FramedReader,
    writer: FrameWriter,
    reply: Frame,
    framing: Framing,
    timeouts: Timeouts,
    decode: DecodeLevel,
    pending_raw: Option<(u8, Option<TxId>)>,
}

impl<T: Transport> Client<T> {
    /// Create a client speaking RTU framing.
    ///
    /// Set the peer with [`Client::set_destination`] before issuing requests.
    pub fn rtu(transport: T) -> Self {
        Self {
            phys: PhysLayer::new(transport),
            reader: FramedReader::rtu_response(),
            writer: FrameWriter::rtu(),
            reply: Frame::new(FrameHeader::new_rtu_header(FrameDestination::Broadcast)),
            framing: Framing::Rtu {
                destination: UnitId::default(),
                spacing: None,
            },
            timeouts: Timeouts::default(),
            decode: DecodeLevel::nothing(),
            pending_raw: None,
        }
    }

    /// Create a client speaking TCP (MBAP) framing
    pub fn tcp(transport: T) -> Self {
        Self {
            phys: PhysLayer::new(transport),
            reader: FramedReader::tcp(),
            writer: FrameWriter::tcp(),
            reply: Frame::new(FrameHeader::new_rtu_header(FrameDestination::Broadcast)),
            framing: Framing::Tcp {
                destination: UnitId::default(),
                tx_id: TxId::default(),
            },
            timeouts: Timeouts::default(),
            decode: DecodeLevel::nothing(),
            pending_raw: None,
        }
    }

    /// Set the maximum wall time for an entire reply, `None` disables
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.read = timeout;
    }

    /// Set the maximum wall time between two consecutive reply bytes,
    /// `None` disables
    pub fn set_byte_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.byte = timeout;
    }

    /// Set the pause enforced between transmitted bytes.
    ///
    /// Only applies to RTU, `Duration::ZERO` disables.
    pub fn set_byte_spacing(&mut self, spacing: Duration) {
        if let Framing::Rtu { spacing: gap, .. } = &mut self.framing {
            *gap = (!spacing.is_zero()).then_some(spacing);
        }
    }

    /// Set the unit the next request is addressed to.
    ///
    /// On RTU, [`UnitId::broadcast`] addresses every device on the bus.
    pub fn set_destination(&mut self, unit_id: UnitId) {
        match &mut self.framing {
            Framing::Rtu { destination, .. } => *destination = unit_id,
            Framing::Tcp { destination, .. } => *destination = unit_id,
        }
    }

    /// Set the decoding verbosity for protocol logging
    pub fn set_decode_level(&mut self, decode: DecodeLevel) {
        self.decode = decode;
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        self.phys.transport_mut()
    }

    /// Consume the client, returning the transport
    pub fn into_transport(self) -> T {
        self.phys.into_transport()
    }

    /// Send a FC 1 (0x01) Read Coils request and parse the reply
    pub fn read_coils(
        &mut self,
        range: AddressRange,
    ) -> Result<BitIterator<'_>, RequestError> {
        self.check_read_allowed()?;
        let range = range.of_read_bits()?;
        self.transact(FunctionCode::ReadCoils, &range.get())?;
        requests::parse_bits_reply(FunctionCode::ReadCoils, &self.reply, range.get())
    }

    /// Send a FC 2 (0x02) Read Discrete Inputs request and parse the reply
    pub fn read_discrete_inputs(
        &mut self,
        range: AddressRange,
    ) -> Result<BitIterator<'_>, RequestError> {
        self.check_read_allowed()?;
        let range = range.of_read_bits()?;
        self.transact(FunctionCode::ReadDiscreteInputs, &range.get())?;
        requests::parse_bits_reply(FunctionCode::ReadDiscreteInputs, &self.reply, range.get())
    }

    /// Send a FC 3 (0x03) Read Holding Registers request and parse the reply
    pub fn read_holding_registers(
        &mut self,
        range: AddressRange,
    ) -> Result<RegisterIterator<'_>, RequestError> {
        self.check_read_allowed()?;
        let range = range.of_read_registers()?;
        self.transact(FunctionCode::ReadHoldingRegisters, &range.get())?;
        requests::parse_registers_reply(
            FunctionCode::ReadHoldingRegisters,
            &self.reply,
            range.get(),
        )
    }

    /// Send a FC 4 (0x04) Read Input Registers request and parse the reply
    pub fn read_input_registers(
        &mut self,
        range: AddressRange,
    ) -> Result<RegisterIterator<'_>, RequestError> {
        self.check_read_allowed()?;
        let range = range.of_read_registers()?;
        self.transact(FunctionCode::ReadInputRegisters, &range.get())?;
        requests::parse_registers_reply(
            FunctionCode::ReadInputRegisters,
            &self.reply,
            range.get(),
        )
    }

    /// Send a FC 5 (0x05) Write Single Coil request and validate the echo
    pub fn write_single_coil(&mut self, value: Indexed<bool>) -> Result<(), RequestError> {
        self.transact(FunctionCode::WriteSingleCoil, &value)?;
        if self.is_broadcast() {
            return Ok(());
        }
        requests::expect_echo(FunctionCode::WriteSingleCoil, &self.reply, &value)
    }

    /// Send a FC 6 (0x06) Write Single Register request and validate the echo
    pub fn write_single_register(&mut self, value: Indexed<u16>) -> Result<(), RequestError> {
        self.transact(FunctionCode::WriteSingleRegister, &value)?;
        if self.is_broadcast() {
            return Ok(());
        }
        requests::expect_echo(FunctionCode::WriteSingleRegister, &self.reply, &value)
    }

    /// Send a FC 15 (0x0F) Write Multiple Coils request and validate the echo
    pub fn write_multiple_coils(
        &mut self,
        start: u16,
        values: &[bool],
    ) -> Result<(), RequestError> {
        let range = requests::coils_range(start, values)?;
        let request = requests::MultipleCoils { range, values };
        self.transact(FunctionCode::WriteMultipleCoils, &request)?;
        if self.is_broadcast() {
            return Ok(());
        }
        requests::expect_echo(FunctionCode::WriteMultipleCoils, &self.reply, &range)
    }

    /// Send a FC 16 (0x10) Write Multiple Registers request and validate the echo
    pub fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<(), RequestError> {
        let range = requests::registers_range(start, values)?;
        let request = requests::MultipleRegisters { range, values };
        self.transact(FunctionCode::WriteMultipleRegisters, &request)?;
        if self.is_broadcast() {
            return Ok(());
        }
        requests::expect_echo(FunctionCode::WriteMultipleRegisters, &self.reply, &range)
    }

    /// Send a raw PDU for a function code the engine does not model.
    ///
    /// Framing (CRC on RTU, MBAP on TCP) is handled by the engine; the body
    /// is transmitted untouched and must already be in network byte order.
    /// Follow up with [`Client::receive_raw_pdu_reply`] unless the request
    /// was broadcast.
    pub fn send_raw_pdu(&mut self, function: u8, body: &[u8]) -> Result<(), RequestError> {
        let max = crate::common::frame::constants::MAX_ADU_LENGTH - 1;
        if body.len() > max {
            return Err(InvalidRequest::PduTooBig(body.len(), max).into());
        }

        let header = self.request_header();
        let byte_timeout = self.timeouts.byte;
        let spacing = self.spacing();
        let physical = self.decode.physical;

        let bytes = self.writer.format(
            header,
            FunctionField::Raw(function),
            &requests::RawBody(body),
            self.decode,
        )?;
        self.phys.write_all(bytes, byte_timeout, spacing, physical)?;

        self.pending_raw = if header.destination.is_broadcast() {
            None
        } else {
            Some((function, header.tx_id))
        };
        Ok(())
    }

    /// Receive the reply to a raw PDU sent with [`Client::send_raw_pdu`].
    ///
    /// `body_length` is the expected reply body size without the function
    /// code. Returns the reply body; it is up to the caller to convert it to
    /// host byte order.
    pub fn receive_raw_pdu_reply(&mut self, body_length: usize) -> Result<&[u8], RequestError> {
        let (function, sent_tx_id) = self
            .pending_raw
            .take()
            .ok_or(RequestError::BadRequest(InvalidRequest::NoOutstandingRequest))?;

        let max = crate::common::frame::constants::MAX_ADU_LENGTH - 1;
        if body_length > max {
            return Err(InvalidRequest::PduTooBig(body_length, max).into());
        }

        let deadline = Deadline::new(self.timeouts.read);
        let byte_timeout = self.timeouts.byte;
        let physical = self.decode.physical;

        let buffer = &mut self.reader.buffer;
        buffer.clear();

        match &self.framing {
            Framing::Rtu { .. } => {
                buffer.fill_to(&mut self.phys, 2, &deadline, byte_timeout, physical)?;
                let unit_id = buffer.read_u8()?;
                let received = buffer.peek_at(0)?;

                if received == (function | 0x80) {
                    // function + exception code + CRC
                    buffer.fill_to(&mut self.phys, 4, &deadline, byte_timeout, physical)?;
                    let fc = buffer.read_u8()?;
                    let code = buffer.read_u8()?;
                    let received_crc = buffer.read_u16_le()?;
                    let expected_crc = crate::serial::frame::crc16(unit_id, &[fc, code]);
                    if received_crc != expected_crc {
                        return Err(FrameParseError::CrcValidationFailure(
                            received_crc,
                            expected_crc,
                        )
                        .into());
                    }
                    return Err(requests::exception_reply(code));
                }

                if received != function {
                    return Err(AduParseError::UnknownResponseFunction(
                        received,
                        function,
                        function | 0x80,
                    )
                    .into());
                }

                let pdu_length = 1 + body_length;
                buffer.fill_to(
                    &mut self.phys,
                    pdu_length + 2,
                    &deadline,
                    byte_timeout,
                    physical,
                )?;
                let data = buffer.read(pdu_length)?;
                self.reply.set(data);

                let received_crc = buffer.read_u16_le()?;
                let expected_crc = crate::serial::frame::crc16(unit_id, self.reply.payload());
                if received_crc != expected_crc {
                    return Err(FrameParseError::CrcValidationFailure(
                        received_crc,
                        expected_crc,
                    )
                    .into());
                }
            }
            Framing::Tcp { .. } => {
                buffer.fill_to(&mut self.phys, 7, &deadline, byte_timeout, physical)?;
                let tx_id = buffer.read_u16_be()?;
                let protocol_id = buffer.read_u16_be()?;
                let len_field = buffer.read_u16_be()? as usize;
                let _unit_id = buffer.read_u8()?;

                if protocol_id != 0 {
                    return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
                }
                if len_field > crate::tcp::frame::constants::MAX_LENGTH_FIELD {
                    return Err(FrameParseError::FrameLengthTooBig(
                        len_field,
                        crate::tcp::frame::constants::MAX_LENGTH_FIELD,
                    )
                    .into());
                }
                let adu_length = len_field
                    .checked_sub(1)
                    .ok_or(FrameParseError::MbapLengthZero)?;

                if let Some(sent) = sent_tx_id {
                    if tx_id != sent.to_u16() {
                        return Err(
                            FrameParseError::TxIdMismatch(sent.to_u16(), tx_id).into()
                        );
                    }
                }

                if adu_length == 0 {
                    return Err(AduParseError::InsufficientBytes.into());
                }

                buffer.fill_to(&mut self.phys, adu_length, &deadline, byte_timeout, physical)?;
                let received = buffer.peek_at(0)?;

                if received == (function | 0x80) {
                    if adu_length < 2 {
                        return Err(AduParseError::InsufficientBytes.into());
                    }
                    let _ = buffer.read_u8()?;
                    let code = buffer.read_u8()?;
                    return Err(requests::exception_reply(code));
                }

                if received != function {
                    return Err(AduParseError::UnknownResponseFunction(
                        received,
                        function,
                        function | 0x80,
                    )
                    .into());
                }

                if adu_length != 1 + body_length {
                    return Err(AduParseError::RequestByteCountMismatch(
                        1 + body_length,
                        adu_length,
                    )
                    .into());
                }

                let data = buffer.read(adu_length)?;
                self.reply.set(data);
            }
        }

        Ok(&self.reply.payload()[1..])
    }

    fn is_broadcast(&self) -> bool {
        matches!(
            &self.framing,
            Framing::Rtu { destination, .. } if destination.is_broadcast()
        )
    }

    fn check_read_allowed(&self) -> Result<(), RequestError> {
        if self.is_broadcast() {
            return Err(InvalidRequest::BroadcastRead.into());
        }
        Ok(())
    }

    fn spacing(&self) -> Option<Duration> {
        match &self.framing {
            Framing::Rtu { spacing, .. } => *spacing,
            Framing::Tcp { .. } => None,
        }
    }

    fn request_header(&mut self) -> FrameHeader {
        match &mut self.framing {
            Framing::Rtu { destination, .. } => FrameHeader::new_rtu_header(
                FrameDestination::from_rtu_address(destination.value),
            ),
            Framing::Tcp {
                destination,
                tx_id,
            } => FrameHeader::new_tcp_header(FrameDestination::UnitId(*destination), tx_id.next()),
        }
    }

    /// Transmit one request and, unless it was broadcast, receive the
    /// matching reply into the scratch frame
    fn transact(&mut self, function: FunctionCode, body: &dyn Serialize) -> Result<(), RequestError> {
        let header = self.request_header();
        let byte_timeout = self.timeouts.byte;
        let spacing = self.spacing();
        let physical = self.decode.physical;

        if self.decode.app.enabled() {
            tracing::info!("APP TX - {}", function);
        }

        let bytes = self
            .writer
            .format(header, FunctionField::Valid(function), body, self.decode)?;
        self.phys.write_all(bytes, byte_timeout, spacing, physical)?;

        if header.destination.is_broadcast() {
            return Ok(());
        }

        let frame = self
            .reader
            .next_frame(&mut self.phys, self.timeouts, self.decode)?;

        if let Some(sent) = header.tx_id {
            if let Some(received) = frame.header.tx_id {
                if received != sent {
                    return Err(FrameParseError::TxIdMismatch(
                        sent.to_u16(),
                        received.to_u16(),
                    )
                    .into());
                }
            }
        }

        self.reply = frame;
        Ok(())
    }
}
