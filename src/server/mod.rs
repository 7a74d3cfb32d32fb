use std::time::Duration;

use scursor::ReadCursor;

use crate::common::frame::{
    FrameDestination, FramedReader, FrameWriter, FunctionField,
};
use crate::common::function::FunctionCode;
use crate::decode::DecodeLevel;
use crate::error::{InvalidRequest, RequestError};
use crate::exception::ExceptionCode;
use crate::phys::{PhysLayer, Timeouts, Transport};
use crate::server::request::{exception_for_request_error, Request, RequestDisplay};
use crate::types::UnitId;

mod handler;
mod request;
mod response;

pub use handler::{HandlerError, RequestHandler};

enum Framing {
    Rtu {
        address: UnitId,
        spacing: Option<Duration>,
    },
    Tcp,
}

/// A Modbus server (slave) that answers one request per [`Server::poll`]
/// call, dispatching to a caller-supplied [`RequestHandler`].
///
/// On RTU, frames addressed to another unit are consumed without action and
/// broadcast requests are dispatched without a response. Each poll is
/// bounded by the configured read timeout.
pub struct Server<T: Transport, H: RequestHandler> {
    phys: PhysLayer<T>,
    reader: FramedReader,
    writer: FrameWriter,
    handler: H,
    framing: Framing,
    timeouts: Timeouts,
    decode: DecodeLevel,
}

impl<T: Transport, H: RequestHandler> Server<T, H> {
    /// Create a server answering RTU requests addressed to `address`.
    ///
    /// The broadcast address and the reserved range 248..=255 are rejected.
    pub fn rtu(transport: T, address: UnitId, handler: H) -> Result<Self, RequestError> {
        if address.is_broadcast() || address.is_rtu_reserved() {
            return Err(InvalidRequest::InvalidServerAddress(address.value).into());
        }
        Ok(Self {
            phys: PhysLayer::new(transport),
            reader: FramedReader::rtu_request(),
            writer: FrameWriter::rtu(),
            handler,
            framing: Framing::Rtu {
                address,
                spacing: None,
            },
            timeouts: Timeouts::default(),
            decode: DecodeLevel::nothing(),
        })
    }

    /// Create a server answering TCP (MBAP) requests
    pub fn tcp(transport: T, handler: H) -> Self {
        Self {
            phys: PhysLayer::new(transport),
            reader: FramedReader::tcp(),
            writer: FrameWriter::tcp(),
            handler,
            framing: Framing::Tcp,
            timeouts: Timeouts::default(),
            decode: DecodeLevel::nothing(),
        }
    }

    /// Set the maximum wall time one poll may wait for a request,
    /// `None` disables
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.read = timeout;
    }

    /// Set the maximum wall time between two consecutive request bytes,
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

    /// Set the decoding verbosity for protocol logging
    pub fn set_decode_level(&mut self, decode: DecodeLevel) {
        self.decode = decode;
    }

    /// Access the request handler
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        self.phys.transport_mut()
    }

    /// Consume the server, returning the transport and the handler
    pub fn into_inner(self) -> (T, H) {
        (self.phys.into_transport(), self.handler)
    }

    /// Receive one request, dispatch it to the handler, and transmit the
    /// matching response or exception.
    ///
    /// Returns `Ok(())` with no action for frames the server must stay
    /// silent on: requests addressed to other RTU units and broadcasts.
    pub fn poll(&mut self) -> Result<(), RequestError> {
        let frame = self
            .reader
            .next_frame(&mut self.phys, self.timeouts, self.decode)?;

        if let Framing::Rtu { address, .. } = &self.framing {
            if let FrameDestination::UnitId(destination) = frame.header.destination {
                if destination != *address {
                    tracing::debug!("ignoring frame addressed to unit: {}", destination);
                    return Ok(());
                }
            }
        }

        let broadcast = frame.header.destination.is_broadcast();
        let byte_timeout = self.timeouts.byte;
        let spacing = match &self.framing {
            Framing::Rtu { spacing, .. } => *spacing,
            Framing::Tcp => None,
        };
        let physical = self.decode.physical;

        let mut cursor = ReadCursor::new(frame.payload());
        let function_value = match cursor.read_u8() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("received an empty frame");
                return Ok(());
            }
        };

        let function = match FunctionCode::get(function_value) {
            Some(function) => function,
            None => {
                tracing::warn!("received unknown function code: {}", function_value);
                if broadcast {
                    return Ok(());
                }
                let bytes = self.writer.format(
                    frame.header,
                    FunctionField::Raw(function_value | 0x80),
                    &ExceptionCode::IllegalFunction,
                    self.decode,
                )?;
                self.phys.write_all(bytes, byte_timeout, spacing, physical)?;
                return Ok(());
            }
        };

        let request = match Request::parse(function, &mut cursor) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!("error parsing {} request: {}", function, err);
                if broadcast {
                    return Ok(());
                }
                let ex = match exception_for_request_error(&err) {
                    Some(ex) => ex,
                    None => return Err(err),
                };
                let bytes = self.writer.format(
                    frame.header,
                    FunctionField::Exception(function),
                    &ex,
                    self.decode,
                )?;
                self.phys.write_all(bytes, byte_timeout, spacing, physical)?;
                return Ok(());
            }
        };

        if self.decode.app.enabled() {
            tracing::info!(
                "APP RX - {}",
                RequestDisplay::new(self.decode.app, &request)
            );
        }

        if broadcast {
            match request.into_broadcast_request() {
                Some(broadcast_request) => broadcast_request.dispatch(&mut self.handler),
                None => tracing::warn!("ignoring broadcast read request: {}", function),
            }
            return Ok(());
        }

        let bytes = request.get_reply(frame.header, &mut self.handler, &mut self.writer, self.decode)?;
        self.phys.write_all(bytes, byte_timeout, spacing, physical)?;
        Ok(())
    }
}
