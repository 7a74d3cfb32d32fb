use std::fmt::{Error, Formatter};

use crate::exception::ExceptionCode;

/// Errors that can occur while making a request or polling for one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// An I/O error occurred on the underlying transport
    Io(std::io::ErrorKind),
    /// A frame-level parsing or validation error occurred
    BadFrame(FrameParseError),
    /// A reply PDU failed validation
    BadResponse(AduParseError),
    /// The request cannot be sent as constructed
    BadRequest(InvalidRequest),
    /// The supplied address range is invalid
    BadArgument(InvalidRange),
    /// The peer answered with a Modbus exception
    Exception(ExceptionCode),
    /// A deadline expired before the message completed
    ResponseTimeout,
    /// A server handler failed in a way that must not produce a response
    Aborted,
    /// A bug in the library produced an impossible buffer operation
    Internal(InternalError),
}

impl RequestError {
    /// Returns true if the error is a Modbus exception reported by the peer,
    /// as opposed to a local failure
    pub fn is_exception(&self) -> bool {
        matches!(self, RequestError::Exception(_))
    }
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            RequestError::Io(kind) => write!(f, "I/O error: {kind:?}"),
            RequestError::BadFrame(err) => write!(f, "bad frame: {err}"),
            RequestError::BadResponse(err) => write!(f, "bad response: {err}"),
            RequestError::BadRequest(err) => write!(f, "bad request: {err}"),
            RequestError::BadArgument(err) => write!(f, "bad argument: {err}"),
            RequestError::Exception(ex) => write!(f, "exception returned by the server: {ex}"),
            RequestError::ResponseTimeout => {
                f.write_str("deadline expired before the message completed")
            }
            RequestError::Aborted => {
                f.write_str("server handler failed without producing a response")
            }
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
        }
    }
}

/// Errors that occur while parsing a frame off the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received a TCP frame with a non-Modbus protocol id
    UnknownProtocolId(u16),
    /// Received a TCP frame with the length field set to zero
    MbapLengthZero,
    /// Received a frame with a length that exceeds the maximum allowed size
    FrameLengthTooBig(usize, usize),
    /// The CRC of a received RTU frame did not match the calculated value
    CrcValidationFailure(u16, u16),
    /// Received a frame with an unknown function code
    UnknownFunctionCode(u8),
    /// The transaction id of a reply did not match the request
    TxIdMismatch(u16, u16),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received frame with non-Modbus protocol id: {id}")
            }
            FrameParseError::MbapLengthZero => {
                f.write_str("received frame with the length field set to zero")
            }
            FrameParseError::FrameLengthTooBig(size, max) => write!(
                f,
                "received frame with length ({size}) that exceeds the maximum allowed size ({max})"
            ),
            FrameParseError::CrcValidationFailure(received, expected) => write!(
                f,
                "received CRC value {received:#06X} does not match the expected value {expected:#06X}"
            ),
            FrameParseError::UnknownFunctionCode(fc) => {
                write!(f, "received unknown function code: {fc:#04X}")
            }
            FrameParseError::TxIdMismatch(request, reply) => write!(
                f,
                "reply transaction id ({reply:#06X}) does not match the request ({request:#06X})"
            ),
        }
    }
}

/// Errors that occur while validating the body of a reply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AduParseError {
    /// The reply is too short to be valid
    InsufficientBytes,
    /// The reply contains extra trailing bytes
    TrailingBytes(usize),
    /// The byte count does not match the expected count derived from the request
    RequestByteCountMismatch(usize, usize),
    /// A parameter expected to be echoed in the reply did not match
    ReplyEchoMismatch,
    /// An unknown reply function code was received
    UnknownResponseFunction(u8, u8, u8),
    /// A coil state was neither 0x0000 nor 0xFF00
    UnknownCoilState(u16),
    /// An exception reply carried a code outside the defined range
    UnknownExceptionCode(u8),
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            AduParseError::InsufficientBytes => f.write_str("the reply is too short to be valid"),
            AduParseError::TrailingBytes(remaining) => {
                write!(f, "reply contains {remaining} extra trailing bytes")
            }
            AduParseError::RequestByteCountMismatch(expected, actual) => write!(
                f,
                "byte count ({actual}) does not match what is expected based on the request ({expected})"
            ),
            AduParseError::ReplyEchoMismatch => {
                f.write_str("a parameter expected to be echoed in the reply did not match")
            }
            AduParseError::UnknownResponseFunction(actual, expected, error) => write!(
                f,
                "received unknown reply function code: {actual}. Expected {expected} or {error}"
            ),
            AduParseError::UnknownCoilState(value) => write!(
                f,
                "received coil state with unspecified value: {value:#06X}"
            ),
            AduParseError::UnknownExceptionCode(value) => {
                write!(f, "received unknown exception code: {value}")
            }
        }
    }
}

/// Requests that cannot be sent or answered as constructed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidRequest {
    /// Read requests cannot be broadcast since no reply can follow
    BroadcastRead,
    /// The RTU server address must be in the range 1..=247
    InvalidServerAddress(u8),
    /// A raw PDU body exceeds the maximum encodable size
    PduTooBig(usize, usize),
    /// A raw reply was requested without an outstanding raw request
    NoOutstandingRequest,
}

impl std::error::Error for InvalidRequest {}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            InvalidRequest::BroadcastRead => {
                f.write_str("read requests cannot be broadcast since no reply can follow")
            }
            InvalidRequest::InvalidServerAddress(address) => {
                write!(f, "{address} is not a valid RTU server address (1..=247)")
            }
            InvalidRequest::PduTooBig(size, max) => write!(
                f,
                "PDU body of {size} bytes exceeds the maximum allowed size of {max}"
            ),
            InvalidRequest::NoOutstandingRequest => {
                f.write_str("a raw reply was requested without an outstanding raw request")
            }
        }
    }
}

/// Address range validation errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidRange {
    /// The range contains a count of zero
    CountOfZero,
    /// Start and count would overflow the 16-bit address space
    AddressOverflow(u16, u16),
    /// The count exceeds the maximum allowed for this request type
    CountTooLargeForType(u16, u16),
}

impl std::error::Error for InvalidRange {}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            InvalidRange::CountOfZero => f.write_str("range contains a count of zero"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the address space"
            ),
            InvalidRange::CountTooLargeForType(count, max) => write!(
                f,
                "the count of {count} exceeds the maximum allowed count of {max} for this request type"
            ),
        }
    }
}

/// Buffer operations that can only fail because of a bug in the library
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// Attempted to write more bytes than the scratch buffer holds
    InsufficientWriteSpace,
    /// Attempted to read more bytes than present
    InsufficientBytesForRead(usize, usize),
    /// A seek operation exceeded the bounds of the underlying buffer
    BadSeekOperation,
    /// A TCP frame was formatted without a transaction id
    MissingTransactionId,
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            InternalError::InsufficientWriteSpace => {
                f.write_str("attempted to write more bytes than the scratch buffer holds")
            }
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("a seek operation exceeded the bounds of the underlying buffer")
            }
            InternalError::MissingTransactionId => {
                f.write_str("a TCP frame was formatted without a transaction id")
            }
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

impl From<InvalidRequest> for RequestError {
    fn from(err: InvalidRequest) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InvalidRange> for RequestError {
    fn from(err: InvalidRange) -> Self {
        RequestError::BadArgument(err)
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(ex: ExceptionCode) -> Self {
        RequestError::Exception(ex)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(_: scursor::ReadError) -> Self {
        RequestError::BadResponse(AduParseError::InsufficientBytes)
    }
}

impl From<scursor::WriteError> for RequestError {
    fn from(_: scursor::WriteError) -> Self {
        RequestError::Internal(InternalError::InsufficientWriteSpace)
    }
}
