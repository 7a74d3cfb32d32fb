use scursor::{ReadCursor, WriteCursor};

use crate::error::RequestError;

/// Writes a PDU body into the outgoing scratch
pub(crate) trait Serialize {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError>;
}

/// Reads a value out of a received PDU body
pub(crate) trait Parse: Sized {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError>;
}
