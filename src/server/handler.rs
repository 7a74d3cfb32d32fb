use crate::exception::ExceptionCode;
use crate::types::{AddressRange, Bitfield, Indexed, WriteCoils, WriteRegisters};

/// Failure reported by a [`RequestHandler`] callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerError {
    /// Answer the request with the given Modbus exception
    Exception(ExceptionCode),
    /// Abort the poll without transmitting a response
    Abort,
}

impl From<ExceptionCode> for HandlerError {
    fn from(ex: ExceptionCode) -> Self {
        HandlerError::Exception(ex)
    }
}

impl std::error::Error for HandlerError {}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HandlerError::Exception(ex) => write!(f, "exception: {ex}"),
            HandlerError::Abort => f.write_str("abort without a response"),
        }
    }
}

/// Trait implemented by the user to process requests received by the server.
///
/// Every method has a default implementation answering
/// [`ExceptionCode::IllegalFunction`], so implementors only override the
/// functions their device supports.
///
/// For the read methods, bit/register `i` of the output corresponds to
/// address `range.start + i`. Handlers must not re-enter the engine.
pub trait RequestHandler {
    /// Read a range of coils into `output`
    fn read_coils(
        &mut self,
        _range: AddressRange,
        _output: &mut Bitfield,
    ) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Read a range of discrete inputs into `output`
    fn read_discrete_inputs(
        &mut self,
        _range: AddressRange,
        _output: &mut Bitfield,
    ) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Read a range of holding registers into `output`
    fn read_holding_registers(
        &mut self,
        _range: AddressRange,
        _output: &mut [u16],
    ) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Read a range of input registers into `output`
    fn read_input_registers(
        &mut self,
        _range: AddressRange,
        _output: &mut [u16],
    ) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Write a single coil value
    fn write_single_coil(&mut self, _value: Indexed<bool>) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Write a single register value
    fn write_single_register(&mut self, _value: Indexed<u16>) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Write multiple coils
    fn write_multiple_coils(&mut self, _values: WriteCoils) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Write multiple registers
    fn write_multiple_registers(&mut self, _values: WriteRegisters) -> Result<(), HandlerError> {
        Err(ExceptionCode::IllegalFunction.into())
    }

    /// Retrieve a sub-range of a slice or fail with
    /// [`ExceptionCode::IllegalDataAddress`]
    fn get_range_of<V>(slice: &[V], range: AddressRange) -> Result<&[V], HandlerError>
    where
        Self: Sized,
    {
        let rng = range.to_std_range();
        if rng.start >= slice.len() || rng.end > slice.len() {
            return Err(ExceptionCode::IllegalDataAddress.into());
        }
        Ok(&slice[rng])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unsupported;
    impl RequestHandler for Unsupported {}

    #[test]
    fn default_methods_answer_illegal_function() {
        let mut handler = Unsupported;
        assert_eq!(
            handler.write_single_register(Indexed::new(0, 1)),
            Err(ExceptionCode::IllegalFunction.into())
        );
        let mut bits = Bitfield::new();
        assert_eq!(
            handler.read_coils(AddressRange::try_from(0, 1).unwrap(), &mut bits),
            Err(ExceptionCode::IllegalFunction.into())
        );
    }

    #[test]
    fn get_range_of_validates_bounds() {
        let storage = [1u16, 2, 3, 4];
        assert_eq!(
            Unsupported::get_range_of(&storage, AddressRange::try_from(1, 2).unwrap()),
            Ok(&storage[1..3])
        );
        assert_eq!(
            Unsupported::get_range_of(&storage, AddressRange::try_from(3, 2).unwrap()),
            Err(ExceptionCode::IllegalDataAddress.into())
        );
        assert_eq!(
            Unsupported::get_range_of(&storage, AddressRange::try_from(4, 1).unwrap()),
            Err(ExceptionCode::IllegalDataAddress.into())
        );
    }
}
