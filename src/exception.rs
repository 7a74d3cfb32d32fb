/// The four exception replies a server may answer with
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
pub enum ExceptionCode {
    /// The requested function is not supported by the server
    IllegalFunction,
    /// Some part of the requested address span does not exist on the server
    IllegalDataAddress,
    /// A quantity or data field in the request is outside what the server
    /// accepts
    IllegalDataValue,
    /// The server failed while acting on an otherwise valid request
    ServerDeviceFailure,
}

impl ExceptionCode {
    pub(crate) fn get(value: u8) -> Option<Self> {
        match value {
            crate::constants::exceptions::ILLEGAL_FUNCTION => Some(ExceptionCode::IllegalFunction),
            crate::constants::exceptions::ILLEGAL_DATA_ADDRESS => {
                Some(ExceptionCode::IllegalDataAddress)
            }
            crate::constants::exceptions::ILLEGAL_DATA_VALUE => {
                Some(ExceptionCode::IllegalDataValue)
            }
            crate::constants::exceptions::SERVER_DEVICE_FAILURE => {
                Some(ExceptionCode::ServerDeviceFailure)
            }
            _ => None,
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(ex: ExceptionCode) -> Self {
        match ex {
            ExceptionCode::IllegalFunction => crate::constants::exceptions::ILLEGAL_FUNCTION,
            ExceptionCode::IllegalDataAddress => {
                crate::constants::exceptions::ILLEGAL_DATA_ADDRESS
            }
            ExceptionCode::IllegalDataValue => crate::constants::exceptions::ILLEGAL_DATA_VALUE,
            ExceptionCode::ServerDeviceFailure => {
                crate::constants::exceptions::SERVER_DEVICE_FAILURE
            }
        }
    }
}

impl std::error::Error for ExceptionCode {}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            ExceptionCode::IllegalFunction => {
                f.write_str("the requested function is not supported by the server (1)")
            }
            ExceptionCode::IllegalDataAddress => f.write_str(
                "some part of the requested address span does not exist on the server (2)",
            ),
            ExceptionCode::IllegalDataValue => f.write_str(
                "a quantity or data field in the request is outside what the server accepts (3)",
            ),
            ExceptionCode::ServerDeviceFailure => {
                f.write_str("the server failed while acting on the request (4)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_defined_exception_codes() {
        for value in 1u8..=4 {
            let code = ExceptionCode::get(value).unwrap();
            assert_eq!(u8::from(code), value);
        }
    }

    #[test]
    fn rejects_undefined_exception_codes() {
        assert_eq!(ExceptionCode::get(0), None);
        assert_eq!(ExceptionCode::get(5), None);
        assert_eq!(ExceptionCode::get(0xFF), None);
    }
}
