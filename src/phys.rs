use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::decode::PhysDecodeLevel;
use crate::error::RequestError;

/// Byte-oriented transport supplied by the caller.
///
/// Implementations wrap whatever carries the bytes (a serial driver, a TCP
/// socket, a test double) and must block according to the documented
/// semantics. The engine never touches a socket or a clock source for
/// sleeping on its own.
pub trait Transport {
    /// Block until one byte arrives or `timeout` elapses.
    ///
    /// `Ok(None)` means the deadline passed without data. A `timeout` of
    /// `None` means block indefinitely.
    fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Option<u8>, std::io::Error>;

    /// Block until the byte is fully written.
    ///
    /// A write-side timeout must be reported as an error; the engine treats
    /// a partially transmitted message as unrecoverable.
    fn write_byte(&mut self, byte: u8, timeout: Option<Duration>) -> Result<(), std::io::Error>;

    /// Pause the calling thread, used to enforce RTU inter-byte spacing
    fn sleep(&mut self, duration: Duration);
}

/// Receive and inter-byte deadlines applied while reading one message
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Timeouts {
    /// maximum wall time for an entire message, `None` disables
    pub(crate) read: Option<Duration>,
    /// maximum wall time between two consecutive bytes, `None` disables
    pub(crate) byte: Option<Duration>,
}

/// Message-scoped deadline established once per frame
pub(crate) struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            expires_at: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Budget for the next single-byte read: the smaller of the remaining
    /// message budget and the inter-byte timeout. Fails once the message
    /// deadline has passed.
    pub(crate) fn budget(
        &self,
        byte_timeout: Option<Duration>,
    ) -> Result<Option<Duration>, RequestError> {
        let expires_at = match self.expires_at {
            None => return Ok(byte_timeout),
            Some(x) => x,
        };

        let now = Instant::now();
        if now >= expires_at {
            return Err(RequestError::ResponseTimeout);
        }

        let remaining = expires_at - now;
        let budget = match byte_timeout {
            Some(byte) if byte < remaining => byte,
            _ => remaining,
        };
        Ok(Some(budget))
    }
}

/// Wraps the user transport with decode-level logging and error translation
pub(crate) struct PhysLayer<T> {
    transport: T,
}

impl<T: Transport> PhysLayer<T> {
    pub(crate) fn new(transport: T) -> Self {
        Self { transport }
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn read_byte(
        &mut self,
        timeout: Option<Duration>,
        level: PhysDecodeLevel,
    ) -> Result<Option<u8>, RequestError> {
        let result = self.transport.read_byte(timeout)?;
        if let Some(byte) = result {
            if level.enabled() {
                tracing::info!(
                    "PHYS RX - {}",
                    PhysDisplay::new(level, std::slice::from_ref(&byte))
                );
            }
        }
        Ok(result)
    }

    /// Write a complete message, one byte at a time, sleeping `spacing`
    /// between successive bytes when configured (RTU only)
    pub(crate) fn write_all(
        &mut self,
        data: &[u8],
        timeout: Option<Duration>,
        spacing: Option<Duration>,
        level: PhysDecodeLevel,
    ) -> Result<(), RequestError> {
        if level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(level, data));
        }

        let mut first = true;
        for byte in data {
            if !first {
                if let Some(gap) = spacing {
                    self.transport.sleep(gap);
                }
            }
            first = false;
            self.transport.write_byte(*byte, timeout)?;
        }
        Ok(())
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_deadline_passes_byte_timeout_through() {
        let deadline = Deadline::new(None);
        assert_eq!(deadline.budget(None).unwrap(), None);
        assert_eq!(
            deadline.budget(Some(Duration::from_millis(100))).unwrap(),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn byte_timeout_caps_the_message_budget() {
        let deadline = Deadline::new(Some(Duration::from_secs(60)));
        let budget = deadline
            .budget(Some(Duration::from_millis(100)))
            .unwrap()
            .unwrap();
        assert_eq!(budget, Duration::from_millis(100));
    }

    #[test]
    fn message_deadline_caps_a_longer_byte_timeout() {
        let deadline = Deadline::new(Some(Duration::from_millis(50)));
        let budget = deadline
            .budget(Some(Duration::from_secs(60)))
            .unwrap()
            .unwrap();
        assert!(budget <= Duration::from_millis(50));
    }

    #[test]
    fn expired_deadline_fails_with_timeout() {
        let deadline = Deadline::new(Some(Duration::from_secs(0)));
        assert_eq!(
            deadline.budget(None),
            Err(RequestError::ResponseTimeout)
        );
    }
}
