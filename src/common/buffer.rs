use std::time::Duration;

use crate::common::frame::constants::MAX_BUFFER_LENGTH;
use crate::decode::PhysDecodeLevel;
use crate::error::{InternalError, RequestError};
use crate::phys::{Deadline, PhysLayer, Transport};

/// Fixed receive window for one frame, filled one byte at a time through the
/// transport so that both the message deadline and the inter-byte timeout
/// apply to every byte
pub(crate) struct ReadBuffer {
    buffer: [u8; MAX_BUFFER_LENGTH],
    begin: usize,
    end: usize,
}

impl ReadBuffer {
    pub(crate) fn new() -> Self {
        ReadBuffer {
            buffer: [0; MAX_BUFFER_LENGTH],
            begin: 0,
            end: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.begin
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub(crate) fn clear(&mut self) {
        self.begin = 0;
        self.end = 0;
    }

    /// Consume `count` buffered bytes
    pub(crate) fn read(&mut self, count: usize) -> Result<&[u8], InternalError> {
        let available = self.len();
        if available < count {
            return Err(InternalError::InsufficientBytesForRead(count, available));
        }
        let consumed = &self.buffer[self.begin..self.begin + count];
        self.begin += count;
        Ok(consumed)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, InternalError> {
        Ok(self.read(1)?[0])
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16, InternalError> {
        let b1 = self.read_u8()? as u16;
        let b2 = self.read_u8()? as u16;
        Ok((b1 << 8) | b2)
    }

    pub(crate) fn read_u16_le(&mut self) -> Result<u16, InternalError> {
        let b1 = self.read_u8()? as u16;
        let b2 = self.read_u8()? as u16;
        Ok((b2 << 8) | b1)
    }

    /// Inspect an unconsumed byte at `offset` from the current position
    pub(crate) fn peek_at(&self, offset: usize) -> Result<u8, InternalError> {
        if self.len() <= offset {
            return Err(InternalError::InsufficientBytesForRead(
                offset + 1,
                self.len(),
            ));
        }
        Ok(self.buffer[self.begin + offset])
    }

    /// Pull exactly one more byte off the transport, honoring both deadlines
    pub(crate) fn fill_one<T: Transport>(
        &mut self,
        phys: &mut PhysLayer<T>,
        deadline: &Deadline,
        byte_timeout: Option<Duration>,
        level: PhysDecodeLevel,
    ) -> Result<(), RequestError> {
        // rewinding when drained keeps the whole window usable
        if self.is_empty() {
            self.begin = 0;
            self.end = 0;
        }

        if self.end == self.buffer.len() {
            return Err(InternalError::InsufficientWriteSpace.into());
        }

        let budget = deadline.budget(byte_timeout)?;
        match phys.read_byte(budget, level)? {
            Some(byte) => {
                self.buffer[self.end] = byte;
                self.end += 1;
                Ok(())
            }
            None => Err(RequestError::ResponseTimeout),
        }
    }

    #[cfg(test)]
    pub(crate) fn push_for_test(&mut self, byte: u8) {
        self.buffer[self.end] = byte;
        self.end += 1;
    }

    /// Keep pulling bytes until at least `count` are buffered
    pub(crate) fn fill_to<T: Transport>(
        &mut self,
        phys: &mut PhysLayer<T>,
        count: usize,
        deadline: &Deadline,
        byte_timeout: Option<Duration>,
        level: PhysDecodeLevel,
    ) -> Result<(), RequestError> {
        while self.len() < count {
            self.fill_one(phys, deadline, byte_timeout, level)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consuming_past_the_buffered_window_is_an_error() {
        let mut buffer = ReadBuffer::new();
        buffer.push_for_test(0xAA);

        assert_eq!(buffer.read_u8(), Ok(0xAA));
        assert_eq!(
            buffer.read_u8(),
            Err(InternalError::InsufficientBytesForRead(1, 0))
        );
        assert_eq!(
            buffer.peek_at(0),
            Err(InternalError::InsufficientBytesForRead(1, 0))
        );
    }

    #[test]
    fn endianness_helpers_assemble_byte_pairs() {
        let mut buffer = ReadBuffer::new();
        for byte in [0x12, 0x34, 0x34, 0x12] {
            buffer.push_for_test(byte);
        }
        assert_eq!(buffer.read_u16_be(), Ok(0x1234));
        assert_eq!(buffer.read_u16_le(), Ok(0x1234));
    }
}
