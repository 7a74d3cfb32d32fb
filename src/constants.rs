/// Unit identifier that addresses every RTU device on the bus at once
pub const BROADCAST_ADDRESS: u8 = 0;

pub mod coil {
    /// wire encoding of an energized coil in write-single-coil bodies
    pub const ON: u16 = 0xFF00;
    /// wire encoding of a released coil in write-single-coil bodies
    pub const OFF: u16 = 0x0000;
}

pub mod limits {
    /// Largest quantity a single bit-read request may ask for
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Largest quantity a single register-read request may ask for
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Largest quantity one write-multiple-coils request may carry
    pub const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Largest quantity one write-multiple-registers request may carry
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
    /// Bytes of storage backing [`MAX_READ_COILS_COUNT`] packed bits
    pub const MAX_BITFIELD_BYTES: usize = 250;
}

pub mod exceptions {
    pub const ILLEGAL_FUNCTION: u8 = 0x01;
    pub const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub const SERVER_DEVICE_FAILURE: u8 = 0x04;
}
