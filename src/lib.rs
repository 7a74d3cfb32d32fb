//! A compact implementation of the [Modbus](https://modbus.org/) protocol
//! supporting both RTU (serial) and TCP framing, usable as a client (master)
//! or a server (slave).
//!
//! # Features
//!
//! * Panic-free parsing
//! * Bounded buffers only: a single ADU never exceeds 260 bytes and the
//!   request path performs no allocation
//! * Pure protocol logic: byte I/O and sleeping are supplied by the caller
//!   through the [`Transport`] trait, so the engine runs unchanged on top of
//!   a serial driver, a TCP socket, or a test double
//! * Feature flags to strip the client or server surface independently
//!
//! # Supported functions
//!
//! * Read Coils (1)
//! * Read Discrete Inputs (2)
//! * Read Holding Registers (3)
//! * Read Input Registers (4)
//! * Write Single Coil (5)
//! * Write Single Register (6)
//! * Write Multiple Coils (15)
//! * Write Multiple Registers (16)
//!
//! # Example client
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use picobus::client::Client;
//! use picobus::{AddressRange, Transport, UnitId};
//!
//! struct Port; // stand-in for a serial driver
//!
//! impl Transport for Port {
//!     fn read_byte(&mut self, _timeout: Option<Duration>) -> Result<Option<u8>, std::io::Error> {
//!         unimplemented!()
//!     }
//!
//!     fn write_byte(&mut self, _byte: u8, _timeout: Option<Duration>) -> Result<(), std::io::Error> {
//!         unimplemented!()
//!     }
//!
//!     fn sleep(&mut self, _duration: Duration) {
//!         unimplemented!()
//!     }
//! }
//!
//! fn main() -> Result<(), picobus::RequestError> {
//!     let mut client = Client::rtu(Port);
//!     client.set_destination(UnitId::new(0x02));
//!     client.set_read_timeout(Some(Duration::from_secs(1)));
//!
//!     for reg in client.read_holding_registers(AddressRange::try_from(0, 5)?)? {
//!         println!("address: {} value: {}", reg.index, reg.value);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(trivial_casts, trivial_numeric_casts, unused_import_braces)]

/// client (master) API
#[cfg(feature = "client")]
pub mod client;
/// public constant values related to the Modbus specification
pub mod constants;
/// server (slave) API
#[cfg(feature = "server")]
pub mod server;

mod common;
mod decode;
mod error;
mod exception;
mod phys;
mod serial;
mod tcp;
mod types;

pub use crate::decode::*;
pub use crate::error::*;
pub use crate::exception::*;
pub use crate::phys::Transport;
pub use crate::types::*;
