//! Native serial port support for [`Session`](crate::Session).
//!
//! Uses the [`serialport`](https://crates.io/crates/serialport) crate.

extern crate std;

use crate::{
    Config, Delay, Error, Link, MemoryImage, Result, Session, Truncation,
    adapter::{self, AdapterDescriptor, MatchPolicy},
};
use alloc::vec::Vec;
use core::time::Duration;
use embedded_io_adapters::std::FromStd;
use log::debug;
use serialport::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits,
};
use std::{boxed::Box, thread};

/// Serial port type implementing [`Link`].
pub type Port = FromStd<Box<dyn SerialPort>>;

/// Port-specific error type to be used as `E` for the generic [`Error<E>`] type.
pub type PortError = std::io::Error;

impl Link for Port {
    fn bytes_available(&mut self) -> core::result::Result<usize, PortError> {
        let len = self.inner().bytes_to_read()?;

        Ok(len as usize)
    }

    fn discard_buffers(&mut self) -> core::result::Result<(), PortError> {
        self.inner().clear(ClearBuffer::All)?;

        Ok(())
    }
}

/// [`Delay`] implementation that puts the current thread to sleep.
#[derive(Default, Copy, Clone, Debug)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Lists the serial adapters currently visible to the operating system.
pub fn list_adapters() -> Result<Vec<AdapterDescriptor>, PortError> {
    let ports = serialport::available_ports()
        .map_err(|err| Error::ConnectionFailed(PortError::from(err)))?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(info) => AdapterDescriptor::usb(
                port.port_name,
                info.vid,
                info.pid,
                info.serial_number.as_deref(),
            ),
            _ => AdapterDescriptor::other(port.port_name),
        })
        .collect())
}

/// Enumerates the serial adapters and selects the first one matching the given IDs.
///
/// # Errors
///
/// - [`Error::DeviceNotFound`] if no adapter matches.
pub fn find_adapter(
    vendor_id: u16,
    product_id: u16,
    policy: MatchPolicy,
) -> Result<AdapterDescriptor, PortError> {
    let adapters = list_adapters()?;

    debug!("Found {} serial adapters", adapters.len());

    adapter::find_adapter::<PortError, _>(&adapters, vendor_id, product_id, policy).cloned()
}

/// Opens a native serial port at the given path.
///
/// The port is configured for 8 data bits, no parity and one stop bit
/// at the configured baud rate. Pending bytes are discarded.
///
/// Returns a [`Port`] that can be passed to [`Session::new`].
pub fn open(path: &str, config: &Config) -> Result<Port, PortError> {
    let port = serialport::new(path, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.read_timeout)
        .open()
        .map_err(|err| Error::ConnectionFailed(PortError::from(err)))?;

    port.clear(ClearBuffer::All)
        .map_err(|err| Error::ConnectionFailed(PortError::from(err)))?;

    debug!("Opened {path} at {} baud", config.baud_rate);

    Ok(FromStd::new(port))
}

/// Reads the memory image of the device attached to `adapter`.
///
/// The port is opened for the duration of the read
/// and closed again before returning.
///
/// # Errors
///
/// - [`Error::InvalidConfiguration`] if `config` is invalid. No port is opened.
/// - [`Error::ConnectionFailed`] if the port cannot be opened.
/// - [`Error::TransferFailed`] if the port fails during the read.
pub fn read_image(
    adapter: &AdapterDescriptor,
    config: &Config,
    truncation: Truncation,
) -> Result<MemoryImage, PortError> {
    config.validate::<PortError>()?;

    let port = open(&adapter.path, config)?;

    Session::new(port, StdDelay, *config).read_image(truncation)
}
