//! Read the tune memory of Burn2 devices over their USB serial link.
//!
//! # Overview
//!
//! The `burn2` crate implements the bulk-read protocol of the Burn2 tuning
//! memory device. It offers a blocking, platform-agnostic API that performs
//! the device handshake, triggers the memory transfer and reconstructs the
//! memory image from the framed byte stream.
//!
//! Depending on your needs, you can:
//!
//! - Use [`serial::read_image`] to read a device with a single call.
//! - Locate adapters with the [`adapter`] module and drive a [`Session`] yourself.
//! - Reconstruct images from previously captured transfers with the [`image`] module.
//!
//! # Getting started
//!
//! Burn2 devices are connected through an FTDI USB–UART bridge
//! (vendor ID `0403`, product ID `6001`) configured as follows:
//!
//! - **Baud rate:** 921600
//! - **Parity:** None
//! - **Data bits:** 8
//! - **Stop bits:** 1
//!
//! If you enable the `native-serial` feature, the bridge can be located
//! and read directly:
//!
//! ```no_run
//! # fn main() -> burn2::Result<(), burn2::serial::PortError> {
//! use burn2::{Config, Truncation, adapter::{self, MatchPolicy}};
//!
//! let adapter = burn2::serial::find_adapter(
//!     adapter::VENDOR_ID,
//!     adapter::PRODUCT_ID,
//!     MatchPolicy::default(),
//! )?;
//! let image = burn2::serial::read_image(&adapter, &Config::default(), Truncation::Trim32k)?;
//!
//! println!("Read {} bytes", image.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol details
//!
//! A read consists of a fixed sequence of commands:
//!
//! 1. The probe command `56 56` is sent. A present device answers with a
//!    response containing `05 0e 46`. The answer is only logged, the
//!    sequence continues without it.
//! 2. Both buffers are discarded and the arm command `4a 34 7e` is sent.
//! 3. The poll command `43` is sent 250 times, 10 ms apart. There is no
//!    flow control, so the device relies on this exact cadence to push
//!    its memory contents.
//! 4. Up to 64000 bytes are read and split into frames as described
//!    in the [`image`] module.

#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod adapter;
pub mod image;

#[cfg(feature = "native-serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-serial")))]
pub mod serial;

pub use embedded_io;
pub use image::{MemoryImage, Truncation};

use alloc::{vec, vec::Vec};
use core::{
    fmt::{Display, Formatter},
    time::Duration,
};
use embedded_io::{Error as _, ErrorKind, Read, Write};
use log::{debug, info, trace, warn};

/// A specialized [`Result`] type for Burn2 operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for Burn2 operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// No serial adapter matches the expected IDs.
    DeviceNotFound,
    /// The serial port could not be opened or configured.
    ConnectionFailed(E),
    /// The port failed while talking to the device.
    TransferFailed(E),
    /// An unsupported option was supplied.
    InvalidConfiguration,
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::DeviceNotFound => write!(f, "device not found"),
            Self::ConnectionFailed(err) => write!(f, "connection failed: {err}"),
            Self::TransferFailed(err) => write!(f, "transfer failed: {err}"),
            Self::InvalidConfiguration => write!(f, "invalid configuration"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::TransferFailed(err)
    }
}

/// Command sent to the device.
#[derive(Debug)]
enum Command {
    Probe,
    Arm,
    Poll,
}

impl Command {
    const fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Probe => &[0x56, 0x56],
            Self::Arm => &[0x4a, 0x34, 0x7e],
            Self::Poll => &[0x43],
        }
    }
}

/// Byte sequence contained in the probe response of a present device.
const SIGNATURE: [u8; 3] = [0x05, 0x0e, 0x46];

/// Chunk size used while draining the probe response.
const PROBE_CHUNK_SIZE: usize = 3;

/// Session parameters.
///
/// The defaults match the timing the device expects and
/// should only be changed for testing.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Config {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Size of the buffer the bulk transfer is read into, which bounds the transfer size.
    ///
    /// This does not resize the driver's receive or transmit queues.
    pub buffer_size: usize,
    /// Time to wait for incoming bytes before a read gives up.
    pub read_timeout: Duration,
    /// Delay between the probe command and reading its response.
    pub probe_settle: Duration,
    /// Delay after the arm command.
    pub arm_settle: Duration,
    /// Number of poll commands sent.
    pub poll_count: u16,
    /// Delay after each poll command.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: 921_600,
            buffer_size: image::MAX_TRANSFER_SIZE,
            read_timeout: Duration::from_secs(1),
            probe_settle: Duration::from_millis(20),
            arm_settle: Duration::from_millis(10),
            poll_count: 250,
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Checks the parameters before a session is started.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if the baud rate or buffer size is zero.
    pub fn validate<E>(&self) -> Result<(), E> {
        if self.baud_rate == 0 || self.buffer_size == 0 {
            return Err(Error::InvalidConfiguration);
        }

        Ok(())
    }
}

/// Serial link to a device.
///
/// Extends [`Read`] and [`Write`] with the buffer
/// management operations needed by a [`Session`].
pub trait Link: Read + Write {
    /// Returns the number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> core::result::Result<usize, Self::Error>;

    /// Discards all pending input and output bytes.
    fn discard_buffers(&mut self) -> core::result::Result<(), Self::Error>;
}

impl<T: Link + ?Sized> Link for &mut T {
    fn bytes_available(&mut self) -> core::result::Result<usize, Self::Error> {
        T::bytes_available(self)
    }

    fn discard_buffers(&mut self) -> core::result::Result<(), Self::Error> {
        T::discard_buffers(self)
    }
}

/// Blocking delay provider used to pace commands.
pub trait Delay {
    /// Blocks for the given duration.
    fn delay(&mut self, duration: Duration);
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay(&mut self, duration: Duration) {
        T::delay(self, duration);
    }
}

/// Blocking Burn2 read session.
///
/// Owns the link for the duration of a single read.
/// [`Session::read_image`] consumes the session, so the link
/// is released once the read completes or fails.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> burn2::Result<(), burn2::serial::PortError> {
/// use burn2::{Config, Session, Truncation, serial};
///
/// let config = Config::default();
/// let port = serial::open("/dev/ttyUSB0", &config)?;
/// let image = Session::new(port, serial::StdDelay, config).read_image(Truncation::Full)?;
///
/// println!("Image: {:02x?}", &image[..16]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session<P, D> {
    port: P,
    delay: D,
    config: Config,
}

impl<P: Link, D: Delay> Session<P, D> {
    /// Constructs a new session on an opened link.
    pub fn new(port: P, delay: D, config: Config) -> Self {
        Self {
            port,
            delay,
            config,
        }
    }

    /// Probes the device.
    ///
    /// Returns whether the response contained the device signature.
    /// A missing signature is not an error, since the device may still
    /// respond to the following commands.
    pub fn handshake(&mut self) -> Result<bool, P::Error> {
        self.send(&Command::Probe)?;
        self.delay.delay(self.config.probe_settle);

        let mut resp = Vec::new();

        while self.port.bytes_available()? > 0 {
            let mut chunk = [0x00; PROBE_CHUNK_SIZE];
            let len = self.fill(&mut chunk)?;

            if len == 0 {
                break;
            }

            resp.extend_from_slice(&chunk[..len]);
        }

        let found = resp.windows(SIGNATURE.len()).any(|w| w == SIGNATURE);

        if found {
            info!("Burn2 connected");
        } else {
            warn!("Device signature missing from probe response: {resp:02x?}");
        }

        Ok(found)
    }

    /// Prepares the device for sending its memory.
    ///
    /// Stale bytes in both directions are discarded first.
    pub fn arm(&mut self) -> Result<(), P::Error> {
        self.port.discard_buffers()?;
        self.send(&Command::Arm)?;
        self.delay.delay(self.config.arm_settle);

        Ok(())
    }

    /// Sends the poll commands that make the device transmit its memory.
    ///
    /// Always sends the configured number of commands
    /// at the configured interval, without waiting for responses.
    pub fn trigger(&mut self) -> Result<(), P::Error> {
        debug!("Sending {} poll commands", self.config.poll_count);

        for _ in 0..self.config.poll_count {
            self.send(&Command::Poll)?;
            self.delay.delay(self.config.poll_interval);
        }

        Ok(())
    }

    /// Receives the raw transfer.
    ///
    /// Reads until the receive buffer is full, the port reaches end-of-file,
    /// or a read times out after some data has arrived.
    /// The returned buffer still contains the frame trailers.
    ///
    /// # Errors
    ///
    /// - [`Error::TransferFailed`] if no data arrives before the read timeout.
    pub fn receive(&mut self) -> Result<Vec<u8>, P::Error> {
        let mut buf = vec![0x00; self.config.buffer_size];
        let len = self.fill(&mut buf)?;

        debug!("Received {len} of {} bytes", buf.len());
        buf.truncate(len);

        Ok(buf)
    }

    /// Performs a complete read of the device's memory.
    ///
    /// Runs the handshake, arms the device, triggers the transfer
    /// and reconstructs the image, truncated to the selected size.
    /// The link is dropped on return.
    pub fn read_image(mut self, truncation: Truncation) -> Result<MemoryImage, P::Error> {
        self.handshake()?;
        self.arm()?;
        self.trigger()?;

        let raw = self.receive()?;
        let mut image = MemoryImage::from_transfer(&raw);

        debug!("Reconstructed {} image bytes", image.len());
        image.truncate(truncation);

        Ok(image)
    }

    /// Reads into `buf` until it is full.
    ///
    /// Stops early at end-of-file or when a read times out after at
    /// least one byte was received. Returns the number of bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, P::Error> {
        let mut len = 0;

        while len < buf.len() {
            match self.port.read(&mut buf[len..]) {
                Ok(0) => break,
                Ok(n) => {
                    trace!("Read from port: {:02x?}", &buf[len..len + n]);
                    len += n;
                }
                Err(err) if err.kind() == ErrorKind::TimedOut && len > 0 => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(len)
    }

    /// Writes a command to the port.
    fn send(&mut self, cmd: &Command) -> Result<(), P::Error> {
        trace!("Write to port: {cmd:?} {:02x?}", cmd.as_bytes());
        self.port.write_all(cmd.as_bytes())?;

        Ok(())
    }
}
