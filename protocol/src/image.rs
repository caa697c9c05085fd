//! Memory image reconstruction.
//!
//! The device streams its memory as a sequence of 258-byte frames,
//! each consisting of 256 payload bytes followed by a 2-byte trailer:
//!
//! ```plain
//! |<------- 256 bytes ------->|<- 2 bytes ->|
//! +---------------------------+-------------+
//! |          PAYLOAD          |   TRAILER   |
//! +---------------------------+-------------+
//! ```
//!
//! The trailer carries a checksum that is discarded without verification.
//! The transfer buffer is padded with zeros past the last byte received,
//! so trailing `0x00` bytes are removed before splitting it into frames.
//! The final frame may be cut short, in which case only the payload bytes
//! actually present are kept.

use alloc::vec::Vec;
use core::ops::Deref;

/// Size of a single frame within the raw transfer.
pub const FRAME_SIZE: usize = PAYLOAD_SIZE + TRAILER_SIZE;

/// Number of payload bytes at the start of every frame.
pub const PAYLOAD_SIZE: usize = 256;

/// Number of trailer (checksum) bytes at the end of every frame.
pub const TRAILER_SIZE: usize = 2;

/// Maximum number of bytes the device sends in one bulk transfer.
pub const MAX_TRANSFER_SIZE: usize = 64_000;

/// Removes the trailing zero padding from a raw transfer buffer.
///
/// Leading zeros are part of the first frame and are kept.
#[must_use]
pub fn strip_padding(raw: &[u8]) -> &[u8] {
    let end = raw.iter().rposition(|&b| b != 0x00).map_or(0, |pos| pos + 1);

    &raw[..end]
}

/// Concatenates the payload bytes of all frames in `raw`.
///
/// A trailing partial frame contributes at most [`PAYLOAD_SIZE`] bytes.
#[must_use]
pub fn deframe(raw: &[u8]) -> Vec<u8> {
    let mut image = Vec::with_capacity(raw.len() / FRAME_SIZE * PAYLOAD_SIZE + PAYLOAD_SIZE);

    for frame in raw.chunks(FRAME_SIZE) {
        image.extend_from_slice(&frame[..frame.len().min(PAYLOAD_SIZE)]);
    }

    image
}

/// Output size selected before reading the device.
///
/// Parses from and displays as `full`, `56k` or `32k`.
#[derive(
    strum::Display, strum::EnumString, Default, PartialEq, Eq, Copy, Clone, Debug,
)]
#[strum(ascii_case_insensitive)]
pub enum Truncation {
    /// Keep the whole image.
    #[default]
    #[strum(serialize = "full")]
    Full,
    /// Keep the first 56 KiB.
    #[strum(serialize = "56k")]
    Trim56k,
    /// Keep the first 32 KiB.
    #[strum(serialize = "32k")]
    Trim32k,
}

impl Truncation {
    /// Returns the number of bytes to keep, or `None` for [`Truncation::Full`].
    #[must_use]
    pub const fn len(self) -> Option<usize> {
        match self {
            Self::Full => None,
            Self::Trim56k => Some(56 * 1024),
            Self::Trim32k => Some(32 * 1024),
        }
    }

    /// Parses a truncation from `full`, `56k` or `32k`, ignoring case.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    ///   for any other input.
    pub fn parse<E>(s: &str) -> crate::Result<Self, E> {
        s.parse()
            .map_err(|_: strum::ParseError| crate::Error::InvalidConfiguration)
    }

    /// Selects the truncation matching an explicit byte length.
    ///
    /// Only the two supported sizes are accepted.
    pub fn from_len<E>(len: usize) -> crate::Result<Self, E> {
        [Self::Trim56k, Self::Trim32k]
            .into_iter()
            .find(|t| t.len() == Some(len))
            .ok_or(crate::Error::InvalidConfiguration)
    }
}

/// A memory image with all frame trailers removed.
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct MemoryImage(Vec<u8>);

impl MemoryImage {
    /// Reconstructs the image from a raw transfer buffer.
    #[must_use]
    pub fn from_transfer(raw: &[u8]) -> Self {
        Self(deframe(strip_padding(raw)))
    }

    /// Shortens the image to the selected size.
    ///
    /// Images that are already shorter are left untouched.
    pub fn truncate(&mut self, truncation: Truncation) {
        if let Some(len) = truncation.len() {
            self.0.truncate(len);
        }
    }

    /// Returns the image contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the image, returning its contents.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for MemoryImage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for MemoryImage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for MemoryImage {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}
