//! Serial adapter selection.
//!
//! Burn2 devices are connected through an FTDI USB–UART bridge.
//! The bridge is identified by its USB vendor and product ID,
//! which appear in the adapter's hardware ID string:
//!
//! ```plain
//! USB VID:PID=0403:6001 SER=A50285BI
//! ```
//!
//! Use [`find_adapter`] to pick the matching adapter from a list
//! of enumerated descriptors.

use crate::{Error, Result};
use alloc::{format, string::String};
use core::fmt::{Display, Formatter};
use log::{debug, warn};

/// USB vendor ID of the FTDI bridge used by Burn2 devices.
pub const VENDOR_ID: u16 = 0x0403;

/// USB product ID of the FTDI bridge used by Burn2 devices.
pub const PRODUCT_ID: u16 = 0x6001;

/// A serial adapter visible to the operating system.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct AdapterDescriptor {
    /// System path or name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    /// USB vendor ID, if the adapter is a USB device.
    pub vendor_id: Option<u16>,
    /// USB product ID, if the adapter is a USB device.
    pub product_id: Option<u16>,
    /// Textual hardware ID.
    pub hardware_id: String,
}

impl AdapterDescriptor {
    /// Creates a descriptor for a USB adapter.
    ///
    /// The hardware ID is derived from the given IDs and serial number.
    #[must_use]
    pub fn usb(path: String, vendor_id: u16, product_id: u16, serial: Option<&str>) -> Self {
        let mut hardware_id = format!("USB VID:PID={vendor_id:04X}:{product_id:04X}");

        if let Some(serial) = serial {
            hardware_id.push_str(" SER=");
            hardware_id.push_str(serial);
        }

        Self {
            path,
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            hardware_id,
        }
    }

    /// Creates a descriptor for an adapter without USB information.
    #[must_use]
    pub fn other(path: String) -> Self {
        Self {
            path,
            vendor_id: None,
            product_id: None,
            hardware_id: String::from("n/a"),
        }
    }

    /// Checks whether this adapter matches the given IDs.
    #[must_use]
    pub fn matches(&self, vendor_id: u16, product_id: u16, policy: MatchPolicy) -> bool {
        let hwid = self.hardware_id.to_ascii_uppercase();

        match policy {
            MatchPolicy::ProductOnly => hwid.contains(&format!("{product_id:04X}")),
            MatchPolicy::VendorAndProduct => {
                hwid.contains(&format!("VID:PID={vendor_id:04X}:{product_id:04X}"))
            }
        }
    }
}

impl Display for AdapterDescriptor {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        write!(f, "{} ({})", self.path, self.hardware_id)
    }
}

/// Policy used to match adapters against the expected IDs.
#[derive(Default, PartialEq, Eq, Copy, Clone, Debug)]
pub enum MatchPolicy {
    /// The product ID must appear anywhere in the hardware ID.
    ///
    /// The vendor ID is ignored. Other adapters whose hardware ID happens
    /// to contain the product ID digits (e.g. in a serial number) also match.
    #[default]
    ProductOnly,
    /// The hardware ID must contain the exact vendor and product ID pair.
    VendorAndProduct,
}

/// Selects the first adapter matching the given IDs.
///
/// Adapters are considered in enumeration order.
///
/// # Errors
///
/// - [`Error::DeviceNotFound`] if no adapter matches.
pub fn find_adapter<'a, E, I>(
    adapters: I,
    vendor_id: u16,
    product_id: u16,
    policy: MatchPolicy,
) -> Result<&'a AdapterDescriptor, E>
where
    I: IntoIterator<Item = &'a AdapterDescriptor>,
{
    let mut matching = adapters
        .into_iter()
        .filter(|adapter| adapter.matches(vendor_id, product_id, policy));
    let found = matching.next().ok_or(Error::<E>::DeviceNotFound)?;

    debug!("Selected adapter: {found}");

    for other in matching {
        warn!("Ignoring additional matching adapter: {other}");
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;
    use alloc::{string::ToString, vec, vec::Vec};
    use core::convert::Infallible;

    fn adapters() -> Vec<AdapterDescriptor> {
        vec![
            AdapterDescriptor::other("/dev/ttyS0".to_string()),
            AdapterDescriptor::usb("/dev/ttyACM0".to_string(), 0x2e8a, 0x000a, None),
            AdapterDescriptor::usb(
                "/dev/ttyUSB0".to_string(),
                0x0403,
                0x6001,
                Some("A50285BI"),
            ),
            AdapterDescriptor::usb(
                "/dev/ttyUSB1".to_string(),
                0x0403,
                0x6001,
                Some("FT0002"),
            ),
        ]
    }

    #[test]
    fn usb_hardware_id() {
        let adapter =
            AdapterDescriptor::usb("COM3".to_string(), 0x0403, 0x6001, Some("A50285BI"));

        assert_eq!(
            adapter.hardware_id, "USB VID:PID=0403:6001 SER=A50285BI",
            "hardware ID should be correct"
        );
        assert_eq!(
            adapter.to_string(),
            "COM3 (USB VID:PID=0403:6001 SER=A50285BI)",
            "display should be correct"
        );
    }

    #[test]
    fn find_first_matching_adapter() -> Result<(), Infallible> {
        init_logger();

        let adapters = adapters();
        let found = find_adapter::<Infallible, _>(
            &adapters,
            VENDOR_ID,
            PRODUCT_ID,
            MatchPolicy::ProductOnly,
        )?;

        assert_eq!(found.path, "/dev/ttyUSB0", "first match should be selected");

        Ok(())
    }

    #[test]
    fn product_only_ignores_vendor() -> Result<(), Infallible> {
        init_logger();

        let adapters = vec![
            AdapterDescriptor::usb("/dev/ttyUSB0".to_string(), 0x1a86, 0x6001, None),
            AdapterDescriptor::usb("/dev/ttyUSB1".to_string(), 0x0403, 0x6001, None),
        ];

        let found = find_adapter::<Infallible, _>(
            &adapters,
            VENDOR_ID,
            PRODUCT_ID,
            MatchPolicy::ProductOnly,
        )?;

        assert_eq!(found.path, "/dev/ttyUSB0", "vendor ID should be ignored");

        let found = find_adapter::<Infallible, _>(
            &adapters,
            VENDOR_ID,
            PRODUCT_ID,
            MatchPolicy::VendorAndProduct,
        )?;

        assert_eq!(found.path, "/dev/ttyUSB1", "vendor ID should be enforced");

        Ok(())
    }

    #[test]
    fn product_only_matches_serial_number() -> Result<(), Infallible> {
        init_logger();

        let adapters = vec![AdapterDescriptor::usb(
            "/dev/ttyACM0".to_string(),
            0x2341,
            0x0043,
            Some("86001"),
        )];

        let found = find_adapter::<Infallible, _>(
            &adapters,
            VENDOR_ID,
            PRODUCT_ID,
            MatchPolicy::ProductOnly,
        )?;

        assert_eq!(found.path, "/dev/ttyACM0", "substring match should succeed");
        assert_eq!(
            find_adapter::<Infallible, _>(
                &adapters,
                VENDOR_ID,
                PRODUCT_ID,
                MatchPolicy::VendorAndProduct
            ),
            Err(Error::DeviceNotFound),
            "strict match should fail"
        );

        Ok(())
    }

    #[test]
    fn error_device_not_found() {
        init_logger();

        let adapters = adapters();
        let res = find_adapter::<Infallible, _>(
            &adapters[..2],
            VENDOR_ID,
            PRODUCT_ID,
            MatchPolicy::ProductOnly,
        );

        assert_eq!(
            res,
            Err(Error::DeviceNotFound),
            "result should be device not found error"
        );

        let res =
            find_adapter::<Infallible, _>(&[], VENDOR_ID, PRODUCT_ID, MatchPolicy::ProductOnly);

        assert_eq!(
            res,
            Err(Error::DeviceNotFound),
            "result should be device not found error"
        );
    }
}
