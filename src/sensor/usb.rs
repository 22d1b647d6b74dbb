//! USB host interface: a small
//! blocking trait the drivers code against, plus a `rusb`-backed
//! implementation for real hardware. Every transfer carries its own
//! timeout; there is no ambient event loop.

use crate::error::{ErrorKind, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// A control transfer's setup packet, minus the payload.
#[derive(Debug, Clone, Copy)]
pub struct ControlRequest {
    pub direction: Direction,
    pub request_type: RequestType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub timeout: Duration,
}

/// Blocking USB operations. Drivers hold a `Box<dyn UsbHost>` so tests can
/// substitute a mock wire without real hardware.
pub trait UsbHost: Send {
    fn claim_interface(&mut self, iface: u8) -> Result<()>;
    fn release_interface(&mut self, iface: u8) -> Result<()>;
    fn control_write(&mut self, req: ControlRequest, buffer: &[u8]) -> Result<usize>;
    fn control_read(&mut self, req: ControlRequest, buffer: &mut [u8]) -> Result<usize>;
    fn bulk_write(&mut self, endpoint: u8, buffer: &[u8], timeout: Duration) -> Result<usize>;
    fn bulk_read(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize>;
    fn interrupt_write(&mut self, endpoint: u8, buffer: &[u8], timeout: Duration) -> Result<usize>;
    fn interrupt_read(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize>;
}

fn request_type_byte(req: &ControlRequest) -> u8 {
    let direction = match req.direction {
        Direction::In => rusb::Direction::In,
        Direction::Out => rusb::Direction::Out,
    };
    let request_type = match req.request_type {
        RequestType::Standard => rusb::RequestType::Standard,
        RequestType::Class => rusb::RequestType::Class,
        RequestType::Vendor => rusb::RequestType::Vendor,
    };
    let recipient = match req.recipient {
        Recipient::Device => rusb::Recipient::Device,
        Recipient::Interface => rusb::Recipient::Interface,
        Recipient::Endpoint => rusb::Recipient::Endpoint,
        Recipient::Other => rusb::Recipient::Other,
    };
    rusb::request_type(direction, request_type, recipient)
}

fn map_usb_error(e: rusb::Error) -> ErrorKind {
    ErrorKind::Internal(format!("usb: {e}"))
}

/// A claimed device handle on the default `rusb` context.
pub struct RusbHost {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
}

impl RusbHost {
    /// Opens the first device matching `(vid, pid)`.
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        let handle = rusb::open_device_with_vid_pid(vid, pid)
            .ok_or_else(|| ErrorKind::NotFound(format!("no usb device {vid:04x}:{pid:04x}")))?;
        Ok(Self { handle })
    }

    /// Enumerates currently attached devices matching `(vid, pid)`.
    pub fn enumerate(vid: u16, pid: u16) -> Result<Vec<(u8, u8)>> {
        let devices = rusb::devices().map_err(map_usb_error)?;
        let mut found = Vec::new();
        for device in devices.iter() {
            let desc = device.device_descriptor().map_err(map_usb_error)?;
            if desc.vendor_id() == vid && desc.product_id() == pid {
                found.push((device.bus_number(), device.address()));
            }
        }
        Ok(found)
    }
}

impl UsbHost for RusbHost {
    fn claim_interface(&mut self, iface: u8) -> Result<()> {
        self.handle.claim_interface(iface).map_err(map_usb_error)
    }

    fn release_interface(&mut self, iface: u8) -> Result<()> {
        self.handle.release_interface(iface).map_err(map_usb_error)
    }

    fn control_write(&mut self, req: ControlRequest, buffer: &[u8]) -> Result<usize> {
        self.handle
            .write_control(request_type_byte(&req), req.request, req.value, req.index, buffer, req.timeout)
            .map_err(map_usb_error)
    }

    fn control_read(&mut self, req: ControlRequest, buffer: &mut [u8]) -> Result<usize> {
        self.handle
            .read_control(request_type_byte(&req), req.request, req.value, req.index, buffer, req.timeout)
            .map_err(map_usb_error)
    }

    fn bulk_write(&mut self, endpoint: u8, buffer: &[u8], timeout: Duration) -> Result<usize> {
        self.handle.write_bulk(endpoint, buffer, timeout).map_err(map_usb_error)
    }

    fn bulk_read(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle.read_bulk(endpoint, buffer, timeout).map_err(map_usb_error)
    }

    fn interrupt_write(&mut self, endpoint: u8, buffer: &[u8], timeout: Duration) -> Result<usize> {
        self.handle.write_interrupt(endpoint, buffer, timeout).map_err(map_usb_error)
    }

    fn interrupt_read(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle.read_interrupt(endpoint, buffer, timeout).map_err(map_usb_error)
    }
}

#[cfg(test)]
pub mod mock {
    //! An in-memory [`UsbHost`] for driver unit tests: a FIFO of canned
    //! interrupt/bulk replies keyed by endpoint, and a recording of every
    //! control transfer issued.
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct MockUsb {
        pub control_writes: Vec<(ControlRequest, Vec<u8>)>,
        pub interrupt_replies: VecDeque<Vec<u8>>,
        pub bulk_replies: VecDeque<Vec<u8>>,
    }

    impl UsbHost for MockUsb {
        fn claim_interface(&mut self, _iface: u8) -> Result<()> {
            Ok(())
        }

        fn release_interface(&mut self, _iface: u8) -> Result<()> {
            Ok(())
        }

        fn control_write(&mut self, req: ControlRequest, buffer: &[u8]) -> Result<usize> {
            self.control_writes.push((req, buffer.to_vec()));
            Ok(buffer.len())
        }

        fn control_read(&mut self, _req: ControlRequest, buffer: &mut [u8]) -> Result<usize> {
            Ok(buffer.len())
        }

        fn bulk_write(&mut self, _endpoint: u8, buffer: &[u8], _timeout: Duration) -> Result<usize> {
            Ok(buffer.len())
        }

        fn bulk_read(&mut self, _endpoint: u8, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
            let reply = self.bulk_replies.pop_front().ok_or(ErrorKind::NoData("mock bulk queue empty".into()))?;
            let n = reply.len().min(buffer.len());
            buffer[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }

        fn interrupt_write(&mut self, _endpoint: u8, buffer: &[u8], _timeout: Duration) -> Result<usize> {
            Ok(buffer.len())
        }

        fn interrupt_read(&mut self, _endpoint: u8, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
            let reply = self.interrupt_replies.pop_front().ok_or(ErrorKind::NoData("mock interrupt queue empty".into()))?;
            let n = reply.len().min(buffer.len());
            buffer[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    #[test]
    fn mock_serves_queued_interrupt_replies_in_order() {
        let mut mock = MockUsb::default();
        mock.interrupt_replies.push_back(vec![1, 2, 3]);
        mock.interrupt_replies.push_back(vec![4, 5]);
        let mut buf = [0u8; 8];
        let n = mock.interrupt_read(0x81, &mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        let n = mock.interrupt_read(0x81, &mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], &[4, 5]);
    }
}
