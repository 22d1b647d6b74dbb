//! Huey driver: 8-byte HID reports over a control-transfer +
//! interrupt-read pair, EEPROM register reads, and the LCD/CRT measurement
//! path.

use super::usb::{ControlRequest, Direction, Recipient, RequestType, UsbHost};
use super::{Cap, CancelToken, ColdplugInfo, Driver, Kind};
use crate::color::{Matrix3, Vector3, Xyz};
use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;
use std::collections::BTreeMap;
use std::time::Duration;

/// It takes 6 clock cycles of the device's 6 MHz crystal to process one
/// 16-bit increment-and-check-carry, so this is the fastest the onboard
/// counter can tick.
pub const POLL_FREQUENCY: f64 = 1e6;
pub const MAX_READ_RETRIES: u32 = 5;
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(50_000);
/// Picked out of thin air, just to try to match reality. Exposed as a named
/// constant rather than derived, per the open question this crate inherits
/// from the original driver.
pub const XYZ_POST_MULTIPLY: f64 = 3.428;
pub const AMBIENT_UNITS_TO_LUX: f64 = 125.0;

const INTERRUPT_ENDPOINT: u8 = 0x81;
const LENOVO_VID: u16 = 0x0765;
const LENOVO_PID: u16 = 0x5001;

mod cmd {
    pub const GET_STATUS: u8 = 0x00;
    pub const UNLOCK: u8 = 0x01;
    pub const SENSOR_MEASURE_RGB: u8 = 0x02;
    pub const READ_GREEN: u8 = 0x03;
    pub const READ_BLUE: u8 = 0x04;
    pub const REGISTER_READ: u8 = 0x05;
    pub const SET_LEDS: u8 = 0x06;
    pub const GET_AMBIENT: u8 = 0x07;
}

mod rc {
    pub const SUCCESS: u8 = 0x00;
    pub const LOCKED: u8 = 0x01;
    pub const ERROR: u8 = 0x02;
    pub const RETRY: u8 = 0x03;
}

mod eeprom {
    pub const CALIBRATION_DATA_LCD: u8 = 0x00;
    pub const CALIBRATION_DATA_CRT: u8 = 0x30;
    pub const AMBIENT_CALIB_VALUE: u8 = 0x60;
    pub const DARK_OFFSET: u8 = 0x64;
    pub const SERIAL: u8 = 0x78;
}

pub struct HueyDriver {
    usb: Box<dyn UsbHost>,
    lenovo_embedded: bool,
    calibration_lcd: Matrix3,
    calibration_crt: Matrix3,
    dark_offset: Vector3,
    ambient_calibration: f64,
}

impl HueyDriver {
    #[must_use]
    pub fn new(usb: Box<dyn UsbHost>, lenovo_embedded: bool) -> Self {
        Self {
            usb,
            lenovo_embedded,
            calibration_lcd: Matrix3::identity(),
            calibration_crt: Matrix3::identity(),
            dark_offset: Vector3::new(0.0, 0.0, 0.0),
            ambient_calibration: 0.0,
        }
    }

    #[must_use]
    pub fn for_vid_pid(usb: Box<dyn UsbHost>, vid: u16, pid: u16) -> Self {
        Self::new(usb, vid == LENOVO_VID && pid == LENOVO_PID)
    }

    /// Control-write the 8-byte request, then interrupt-read the reply,
    /// retrying on `RETRY` up to [`MAX_READ_RETRIES`] times.
    fn send(&mut self, request: [u8; 8]) -> Result<[u8; 8]> {
        let control = ControlRequest {
            direction: Direction::Out,
            request_type: RequestType::Class,
            recipient: Recipient::Interface,
            request: 0x09,
            value: 0x0200,
            index: 0,
            timeout: CONTROL_TIMEOUT,
        };
        self.usb.control_write(control, &request)?;
        for _ in 0..MAX_READ_RETRIES {
            let mut reply = [0u8; 8];
            self.usb.interrupt_read(INTERRUPT_ENDPOINT, &mut reply, CONTROL_TIMEOUT)?;
            if reply[1] != request[0] {
                return Err(ErrorKind::InputInvalid(format!(
                    "wrong command reply, got 0x{:02x}, expected 0x{:02x}",
                    reply[1], request[0]
                )));
            }
            match reply[0] {
                rc::SUCCESS => return Ok(reply),
                rc::LOCKED => return Err(ErrorKind::AlreadyLocked),
                rc::ERROR => {
                    let hint = String::from_utf8_lossy(&reply[2..]).trim_end_matches('\0').to_string();
                    return Err(ErrorKind::Protocol(format!("failed to issue command: {hint}")));
                }
                rc::RETRY => continue,
                other => return Err(ErrorKind::Protocol(format!("return value unknown: 0x{other:02x}"))),
            }
        }
        Err(ErrorKind::Protocol(format!("gave up retrying after {MAX_READ_RETRIES} reads")))
    }

    fn read_register_byte(&mut self, addr: u8) -> Result<u8> {
        let request = [cmd::REGISTER_READ, addr, 0x00, 0x10, 0x3c, 0x06, 0x00, 0x00];
        let reply = self.send(request)?;
        Ok(reply[3])
    }

    fn read_register_word(&mut self, addr: u8) -> Result<u32> {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_register_byte(addr.wrapping_add(i as u8))?;
        }
        Ok(u32::from_be_bytes(bytes))
    }

    /// The EEPROM stores calibration floats as a raw bit pattern, not a
    /// scaled integer: the 32-bit word is reinterpreted as IEEE-754, not
    /// numerically converted.
    fn read_register_float(&mut self, addr: u8) -> Result<f64> {
        let word = self.read_register_word(addr)?;
        Ok(f32::from_bits(word) as f64)
    }

    fn read_register_vector(&mut self, addr: u8) -> Result<Vector3> {
        let x = self.read_register_float(addr)?;
        let y = self.read_register_float(addr.wrapping_add(4))?;
        let z = self.read_register_float(addr.wrapping_add(8))?;
        Ok(Vector3::new(x, y, z))
    }

    fn read_register_matrix(&mut self, addr: u8) -> Result<Matrix3> {
        let mut rows = [[0.0; 3]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let offset = ((i * 3 + j) * 4) as u8;
                *cell = self.read_register_float(addr.wrapping_add(offset))?;
            }
        }
        Ok(Matrix3::from_rows(rows))
    }

    /// Embedded Lenovo units (vid:pid `0765:5001`) use a different unlock
    /// magic than the retail Huey.
    fn unlock_handshake(&mut self) -> Result<()> {
        let magic: [u8; 4] = if self.lenovo_embedded { *b"huyL" } else { *b"GrMb" };
        let mut request = [cmd::UNLOCK, 0, 0, 0, 0, 0, 0, 0];
        request[1..5].copy_from_slice(&magic);
        self.send(request)?;
        Ok(())
    }

    pub fn set_leds(&mut self, value: u8) -> Result<()> {
        let request = [cmd::SET_LEDS, 0x00, !value, 0x00, 0x00, 0x00, 0x00, 0x00];
        self.send(request)?;
        Ok(())
    }

    pub fn get_ambient_lux(&mut self) -> Result<f64> {
        let request = [cmd::GET_AMBIENT, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let reply = self.send(request)?;
        let raw = u16::from_be_bytes([reply[5], reply[6]]);
        Ok(raw as f64 / AMBIENT_UNITS_TO_LUX)
    }

    fn sample_for_threshold(&mut self, mult: (u16, u16, u16)) -> Result<(u32, u32, u32)> {
        let mut request = [cmd::SENSOR_MEASURE_RGB, 0, 0, 0, 0, 0, 0, 0];
        request[1..3].copy_from_slice(&mult.0.to_be_bytes());
        request[3..5].copy_from_slice(&mult.1.to_be_bytes());
        request[5..7].copy_from_slice(&mult.2.to_be_bytes());
        let reply = self.send(request)?;
        let r = u32::from_be_bytes(reply[2..6].try_into().unwrap());

        let reply = self.send([cmd::READ_GREEN, 0, 0, 0, 0, 0, 0, 0])?;
        let g = u32::from_be_bytes(reply[2..6].try_into().unwrap());

        let reply = self.send([cmd::READ_BLUE, 0, 0, 0, 0, 0, 0, 0])?;
        let b = u32::from_be_bytes(reply[2..6].try_into().unwrap());

        Ok((r, g, b))
    }

    /// Implements the device's 5-step measurement path.
    pub fn take_sample(&mut self, cap: Cap) -> Result<Xyz> {
        if cap.contains(Cap::PROJECTOR) {
            return Err(ErrorKind::NoSupport("Huey cannot measure in projector mode".into()));
        }

        let (raw_r, raw_g, raw_b) = self.sample_for_threshold((1, 1, 1))?;
        let mult_r = ((POLL_FREQUENCY / raw_r.max(1) as f64).max(1.0)) as u16;
        let mult_g = ((POLL_FREQUENCY / raw_g.max(1) as f64).max(1.0)) as u16;
        let mult_b = ((POLL_FREQUENCY / raw_b.max(1) as f64).max(1.0)) as u16;

        let (raw_r, raw_g, raw_b) = self.sample_for_threshold((mult_r, mult_g, mult_b))?;

        let device_rgb = Vector3::new(
            mult_r as f64 * 0.5 * POLL_FREQUENCY / raw_r.max(1) as f64,
            mult_g as f64 * 0.5 * POLL_FREQUENCY / raw_g.max(1) as f64,
            mult_b as f64 * 0.5 * POLL_FREQUENCY / raw_b.max(1) as f64,
        );
        let device_rgb = Vector3::new(
            (device_rgb.0[0] - self.dark_offset.0[0]).max(0.0),
            (device_rgb.0[1] - self.dark_offset.0[1]).max(0.0),
            (device_rgb.0[2] - self.dark_offset.0[2]).max(0.0),
        );

        let calibration = if cap.contains(Cap::CRT) || cap.contains(Cap::PLASMA) {
            &self.calibration_crt
        } else {
            &self.calibration_lcd
        };
        let xyz = calibration.multiply_vector(&device_rgb);
        Ok(Xyz { x: xyz.0[0] * XYZ_POST_MULTIPLY, y: xyz.0[1] * XYZ_POST_MULTIPLY, z: xyz.0[2] * XYZ_POST_MULTIPLY })
    }
}

impl Driver for HueyDriver {
    fn coldplug(&mut self) -> Result<ColdplugInfo> {
        self.calibration_lcd = self.read_register_matrix(eeprom::CALIBRATION_DATA_LCD)?;
        self.calibration_crt = self.read_register_matrix(eeprom::CALIBRATION_DATA_CRT)?;
        self.ambient_calibration = self.read_register_float(eeprom::AMBIENT_CALIB_VALUE)?;
        self.dark_offset = self.read_register_vector(eeprom::DARK_OFFSET)?;
        let serial = self.read_register_word(eeprom::SERIAL).ok().map(|v| v.to_string());
        Ok(ColdplugInfo {
            kind: if self.lenovo_embedded { Kind::HueyLenovo } else { Kind::Huey },
            caps: Cap::LCD | Cap::CRT | Cap::PLASMA | Cap::AMBIENT | Cap::SPOT,
            native: true,
            embedded: self.lenovo_embedded,
            serial,
            model: Some("Huey".into()),
            vendor: Some("X-Rite".into()),
        })
    }

    fn lock(&mut self, _cancel: &CancelToken) -> Result<()> {
        self.unlock_handshake()
    }

    fn unlock(&mut self, _cancel: &CancelToken) -> Result<()> {
        // The device has no separate teardown command; the handshake in
        // `lock` is the only warmup it performs.
        Ok(())
    }

    fn get_sample(&mut self, cap: Cap, _cancel: &CancelToken) -> Result<Xyz> {
        if cap.contains(Cap::AMBIENT) {
            let lux = self.get_ambient_lux()?;
            return Ok(Xyz { x: 0.0, y: lux, z: 0.0 });
        }
        self.take_sample(cap)
    }

    fn get_spectrum(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Spectrum> {
        Err(ErrorKind::NoSupport("Huey has no spectrometer".into()))
    }

    fn set_options(&mut self, _options: &BTreeMap<String, String>, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    fn dump_device(&self) -> String {
        format!(
            "Huey: lenovo_embedded={} ambient_calibration={}",
            self.lenovo_embedded, self.ambient_calibration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::usb::mock::MockUsb;

    fn reply(command: u8, code: u8, payload: [u8; 6]) -> Vec<u8> {
        let mut r = vec![code, command];
        r.extend_from_slice(&payload);
        r
    }

    #[test]
    fn retries_on_retry_reply_then_succeeds() {
        let mut usb = MockUsb::default();
        usb.interrupt_replies.push_back(reply(cmd::GET_STATUS, rc::RETRY, [0; 6]));
        usb.interrupt_replies.push_back(reply(cmd::GET_STATUS, rc::SUCCESS, [9, 0, 0, 0, 0, 0]));
        let mut driver = HueyDriver::new(Box::new(usb), false);
        let reply = driver.send([cmd::GET_STATUS, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(reply[0], rc::SUCCESS);
    }

    #[test]
    fn locked_reply_surfaces_already_locked() {
        let mut usb = MockUsb::default();
        usb.interrupt_replies.push_back(reply(cmd::UNLOCK, rc::LOCKED, [0; 6]));
        let mut driver = HueyDriver::new(Box::new(usb), false);
        assert_eq!(driver.unlock_handshake(), Err(ErrorKind::AlreadyLocked));
    }

    #[test]
    fn mismatched_echo_is_rejected() {
        let mut usb = MockUsb::default();
        usb.interrupt_replies.push_back(reply(cmd::GET_AMBIENT, rc::SUCCESS, [0; 6]));
        let mut driver = HueyDriver::new(Box::new(usb), false);
        assert!(driver.send([cmd::GET_STATUS, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn projector_mode_is_unsupported() {
        let usb = MockUsb::default();
        let mut driver = HueyDriver::new(Box::new(usb), false);
        assert_eq!(
            driver.take_sample(Cap::PROJECTOR),
            Err(ErrorKind::NoSupport("Huey cannot measure in projector mode".into()))
        );
    }

    /// Fixed raw ticks + dark offset + identity calibration: the XYZ output
    /// should match the device's step-5 formula exactly ("Huey
    /// arithmetic").
    #[test]
    fn measurement_arithmetic_is_deterministic() {
        let mut usb = MockUsb::default();
        // Both probe and re-measure see the same 1,000,000-tick raw count,
        // so the computed multiplier is exactly 1 for every channel.
        let raw = (1_000_000u32).to_be_bytes();
        let mk = |command: u8| {
            let mut payload = [0u8; 6];
            payload[0..4].copy_from_slice(&raw);
            reply(command, rc::SUCCESS, payload)
        };
        for _ in 0..2 {
            usb.interrupt_replies.push_back(mk(cmd::SENSOR_MEASURE_RGB));
            usb.interrupt_replies.push_back(mk(cmd::READ_GREEN));
            usb.interrupt_replies.push_back(mk(cmd::READ_BLUE));
        }
        let mut driver = HueyDriver::new(Box::new(usb), false);
        driver.dark_offset = Vector3::new(0.1, 0.1, 0.1);
        driver.calibration_lcd = Matrix3::identity();

        let xyz = driver.take_sample(Cap::LCD).unwrap();
        // device_rgb before dark-offset = 1 * 0.5 * 1e6 / 1e6 = 0.5 each;
        // minus 0.1 dark offset = 0.4; times identity; times 3.428.
        let expected = 0.4 * XYZ_POST_MULTIPLY;
        assert!((xyz.x - expected).abs() < 1e-6);
        assert!((xyz.y - expected).abs() < 1e-6);
        assert!((xyz.z - expected).abs() < 1e-6);
    }
}
