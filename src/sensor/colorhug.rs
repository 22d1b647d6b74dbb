//! ColorHug driver: 64-byte HID reports over a pair of
//! interrupt endpoints, a fixed retval→[`ErrorKind`] table, and calibration
//! indexing through a technology→index map.

use super::usb::UsbHost;
use super::{Cap, CancelToken, ColdplugInfo, Driver, Kind};
use crate::color::{Matrix3, Vector3, Xyz};
use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;
use std::collections::BTreeMap;
use std::time::Duration;

const EP_SIZE: usize = 64;
const EP_OUT: u8 = 0x01;
const EP_IN: u8 = 0x81;
const TRANSFER_TIMEOUT: Duration = Duration::from_millis(5_000);

const BUFFER_INPUT_CMD: usize = 0x00;
const BUFFER_INPUT_DATA: usize = 0x01;
const BUFFER_OUTPUT_RETVAL: usize = 0x00;
const BUFFER_OUTPUT_CMD: usize = 0x01;
const BUFFER_OUTPUT_DATA: usize = 0x02;

pub const WRITE_EEPROM_MAGIC: &[u8] = b"Un1c0rn2";
pub const CALIBRATION_MAX: u8 = 64;
pub const CALIBRATION_INDEX_LCD: u8 = CALIBRATION_MAX;
pub const CALIBRATION_INDEX_CRT: u8 = CALIBRATION_MAX + 1;
pub const CALIBRATION_INDEX_PROJECTOR: u8 = CALIBRATION_MAX + 2;

mod cmd {
    pub const GET_COLOR_SELECT: u8 = 0x01;
    pub const SET_COLOR_SELECT: u8 = 0x02;
    pub const GET_MULTIPLIER: u8 = 0x03;
    pub const SET_MULTIPLIER: u8 = 0x04;
    pub const GET_INTEGRAL_TIME: u8 = 0x05;
    pub const SET_INTEGRAL_TIME: u8 = 0x06;
    pub const GET_FIRMWARE_VERSION: u8 = 0x07;
    pub const GET_CALIBRATION: u8 = 0x09;
    pub const SET_CALIBRATION: u8 = 0x0a;
    pub const GET_SERIAL_NUMBER: u8 = 0x0b;
    pub const SET_SERIAL_NUMBER: u8 = 0x0c;
    pub const GET_LEDS: u8 = 0x0d;
    pub const SET_LEDS: u8 = 0x0e;
    pub const GET_DARK_OFFSETS: u8 = 0x0f;
    pub const SET_DARK_OFFSETS: u8 = 0x10;
    pub const WRITE_EEPROM: u8 = 0x20;
    pub const TAKE_READING_RAW: u8 = 0x21;
    pub const TAKE_READINGS: u8 = 0x22;
    pub const TAKE_READING_XYZ: u8 = 0x23;
    pub const RESET: u8 = 0x24;
    pub const READ_FLASH: u8 = 0x25;
    pub const WRITE_FLASH: u8 = 0x26;
    pub const BOOT_FLASH: u8 = 0x27;
    pub const SET_FLASH_SUCCESS: u8 = 0x28;
    pub const ERASE_FLASH: u8 = 0x29;
    pub const GET_POST_SCALE: u8 = 0x2a;
    pub const SET_POST_SCALE: u8 = 0x2b;
    pub const GET_PRE_SCALE: u8 = 0x2c;
    pub const SET_PRE_SCALE: u8 = 0x2d;
    pub const GET_CALIBRATION_MAP: u8 = 0x2e;
    pub const SET_CALIBRATION_MAP: u8 = 0x2f;
    pub const GET_HARDWARE_VERSION: u8 = 0x30;
}

/// Device-side error codes, distinct from the crate-wide [`ErrorKind`]; see
/// [`ch_error_to_kind`] for the mapping applied to every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChError {
    None,
    UnknownCmd,
    WrongUnlockCode,
    NotImplemented,
    UnderflowSensor,
    NoSerial,
    Watchdog,
    InvalidAddress,
    InvalidLength,
    InvalidChecksum,
    InvalidValue,
    UnknownCmdForBootloader,
    OverflowMultiply,
    OverflowAddition,
    OverflowSensor,
    OverflowStack,
    NoCalibration,
    DeviceDeactivated,
    IncompleteRequest,
    Unrecognized(u8),
}

impl ChError {
    fn from_byte(b: u8) -> Self {
        match b {
            0x00 => ChError::None,
            0x01 => ChError::UnknownCmd,
            0x02 => ChError::WrongUnlockCode,
            0x03 => ChError::NotImplemented,
            0x04 => ChError::UnderflowSensor,
            0x05 => ChError::NoSerial,
            0x06 => ChError::Watchdog,
            0x07 => ChError::InvalidAddress,
            0x08 => ChError::InvalidLength,
            0x09 => ChError::InvalidChecksum,
            0x0a => ChError::InvalidValue,
            0x0b => ChError::UnknownCmdForBootloader,
            0x0c => ChError::OverflowMultiply,
            0x0d => ChError::OverflowAddition,
            0x0e => ChError::OverflowSensor,
            0x0f => ChError::OverflowStack,
            0x10 => ChError::NoCalibration,
            0x11 => ChError::DeviceDeactivated,
            0x12 => ChError::IncompleteRequest,
            other => ChError::Unrecognized(other),
        }
    }
}

/// Maps a device retval to the crate-wide error taxonomy.
pub fn ch_error_to_kind(error: ChError) -> ErrorKind {
    match error {
        ChError::None => ErrorKind::Internal("ch_error_to_kind called on success".into()),
        ChError::UnknownCmd | ChError::UnknownCmdForBootloader => ErrorKind::Protocol("unknown command".into()),
        ChError::WrongUnlockCode => ErrorKind::Protocol("wrong unlock code".into()),
        ChError::NotImplemented => ErrorKind::NoSupport("not implemented".into()),
        ChError::UnderflowSensor
        | ChError::OverflowMultiply
        | ChError::OverflowAddition
        | ChError::OverflowSensor
        | ChError::OverflowStack => ErrorKind::OutOfRange("sensor arithmetic overflow".into()),
        ChError::NoSerial => ErrorKind::NotFound("no serial number".into()),
        ChError::Watchdog => ErrorKind::Internal("device watchdog fired".into()),
        ChError::InvalidAddress | ChError::InvalidValue => ErrorKind::InputInvalid("invalid address or value".into()),
        ChError::InvalidLength | ChError::InvalidChecksum | ChError::IncompleteRequest => {
            ErrorKind::Protocol("invalid length, checksum, or incomplete request".into())
        }
        ChError::NoCalibration => ErrorKind::NoData("no calibration".into()),
        ChError::DeviceDeactivated => ErrorKind::NoSupport("device deactivated".into()),
        ChError::Unrecognized(b) => ErrorKind::Protocol(format!("unrecognized retval 0x{b:02x}")),
    }
}

/// A flat 20-byte SHA1 digest, hex round-tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sha1 {
    pub bytes: [u8; 20],
}

impl Sha1 {
    #[must_use]
    pub fn to_string(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != 40 {
            return Err(ErrorKind::InputInvalid(format!("invalid SHA1 hash '{value}'")));
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &value[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| ErrorKind::InputInvalid(format!("invalid SHA1 hash '{value}'")))?;
        }
        Ok(Self { bytes })
    }
}

/// Resolves the calibration index a measurement should be requested at for
/// a given cap, through the technology→index slots reserved past
/// [`CALIBRATION_MAX`].
#[must_use]
pub fn calibration_index_for_cap(cap: Cap) -> u8 {
    if cap.contains(Cap::PROJECTOR) {
        CALIBRATION_INDEX_PROJECTOR
    } else if cap.contains(Cap::CRT) {
        CALIBRATION_INDEX_CRT
    } else {
        CALIBRATION_INDEX_LCD
    }
}

pub struct ColorHugDriver {
    usb: Box<dyn UsbHost>,
    plus: bool,
    serial: Option<u32>,
    firmware_version: Option<(u16, u16, u16)>,
}

impl ColorHugDriver {
    #[must_use]
    pub fn new(usb: Box<dyn UsbHost>, plus: bool) -> Self {
        Self { usb, plus, serial: None, firmware_version: None }
    }

    /// Writes one command with its payload, reads back the fixed-size reply,
    /// and validates retval/cmd-echo/length before handing back the data
    /// portion. One command in flight at a time; there is no ambient FIFO
    /// beyond that ordering.
    fn send(&mut self, command: u8, payload: &[u8], out_len: usize) -> Result<Vec<u8>> {
        let mut request = [0u8; EP_SIZE];
        request[BUFFER_INPUT_CMD] = command;
        request[BUFFER_INPUT_DATA..BUFFER_INPUT_DATA + payload.len()].copy_from_slice(payload);
        self.usb.interrupt_write(EP_OUT, &request, TRANSFER_TIMEOUT)?;

        let mut reply = [0u8; EP_SIZE];
        let actual_len = self.usb.interrupt_read(EP_IN, &mut reply, TRANSFER_TIMEOUT)?;

        let retval = ChError::from_byte(reply[BUFFER_OUTPUT_RETVAL]);
        if retval != ChError::None {
            return Err(ch_error_to_kind(retval));
        }
        if reply[BUFFER_OUTPUT_CMD] != command {
            return Err(ErrorKind::Protocol(format!(
                "cmd echo mismatch: got 0x{:02x}, expected 0x{command:02x}",
                reply[BUFFER_OUTPUT_CMD]
            )));
        }
        if actual_len != out_len + BUFFER_OUTPUT_DATA {
            return Err(ErrorKind::Protocol(format!(
                "reply length {actual_len}, expected {}",
                out_len + BUFFER_OUTPUT_DATA
            )));
        }
        Ok(reply[BUFFER_OUTPUT_DATA..BUFFER_OUTPUT_DATA + out_len].to_vec())
    }

    pub fn get_color_select(&mut self) -> Result<u8> {
        Ok(self.send(cmd::GET_COLOR_SELECT, &[], 1)?[0])
    }

    pub fn set_color_select(&mut self, value: u8) -> Result<()> {
        self.send(cmd::SET_COLOR_SELECT, &[value], 0)?;
        Ok(())
    }

    pub fn get_multiplier(&mut self) -> Result<u8> {
        Ok(self.send(cmd::GET_MULTIPLIER, &[], 1)?[0])
    }

    pub fn set_multiplier(&mut self, value: u8) -> Result<()> {
        self.send(cmd::SET_MULTIPLIER, &[value], 0)?;
        Ok(())
    }

    pub fn get_integral_time(&mut self) -> Result<u16> {
        let data = self.send(cmd::GET_INTEGRAL_TIME, &[], 2)?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    pub fn set_integral_time(&mut self, value: u16) -> Result<()> {
        self.send(cmd::SET_INTEGRAL_TIME, &value.to_le_bytes(), 0)?;
        Ok(())
    }

    pub fn get_firmware_version(&mut self) -> Result<(u16, u16, u16)> {
        let data = self.send(cmd::GET_FIRMWARE_VERSION, &[], 6)?;
        let version = (
            u16::from_le_bytes([data[0], data[1]]),
            u16::from_le_bytes([data[2], data[3]]),
            u16::from_le_bytes([data[4], data[5]]),
        );
        self.firmware_version = Some(version);
        Ok(version)
    }

    pub fn get_calibration(&mut self, index: u8) -> Result<(Matrix3, String)> {
        let data = self.send(cmd::GET_CALIBRATION, &[index], 9 * 4 + 24)?;
        let mut floats = [0.0f64; 9];
        for (i, chunk) in data[..36].chunks_exact(4).enumerate() {
            floats[i] = f32::from_le_bytes(chunk.try_into().unwrap()) as f64;
        }
        let matrix = Matrix3::from_rows([[floats[0], floats[1], floats[2]], [floats[3], floats[4], floats[5]], [
            floats[6], floats[7], floats[8],
        ]]);
        let description = String::from_utf8_lossy(&data[36..]).trim_end_matches('\0').to_string();
        Ok((matrix, description))
    }

    pub fn set_calibration(&mut self, index: u8, matrix: &Matrix3, description: &str) -> Result<()> {
        let mut payload = Vec::with_capacity(1 + 36 + 24);
        payload.push(index);
        for row in matrix.0 {
            for cell in row {
                payload.extend_from_slice(&(cell as f32).to_le_bytes());
            }
        }
        let mut name = [0u8; 24];
        let bytes = description.as_bytes();
        let n = bytes.len().min(24);
        name[..n].copy_from_slice(&bytes[..n]);
        payload.extend_from_slice(&name);
        self.send(cmd::SET_CALIBRATION, &payload, 0)?;
        Ok(())
    }

    pub fn get_serial_number(&mut self) -> Result<u32> {
        let data = self.send(cmd::GET_SERIAL_NUMBER, &[], 4)?;
        let serial = u32::from_le_bytes(data.try_into().unwrap());
        self.serial = Some(serial);
        Ok(serial)
    }

    pub fn set_serial_number(&mut self, value: u32) -> Result<()> {
        self.send(cmd::SET_SERIAL_NUMBER, &value.to_le_bytes(), 0)?;
        Ok(())
    }

    pub fn get_leds(&mut self) -> Result<u8> {
        Ok(self.send(cmd::GET_LEDS, &[], 1)?[0])
    }

    pub fn set_leds(&mut self, value: u8, repeat: u8, on_time: u8, off_time: u8) -> Result<()> {
        self.send(cmd::SET_LEDS, &[value, repeat, on_time, off_time], 0)?;
        Ok(())
    }

    pub fn get_dark_offsets(&mut self) -> Result<Vector3> {
        let data = self.send(cmd::GET_DARK_OFFSETS, &[], 6)?;
        Ok(Vector3::new(
            u16::from_le_bytes([data[0], data[1]]) as f64,
            u16::from_le_bytes([data[2], data[3]]) as f64,
            u16::from_le_bytes([data[4], data[5]]) as f64,
        ))
    }

    pub fn set_dark_offsets(&mut self, offsets: &Vector3) -> Result<()> {
        let mut payload = Vec::with_capacity(6);
        for v in offsets.0 {
            payload.extend_from_slice(&(v as u16).to_le_bytes());
        }
        self.send(cmd::SET_DARK_OFFSETS, &payload, 0)?;
        Ok(())
    }

    pub fn write_eeprom(&mut self) -> Result<()> {
        self.send(cmd::WRITE_EEPROM, WRITE_EEPROM_MAGIC, 0)?;
        Ok(())
    }

    pub fn take_reading_raw(&mut self) -> Result<(u16, u16, u16)> {
        let data = self.send(cmd::TAKE_READING_RAW, &[], 6)?;
        Ok((u16::from_le_bytes([data[0], data[1]]), u16::from_le_bytes([data[2], data[3]]), u16::from_le_bytes([
            data[4], data[5],
        ])))
    }

    pub fn take_readings(&mut self) -> Result<Vector3> {
        let data = self.send(cmd::TAKE_READINGS, &[], 12)?;
        let mut floats = [0.0f64; 3];
        for (i, chunk) in data.chunks_exact(4).enumerate() {
            floats[i] = f32::from_le_bytes(chunk.try_into().unwrap()) as f64;
        }
        Ok(Vector3::new(floats[0], floats[1], floats[2]))
    }

    pub fn take_reading_xyz(&mut self, calibration_index: u8) -> Result<Xyz> {
        let data = self.send(cmd::TAKE_READING_XYZ, &[calibration_index], 12)?;
        let mut floats = [0.0f64; 3];
        for (i, chunk) in data.chunks_exact(4).enumerate() {
            floats[i] = f32::from_le_bytes(chunk.try_into().unwrap()) as f64;
        }
        Ok(Xyz { x: floats[0], y: floats[1], z: floats[2] })
    }

    pub fn reset(&mut self) -> Result<()> {
        self.send(cmd::RESET, &[], 0)?;
        Ok(())
    }

    pub fn read_flash(&mut self, address: u16, length: u8) -> Result<Vec<u8>> {
        let mut payload = address.to_le_bytes().to_vec();
        payload.push(length);
        self.send(cmd::READ_FLASH, &payload, length as usize)
    }

    pub fn erase_flash(&mut self, address: u16, length: u16) -> Result<()> {
        let mut payload = address.to_le_bytes().to_vec();
        payload.extend_from_slice(&length.to_le_bytes());
        self.send(cmd::ERASE_FLASH, &payload, 0)?;
        Ok(())
    }

    pub fn write_flash(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let mut payload = address.to_le_bytes().to_vec();
        payload.push(data.len() as u8);
        payload.extend_from_slice(data);
        self.send(cmd::WRITE_FLASH, &payload, 0)?;
        Ok(())
    }

    pub fn boot_flash(&mut self) -> Result<()> {
        self.send(cmd::BOOT_FLASH, &[], 0)?;
        Ok(())
    }

    pub fn set_flash_success(&mut self, value: u8) -> Result<()> {
        self.send(cmd::SET_FLASH_SUCCESS, &[value], 0)?;
        Ok(())
    }

    pub fn get_calibration_map(&mut self) -> Result<Vec<u8>> {
        self.send(cmd::GET_CALIBRATION_MAP, &[], CALIBRATION_MAX as usize)
    }

    pub fn set_calibration_map(&mut self, map: &[u8]) -> Result<()> {
        self.send(cmd::SET_CALIBRATION_MAP, map, 0)?;
        Ok(())
    }

    pub fn get_hardware_version(&mut self) -> Result<u8> {
        Ok(self.send(cmd::GET_HARDWARE_VERSION, &[], 1)?[0])
    }
}

impl Driver for ColorHugDriver {
    fn coldplug(&mut self) -> Result<ColdplugInfo> {
        let serial = self.get_serial_number().ok().map(|v| v.to_string());
        let firmware = self.get_firmware_version()?;
        Ok(ColdplugInfo {
            kind: if self.plus { Kind::ColorHugPlus } else { Kind::ColorHug },
            caps: Cap::LCD | Cap::CRT | Cap::PROJECTOR | Cap::LED | Cap::SPOT,
            native: true,
            embedded: false,
            serial,
            model: Some(format!("ColorHug (firmware {}.{}.{})", firmware.0, firmware.1, firmware.2)),
            vendor: Some("Hughski".into()),
        })
    }

    fn lock(&mut self, _cancel: &CancelToken) -> Result<()> {
        self.get_serial_number()?;
        Ok(())
    }

    fn unlock(&mut self, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    fn get_sample(&mut self, cap: Cap, _cancel: &CancelToken) -> Result<Xyz> {
        self.take_reading_xyz(calibration_index_for_cap(cap))
    }

    fn get_spectrum(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Spectrum> {
        Err(ErrorKind::NoSupport("ColorHug has no spectrometer".into()))
    }

    fn set_options(&mut self, options: &BTreeMap<String, String>, _cancel: &CancelToken) -> Result<()> {
        if let Some(time) = options.get("integral-time") {
            let value: u16 = time.parse().map_err(|_| ErrorKind::InputInvalid(format!("bad integral-time '{time}'")))?;
            self.set_integral_time(value)?;
        }
        Ok(())
    }

    fn dump_device(&self) -> String {
        format!("ColorHug: plus={} serial={:?} firmware={:?}", self.plus, self.serial, self.firmware_version)
    }
}
