//! Spark driver: an Ocean Optics framed protocol over bulk
//! endpoints, with an auto-exposure loop that hunts for an integration time
//! landing the signal in the sensor's linear range.

use super::usb::UsbHost;
use super::{Cap, CancelToken, ColdplugInfo, Driver, Kind};
use crate::color::Xyz;
use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::time::Duration;

const HEADER_LEN: usize = 44;
const FOOTER_LEN: usize = 20;
const FRAME_SIZE: usize = 64;
const BULK_EP_OUT: u8 = 0x01;
const BULK_EP_IN: u8 = 0x81;
const USB_TIMEOUT: Duration = Duration::from_millis(50_000);

const START_BYTES: u16 = 0xc1c0;
const PROTOCOL_VERSION: u16 = 0x1000;
const END_BYTES: u32 = 0xc5c4c3c2;
const CHECKSUM_KIND_MD5: u8 = 0x01;
const FLAG_ACK_REQUIRED: u8 = 0x01;

const OFF_START: usize = 0;
const OFF_PROTOCOL_VERSION: usize = 2;
const OFF_FLAGS: usize = 4;
const OFF_MESSAGE_TYPE: usize = 5;
const OFF_ERROR_CODE: usize = 6;
const OFF_CHECKSUM_TYPE: usize = 7;
const OFF_BYTES_REMAINING: usize = 8;
const OFF_IMMEDIATE_DATA_LENGTH: usize = 12;
const OFF_IMMEDIATE_DATA: usize = 16;

mod cmd {
    pub const GET_SERIAL_NUMBER: u8 = 0x01;
    pub const GET_FIRMWARE_VERSION: u8 = 0x02;
    pub const GET_WAVELENGTH_COEFFICIENT_COUNT: u8 = 0x03;
    pub const GET_WAVELENGTH_COEFFICIENT: u8 = 0x04;
    pub const GET_NONLINEARITY_COEFFICIENT_COUNT: u8 = 0x05;
    pub const GET_NONLINEARITY_COEFFICIENT: u8 = 0x06;
    pub const GET_IRRADIANCE_CALIBRATION: u8 = 0x07;
    pub const SET_INTEGRATION_TIME: u8 = 0x08;
    pub const SET_PIXEL_BINNING_FACTOR: u8 = 0x09;
    pub const GET_AND_SEND_RAW_SPECTRUM: u8 = 0x0a;
}

mod err_code {
    pub const SUCCESS: u8 = 0x00;
    pub const MESSAGE_TOO_LARGE: u8 = 0x01;
    pub const UNKNOWN_CHECKSUM_TYPE: u8 = 0x02;
    pub const UNSUPPORTED_PROTOCOL: u8 = 0x03;
    pub const COMMAND_DATA_MISSING: u8 = 0x04;
}

fn map_error_code(code: u8, cmd: u8) -> ErrorKind {
    match code {
        err_code::MESSAGE_TOO_LARGE | err_code::UNKNOWN_CHECKSUM_TYPE | err_code::UNSUPPORTED_PROTOCOL => {
            ErrorKind::NoSupport(format!("failed to run command 0x{cmd:02x}"))
        }
        err_code::COMMAND_DATA_MISSING => ErrorKind::NoData(format!("failed to run command 0x{cmd:02x}")),
        other => ErrorKind::Internal(format!("failed to run command 0x{cmd:02x}: error code 0x{other:02x}")),
    }
}

pub struct SparkDriver {
    usb: Box<dyn UsbHost>,
    serial: Option<String>,
    firmware_version: Option<String>,
}

impl SparkDriver {
    #[must_use]
    pub fn new(usb: Box<dyn UsbHost>) -> Self {
        Self { usb, serial: None, firmware_version: None }
    }

    fn debug(direction: &str, buffer: &[u8]) {
        if crate::debug::spark_protocol_debug() {
            log::debug!("{direction}: {buffer:02x?}");
        }
    }

    /// Builds and sends one framed request, then reassembles the (possibly
    /// multi-packet) reply and returns its payload. Short payloads (`<= 16`
    /// bytes) are carried in the header's `immediate_data` to save a packet.
    fn query(&mut self, command: u8, data_in: &[u8]) -> Result<Vec<u8>> {
        let immediate = data_in.len() <= 16;
        let payload_len = if immediate { 0 } else { data_in.len() };
        let mut request = vec![0u8; HEADER_LEN + payload_len];
        request[OFF_START..OFF_START + 2].copy_from_slice(&START_BYTES.to_be_bytes());
        request[OFF_PROTOCOL_VERSION..OFF_PROTOCOL_VERSION + 2].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        request[OFF_FLAGS] = FLAG_ACK_REQUIRED;
        request[OFF_MESSAGE_TYPE] = command;
        request[OFF_CHECKSUM_TYPE] = CHECKSUM_KIND_MD5;
        let bytes_remaining = (FOOTER_LEN + payload_len) as u32;
        request[OFF_BYTES_REMAINING..OFF_BYTES_REMAINING + 4].copy_from_slice(&bytes_remaining.to_le_bytes());
        if immediate && !data_in.is_empty() {
            request[OFF_IMMEDIATE_DATA_LENGTH] = data_in.len() as u8;
            request[OFF_IMMEDIATE_DATA..OFF_IMMEDIATE_DATA + data_in.len()].copy_from_slice(data_in);
        } else if !immediate {
            request[HEADER_LEN..HEADER_LEN + payload_len].copy_from_slice(data_in);
        }

        let mut hasher = Md5::new();
        hasher.update(&request);
        let checksum: [u8; 16] = hasher.finalize().into();
        request.extend_from_slice(&checksum);
        request.extend_from_slice(&END_BYTES.to_be_bytes());

        Self::debug("request", &request);
        self.usb.bulk_write(BULK_EP_OUT, &request, USB_TIMEOUT)?;

        let mut frame = [0u8; FRAME_SIZE];
        self.usb.bulk_read(BULK_EP_IN, &mut frame, USB_TIMEOUT)?;
        Self::debug("reply", &frame);

        let error_code = frame[OFF_ERROR_CODE];
        if error_code != err_code::SUCCESS {
            return Err(map_error_code(error_code, command));
        }

        let immediate_len = frame[OFF_IMMEDIATE_DATA_LENGTH] as usize;
        if immediate_len > 0 {
            return Ok(frame[OFF_IMMEDIATE_DATA..OFF_IMMEDIATE_DATA + immediate_len].to_vec());
        }

        let bytes_remaining = u32::from_le_bytes(frame[OFF_BYTES_REMAINING..OFF_BYTES_REMAINING + 4].try_into().unwrap());
        let payload_len = bytes_remaining.saturating_sub(FOOTER_LEN as u32) as usize;
        let mut data = frame[HEADER_LEN..FRAME_SIZE].to_vec();
        while data.len() < payload_len {
            let mut next = [0u8; FRAME_SIZE];
            self.usb.bulk_read(BULK_EP_IN, &mut next, USB_TIMEOUT)?;
            Self::debug("reply", &next);
            data.extend_from_slice(&next);
        }
        data.truncate(payload_len);
        Ok(data)
    }

    fn send_command(&mut self, command: u8, data_in: &[u8]) -> Result<()> {
        self.query(command, data_in)?;
        Ok(())
    }

    pub fn get_serial(&mut self) -> Result<String> {
        let data = self.query(cmd::GET_SERIAL_NUMBER, &[])?;
        if data.is_empty() {
            return Err(ErrorKind::Internal("expected serial number, got nothing".into()));
        }
        Ok(String::from_utf8_lossy(&data).trim_end_matches('\0').to_string())
    }

    pub fn get_fw_version(&mut self) -> Result<String> {
        let data = self.query(cmd::GET_FIRMWARE_VERSION, &[])?;
        if data.len() != 2 {
            return Err(ErrorKind::Internal(format!("expected 2 bytes, got {}", data.len())));
        }
        Ok(format!("{}.{}", data[1], data[0]))
    }

    fn get_wavelength_coefficient(&mut self, idx: u8) -> Result<f64> {
        let data = self.query(cmd::GET_WAVELENGTH_COEFFICIENT, &[idx])?;
        if data.len() != 4 {
            return Err(ErrorKind::Internal(format!("expected 4 bytes, got {}", data.len())));
        }
        Ok(f32::from_le_bytes(data.try_into().unwrap()) as f64)
    }

    fn get_wavelength_cal(&mut self) -> Result<(f64, f64, f64, f64)> {
        let count = self.query(cmd::GET_WAVELENGTH_COEFFICIENT_COUNT, &[])?;
        if count.len() != 1 || count[0] != 4 {
            return Err(ErrorKind::Internal("expected 4 wavelength coefficients".into()));
        }
        let start = self.get_wavelength_coefficient(0)?;
        let c0 = self.get_wavelength_coefficient(1)?;
        let c1 = self.get_wavelength_coefficient(2)?;
        let c2 = self.get_wavelength_coefficient(3)?;
        Ok((start, c0, c1, c2))
    }

    fn get_nonlinearity_coefficient(&mut self, idx: u8) -> Result<f64> {
        let data = self.query(cmd::GET_NONLINEARITY_COEFFICIENT, &[idx])?;
        if data.len() != 4 {
            return Err(ErrorKind::Internal(format!("expected 4 bytes, got {}", data.len())));
        }
        Ok(f32::from_le_bytes(data.try_into().unwrap()) as f64)
    }

    pub fn get_nonlinearity_cal(&mut self) -> Result<Vec<f64>> {
        let count = self.query(cmd::GET_NONLINEARITY_COEFFICIENT_COUNT, &[])?;
        if count.len() != 1 || count[0] != 8 {
            return Err(ErrorKind::Internal("expected 8 nonlinearity coefficients".into()));
        }
        (0..8).map(|i| self.get_nonlinearity_coefficient(i)).collect()
    }

    pub fn get_irradiance_cal(&mut self) -> Result<Vec<f64>> {
        let data = self.query(cmd::GET_IRRADIANCE_CALIBRATION, &[])?;
        if data.len() != 4096 * 4 {
            return Err(ErrorKind::Internal(format!("expected {} bytes, got {}", 4096 * 4, data.len())));
        }
        Ok(data.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64).collect())
    }

    /// One raw reading at `duration_us` integration, normalized to the
    /// sensor's actual 14-bit full scale (`0x3fff`), so a healthy reading's
    /// max never exceeds `1.0`.
    fn take_spectrum_internal(&mut self, duration_us: u32) -> Result<Spectrum> {
        self.send_command(cmd::SET_INTEGRATION_TIME, &duration_us.to_le_bytes())?;
        let data = self.query(cmd::GET_AND_SEND_RAW_SPECTRUM, &[])?;
        if data.len() != 2048 {
            return Err(ErrorKind::Internal(format!("expected 2048 bytes, got {}", data.len())));
        }
        let values: Vec<f64> =
            data.chunks_exact(2).map(|c| (c[1] as u32 * 256 + c[0] as u32) as f64 / 0x3fff as f64).collect();
        let sp = Spectrum::new(0.0, (values.len() - 1) as f64, values, 1.0)?;
        if sp.value_max() > 1.0 {
            return Err(ErrorKind::Internal(format!("spectral max should be <= 1.0, was {}", sp.value_max())));
        }
        Ok(sp)
    }

    fn take_spectrum_full(&mut self, duration_us: u32) -> Result<Spectrum> {
        self.send_command(cmd::SET_PIXEL_BINNING_FACTOR, &[0u8])?;
        let raw = self.take_spectrum_internal(duration_us)?.with_id("raw");
        let dc = self.take_spectrum_internal(10)?.with_id("dc");
        let (start, c0, c1, c2) = self.get_wavelength_cal()?;
        let diff = raw.subtract(&dc, 5.0)?;
        Ok(diff.with_start_nm(start).with_wavelength_cal(c0, c1, c2))
    }

    /// Hunts for an integration
    /// time that lands the signal between 1/4 and 3/4 of full scale.
    pub fn take_spectrum(&mut self) -> Result<Spectrum> {
        const MAX_DURATION_US: u32 = 3_000_000;
        let mut relax = false;
        let mut duration_us: u32 = 10_000;
        let mut scale = 1.0f64;
        let mut accepted = None;

        for i in 0..5 {
            if i == 4 {
                relax = true;
            }
            let probe = self.take_spectrum_full(duration_us)?;
            let max = probe.value_max();

            if max < 0.001 {
                duration_us = ((duration_us as f64) * 100.0) as u32;
                continue;
            }
            if max > 0.99 {
                duration_us = ((duration_us as f64) / 100.0).max(1.0) as u32;
                continue;
            }
            if max > 0.25 && max < 0.75 {
                accepted = Some(probe);
                break;
            }
            if relax && max > 0.01 {
                accepted = Some(probe);
                break;
            }

            scale = 0.5 / max;
            duration_us = ((duration_us as f64) * scale) as u32;
            if duration_us > MAX_DURATION_US {
                duration_us = MAX_DURATION_US;
                relax = true;
            }
        }

        let sp = accepted.ok_or_else(|| ErrorKind::NoData("Got no valid data".into()))?;
        Ok(sp.clone().with_norm(sp.norm() / scale))
    }
}

impl Driver for SparkDriver {
    fn coldplug(&mut self) -> Result<ColdplugInfo> {
        Ok(ColdplugInfo {
            kind: Kind::Spark,
            caps: Cap::SPOT | Cap::AMBIENT,
            native: true,
            embedded: false,
            serial: None,
            model: Some("Spark".into()),
            vendor: Some("Ocean Optics".into()),
        })
    }

    fn lock(&mut self, _cancel: &CancelToken) -> Result<()> {
        self.serial = self.get_serial().ok();
        self.firmware_version = self.get_fw_version().ok();
        Ok(())
    }

    fn unlock(&mut self, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    fn get_sample(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Xyz> {
        Err(ErrorKind::NoSupport("Spark is a spectrometer, use get_spectrum".into()))
    }

    fn get_spectrum(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Spectrum> {
        self.take_spectrum()
    }

    fn set_options(&mut self, _options: &BTreeMap<String, String>, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    fn dump_device(&self) -> String {
        format!("Spark: serial={:?} firmware={:?}", self.serial, self.firmware_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::usb::mock::MockUsb;

    fn reply_frame(error_code: u8, immediate: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; FRAME_SIZE];
        frame[OFF_ERROR_CODE] = error_code;
        frame[OFF_IMMEDIATE_DATA_LENGTH] = immediate.len() as u8;
        frame[OFF_IMMEDIATE_DATA..OFF_IMMEDIATE_DATA + immediate.len()].copy_from_slice(immediate);
        frame
    }

    #[test]
    fn immediate_data_round_trips_through_query() {
        let mut usb = MockUsb::default();
        usb.bulk_replies.push_back(reply_frame(err_code::SUCCESS, b"AB12345678"));
        let mut driver = SparkDriver::new(Box::new(usb));
        assert_eq!(driver.get_serial().unwrap(), "AB12345678");
    }

    #[test]
    fn command_data_missing_maps_to_no_data() {
        let mut usb = MockUsb::default();
        usb.bulk_replies.push_back(reply_frame(err_code::COMMAND_DATA_MISSING, &[]));
        let mut driver = SparkDriver::new(Box::new(usb));
        assert!(matches!(driver.get_serial(), Err(ErrorKind::NoData(_))));
    }

    #[test]
    fn message_too_large_maps_to_no_support() {
        let mut usb = MockUsb::default();
        usb.bulk_replies.push_back(reply_frame(err_code::MESSAGE_TOO_LARGE, &[]));
        let mut driver = SparkDriver::new(Box::new(usb));
        assert!(matches!(driver.get_serial(), Err(ErrorKind::NoSupport(_))));
    }

    #[test]
    fn raw_spectrum_above_full_scale_is_rejected() {
        let mut usb = MockUsb::default();
        // 2048 bytes of 0xffff samples -> value_max > 1.0, above what the
        // 14-bit sensor should ever report.
        let mut frame = vec![0u8; FRAME_SIZE];
        // bytes_remaining = footer(20) + payload(2048)
        frame[OFF_BYTES_REMAINING..OFF_BYTES_REMAINING + 4].copy_from_slice(&(20u32 + 2048).to_le_bytes());
        frame[HEADER_LEN..FRAME_SIZE].copy_from_slice(&[0xff; FRAME_SIZE - HEADER_LEN]);
        usb.bulk_replies.push_back(frame);
        for _ in 0..((2048 - (FRAME_SIZE - HEADER_LEN)) / FRAME_SIZE) {
            usb.bulk_replies.push_back(vec![0xffu8; FRAME_SIZE]);
        }
        let mut driver = SparkDriver::new(Box::new(usb));
        assert!(driver.take_spectrum_internal(10_000).is_err());
    }

    /// Wraps a [`MockUsb`] and counts the bulk writes that carry each
    /// command byte, so a test can assert on the auto-exposure loop's shape
    /// without the driver exposing its own iteration count.
    struct RecordingUsb {
        inner: MockUsb,
        integration_time_calls: std::sync::Arc<std::sync::atomic::AtomicU32>,
        pixel_binning_calls: std::sync::Arc<std::sync::atomic::AtomicU32>,
    }

    impl UsbHost for RecordingUsb {
        fn claim_interface(&mut self, iface: u8) -> Result<()> {
            self.inner.claim_interface(iface)
        }

        fn release_interface(&mut self, iface: u8) -> Result<()> {
            self.inner.release_interface(iface)
        }

        fn control_write(&mut self, req: crate::sensor::usb::ControlRequest, buffer: &[u8]) -> Result<usize> {
            self.inner.control_write(req, buffer)
        }

        fn control_read(&mut self, req: crate::sensor::usb::ControlRequest, buffer: &mut [u8]) -> Result<usize> {
            self.inner.control_read(req, buffer)
        }

        fn bulk_write(&mut self, endpoint: u8, buffer: &[u8], timeout: Duration) -> Result<usize> {
            use std::sync::atomic::Ordering;
            match buffer.get(OFF_MESSAGE_TYPE) {
                Some(&cmd::SET_INTEGRATION_TIME) => {
                    self.integration_time_calls.fetch_add(1, Ordering::SeqCst);
                }
                Some(&cmd::SET_PIXEL_BINNING_FACTOR) => {
                    self.pixel_binning_calls.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
            self.inner.bulk_write(endpoint, buffer, timeout)
        }

        fn bulk_read(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
            self.inner.bulk_read(endpoint, buffer, timeout)
        }

        fn interrupt_write(&mut self, endpoint: u8, buffer: &[u8], timeout: Duration) -> Result<usize> {
            self.inner.interrupt_write(endpoint, buffer, timeout)
        }

        fn interrupt_read(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
            self.inner.interrupt_read(endpoint, buffer, timeout)
        }
    }

    /// Builds the frame sequence `query()` reassembles into a 2048-byte raw
    /// spectrum of 1024 identical 16-bit samples.
    fn raw_spectrum_frames(sample: u16) -> Vec<Vec<u8>> {
        let mut payload = Vec::with_capacity(2048);
        for _ in 0..1024 {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        let mut frames = Vec::new();
        let mut first = vec![0u8; FRAME_SIZE];
        first[OFF_BYTES_REMAINING..OFF_BYTES_REMAINING + 4].copy_from_slice(&(FOOTER_LEN as u32 + 2048).to_le_bytes());
        let first_chunk = FRAME_SIZE - HEADER_LEN;
        first[HEADER_LEN..FRAME_SIZE].copy_from_slice(&payload[..first_chunk]);
        frames.push(first);
        let mut offset = first_chunk;
        while offset < payload.len() {
            let end = (offset + FRAME_SIZE).min(payload.len());
            let mut frame = vec![0u8; FRAME_SIZE];
            frame[..end - offset].copy_from_slice(&payload[offset..end]);
            frames.push(frame);
            offset += FRAME_SIZE;
        }
        frames
    }

    /// Queues one full `take_spectrum_full` round trip: a pixel-binning ack,
    /// a raw capture, a dark-current capture, and the wavelength calibration
    /// reads, in the exact order the driver issues them.
    fn queue_full_cycle(usb: &mut MockUsb, raw_sample: u16) {
        usb.bulk_replies.push_back(reply_frame(err_code::SUCCESS, &[]));
        usb.bulk_replies.push_back(reply_frame(err_code::SUCCESS, &[]));
        for frame in raw_spectrum_frames(raw_sample) {
            usb.bulk_replies.push_back(frame);
        }
        usb.bulk_replies.push_back(reply_frame(err_code::SUCCESS, &[]));
        for frame in raw_spectrum_frames(0) {
            usb.bulk_replies.push_back(frame);
        }
        usb.bulk_replies.push_back(reply_frame(err_code::SUCCESS, &[4]));
        for _ in 0..4 {
            usb.bulk_replies.push_back(reply_frame(err_code::SUCCESS, &0.0f32.to_le_bytes()));
        }
    }

    #[test]
    fn auto_exposure_converges_through_the_normal_window() {
        // A constant reading at half the sensor's 14-bit full scale lands
        // in the (0.25, 0.75) accept window on the very first probe, since
        // the mock ignores the requested integration time.
        let mut inner = MockUsb::default();
        queue_full_cycle(&mut inner, 0x2000);
        let integration_time_calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let pixel_binning_calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let usb = RecordingUsb {
            inner,
            integration_time_calls: integration_time_calls.clone(),
            pixel_binning_calls: pixel_binning_calls.clone(),
        };
        let mut driver = SparkDriver::new(Box::new(usb));
        let spectrum = driver.take_spectrum().unwrap();

        assert_eq!(integration_time_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(pixel_binning_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(spectrum.value_max() > 0.25 && spectrum.value_max() < 0.75, "got {}", spectrum.value_max());
    }

    #[test]
    fn auto_exposure_converges_through_the_relax_branch() {
        // A constant reading at 0x3800/0x3fff (~0.875 of full scale) never
        // lands the probe in the accept window on its own, since the mock's
        // reading doesn't respond to the requested integration time, so the
        // loop has to run every iteration and accept through the relaxed
        // (i == 4) threshold instead.
        let mut inner = MockUsb::default();
        for _ in 0..5 {
            queue_full_cycle(&mut inner, 0x3800);
        }
        let integration_time_calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let pixel_binning_calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let usb = RecordingUsb {
            inner,
            integration_time_calls: integration_time_calls.clone(),
            pixel_binning_calls: pixel_binning_calls.clone(),
        };
        let mut driver = SparkDriver::new(Box::new(usb));
        let spectrum = driver.take_spectrum().unwrap();

        assert!(integration_time_calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);
        assert!(pixel_binning_calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);
        assert!(spectrum.value_max() >= 0.25 && spectrum.value_max() <= 0.75);
    }
}
