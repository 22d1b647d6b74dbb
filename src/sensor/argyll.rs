//! Argyll adapter: implements the sensor contract by shelling
//! out to `spotread` rather than talking to a device directly. `native` is
//! always false for sensors behind this driver.

use super::subprocess::{Exit, Signal, Subprocess};
use super::{Cap, CancelToken, ColdplugInfo, Driver, Kind};
use crate::color::Xyz;
use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);
const UNLOCK_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maps a device kind to the name `spotread --help` lists it under. Only
/// the models colord's own table named are covered; anything else can't be
/// driven through Argyll.
fn kind_to_argyll_name(kind: &Kind) -> Option<&'static str> {
    match kind {
        Kind::Huey | Kind::HueyLenovo => Some("GretagMacbeth Huey"),
        Kind::ColorHug => Some("Hughski ColorHug"),
        Kind::ColorHugPlus => Some("Hughski ColorHug+"),
        Kind::ColorMunkiPhoto => Some("X-Rite ColorMunki"),
        Kind::ColorMunkiDisplay | Kind::I1DisplayPro => Some("Xrite i1 DisplayPro, ColorMunki Display"),
        Kind::ColorMunkiSmile => Some("ColorMunki Smile"),
        Kind::I1Display1 => Some("GretagMacbeth i1 Display 1"),
        Kind::I1Display2 => Some("GretagMacbeth i1 Display 2"),
        Kind::I1Monitor => Some("GretagMacbeth i1 Monitor"),
        Kind::I1Pro => Some("GretagMacbeth i1 Pro"),
        Kind::Spyder2 => Some("ColorVision Spyder2"),
        Kind::Spyder3 => Some("Datacolor Spyder3"),
        Kind::Spyder4 => Some("Datacolor Spyder4"),
        Kind::Spyder5 => Some("Datacolor Spyder5"),
        Kind::DTP92 => Some("Xrite DTP92"),
        Kind::DTP94 => Some("Xrite DTP94"),
        Kind::ColorHugAles | Kind::I1Pro2 | Kind::Spark | Kind::Other(_) => None,
    }
}

/// Spawns the two flavors of `spotread` invocation this adapter needs: a
/// run-to-completion `--help` for port discovery, and a long-lived
/// interactive process for sampling. A trait so tests can substitute a
/// scripted [`Subprocess`] without touching a real shell.
pub trait ProcessSpawner: Send {
    fn spotread_help(&mut self) -> Result<String>;
    fn spawn_spotread(&mut self, port: u32, y_arg: char) -> Result<Box<dyn Subprocess>>;
}

fn argyll_env() -> BTreeMap<String, String> {
    BTreeMap::from([("ARGYLL_NOT_INTERACTIVE".to_string(), "1".to_string())])
}

pub struct RealSpawner;

impl ProcessSpawner for RealSpawner {
    fn spotread_help(&mut self) -> Result<String> {
        let output = std::process::Command::new("spotread")
            .arg("--help")
            .envs(argyll_env())
            .output()
            .map_err(|e| ErrorKind::FailedToOpen(e.to_string()))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_spotread(&mut self, port: u32, y_arg: char) -> Result<Box<dyn Subprocess>> {
        use super::subprocess::ChildProcess;
        let port_arg = format!("-c{port}");
        let y_flag = format!("-y{y_arg}");
        let child = ChildProcess::spawn("spotread", &["-d", port_arg.as_str(), "-N", y_flag.as_str()], &argyll_env(), None)?;
        Ok(Box::new(child))
    }
}

enum LineOutcome {
    Continue,
    Sample(Xyz),
    Err(ErrorKind),
}

pub struct ArgyllDriver {
    kind: Kind,
    spawner: Box<dyn ProcessSpawner>,
    process: Option<Box<dyn Subprocess>>,
    communication_port: u32,
    /// Mirrors the original's "pos_required" latch: we answer a calibration
    /// prompt with a blind newline exactly once, since spotread asks for it
    /// before it has any way to know the dial hasn't been moved yet.
    calibrate_prompt_seen: bool,
}

impl ArgyllDriver {
    #[must_use]
    pub fn new(kind: Kind, spawner: Box<dyn ProcessSpawner>) -> Self {
        Self { kind, spawner, process: None, communication_port: 0, calibrate_prompt_seen: false }
    }

    fn handle_line(&mut self, line: &str, process: &mut dyn Subprocess) -> LineOutcome {
        log::debug!("spotread: {line}");

        if line.starts_with("Place instrument on spot to be measured") {
            if !self.calibrate_prompt_seen {
                let _ = process.write_line("");
            }
            return LineOutcome::Continue;
        }
        if line == "Calibration complete" {
            self.calibrate_prompt_seen = false;
            return LineOutcome::Continue;
        }
        if line.trim() == "Result is XYZ:" || line.contains("Result is XYZ:") {
            let parts: Vec<&str> = line.split([' ', ',']).filter(|p| !p.is_empty()).collect();
            if parts.len() < 7 {
                return LineOutcome::Err(ErrorKind::Protocol(format!("unparseable spotread result line: {line}")));
            }
            let parsed: Result<Vec<f64>> = parts[4..7]
                .iter()
                .map(|p| p.parse::<f64>().map_err(|_| ErrorKind::Protocol(format!("bad XYZ token in: {line}"))))
                .collect();
            return match parsed {
                Ok(xyz) => LineOutcome::Sample(Xyz { x: xyz[0], y: xyz[1], z: xyz[2] }),
                Err(e) => LineOutcome::Err(e),
            };
        }
        if line.starts_with("Instrument initialisation failed") {
            return LineOutcome::Err(ErrorKind::Internal("failed to contact hardware (replug)".into()));
        }
        if line == "(Sensor should be in surface position)" {
            return LineOutcome::Err(ErrorKind::RequiredPositionSurface);
        }
        if line.starts_with("Set instrument sensor to calibration position,") {
            if !self.calibrate_prompt_seen {
                let _ = process.write_line("");
                self.calibrate_prompt_seen = true;
                return LineOutcome::Continue;
            }
            return LineOutcome::Err(ErrorKind::RequiredPositionCalibrate);
        }
        LineOutcome::Continue
    }
}

impl Driver for ArgyllDriver {
    fn coldplug(&mut self) -> Result<ColdplugInfo> {
        let argyll_name = kind_to_argyll_name(&self.kind)
            .ok_or_else(|| ErrorKind::Internal(format!("failed to find sensor {:?} in spotread's device list", self.kind)))?;
        let help = self.spawner.spotread_help()?;

        let mut listno = 0u32;
        let mut found = None;
        for line in help.lines() {
            if line.contains(" = ") {
                listno += 1;
                if line.contains(argyll_name) {
                    found = Some(listno);
                    break;
                }
            }
        }
        self.communication_port = found.ok_or_else(|| ErrorKind::Internal(format!("Failed to find device {argyll_name}")))?;

        Ok(ColdplugInfo {
            kind: self.kind.clone(),
            caps: Cap::LCD | Cap::CRT | Cap::SPOT,
            native: false,
            embedded: false,
            serial: None,
            model: Some(argyll_name.to_string()),
            vendor: None,
        })
    }

    fn lock(&mut self, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    fn unlock(&mut self, _cancel: &CancelToken) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        process.send_signal(Signal::Quit)?;
        let deadline = Instant::now() + UNLOCK_TIMEOUT;
        loop {
            if let Some(exit) = process.try_exit() {
                return match exit {
                    Exit::Sigquit => Ok(()),
                    other => Err(ErrorKind::Internal(format!("spotread exited without sigquit: {other:?}"))),
                };
            }
            if Instant::now() >= deadline {
                return Err(ErrorKind::Internal("spotread did not exit after sigquit".into()));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn get_sample(&mut self, cap: Cap, cancel: &CancelToken) -> Result<Xyz> {
        let y_arg = cap.argyll_letter().ok_or_else(|| ErrorKind::NoSupport(format!("no spotread -y mapping for {cap:?}")))?;

        if self.process.is_none() {
            let process = self.spawner.spawn_spotread(self.communication_port, y_arg)?;
            self.process = Some(process);
        } else if let Some(process) = self.process.as_mut() {
            process.write_line("")?;
        }

        let deadline = Instant::now() + SAMPLE_TIMEOUT;
        loop {
            if cancel.is_cancelled() {
                return Err(ErrorKind::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ErrorKind::Internal("spotread timed out".into()));
            }
            let wait = POLL_INTERVAL.min(deadline - now);

            let mut process = self.process.take().expect("spawned above");
            let line = process.read_line(wait);
            let outcome = match line {
                Ok(Some(line)) => Some(self.handle_line(&line, &mut *process)),
                Ok(None) => {
                    if let Some(exit) = process.try_exit() {
                        self.process = None;
                        return Err(ErrorKind::Internal(format!("spotread exited unexpectedly: {exit:?}")));
                    }
                    None
                }
                Err(e) => {
                    self.process = None;
                    return Err(e);
                }
            };
            self.process = Some(process);

            match outcome {
                Some(LineOutcome::Continue) | None => continue,
                Some(LineOutcome::Sample(xyz)) => return Ok(xyz),
                Some(LineOutcome::Err(e)) => return Err(e),
            }
        }
    }

    fn get_spectrum(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Spectrum> {
        Err(ErrorKind::NoSupport("spotread reports XYZ only".into()))
    }

    fn set_options(&mut self, _options: &BTreeMap<String, String>, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }

    fn dump_device(&self) -> String {
        format!("argyll: kind={:?} communication_port={}", self.kind, self.communication_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::subprocess::mock::MockSubprocess;

    struct ScriptedSpawner {
        help: String,
        process: Option<MockSubprocess>,
    }

    impl ProcessSpawner for ScriptedSpawner {
        fn spotread_help(&mut self) -> Result<String> {
            Ok(self.help.clone())
        }
        fn spawn_spotread(&mut self, _port: u32, _y_arg: char) -> Result<Box<dyn Subprocess>> {
            Ok(Box::new(self.process.take().expect("test configures one spawn")))
        }
    }

    fn help_text_with_huey_third() -> String {
        "usage: spotread\n\
         Communication options:\n\
         1 = Some Other Device\n\
         2 = Another Device\n\
         3 = GretagMacbeth Huey\n"
            .to_string()
    }

    #[test]
    fn coldplug_finds_the_matching_communication_port() {
        let spawner = ScriptedSpawner { help: help_text_with_huey_third(), process: None };
        let mut driver = ArgyllDriver::new(Kind::Huey, Box::new(spawner));
        let info = driver.coldplug().unwrap();
        assert_eq!(driver.communication_port, 3);
        assert!(!info.native);
    }

    #[test]
    fn coldplug_fails_for_a_kind_spotread_has_no_name_for() {
        let spawner = ScriptedSpawner { help: help_text_with_huey_third(), process: None };
        let mut driver = ArgyllDriver::new(Kind::Spark, Box::new(spawner));
        assert!(driver.coldplug().is_err());
    }

    #[test]
    fn result_line_parses_into_xyz() {
        let mut mock = MockSubprocess::default();
        mock.lines.push_back("Result is XYZ: 40.1, 42.2, 30.3 [L*a*b something]".into());
        let spawner = ScriptedSpawner { help: help_text_with_huey_third(), process: Some(mock) };
        let mut driver = ArgyllDriver::new(Kind::Huey, Box::new(spawner));
        driver.coldplug().unwrap();
        let cancel = CancelToken::new();
        let xyz = driver.get_sample(Cap::LCD, &cancel).unwrap();
        assert!((xyz.x - 40.1).abs() < 1e-9);
        assert!((xyz.y - 42.2).abs() < 1e-9);
        assert!((xyz.z - 30.3).abs() < 1e-9);
    }

    #[test]
    fn surface_position_prompt_is_an_error() {
        let mut mock = MockSubprocess::default();
        mock.lines.push_back("(Sensor should be in surface position)".into());
        let spawner = ScriptedSpawner { help: help_text_with_huey_third(), process: Some(mock) };
        let mut driver = ArgyllDriver::new(Kind::Huey, Box::new(spawner));
        driver.coldplug().unwrap();
        let cancel = CancelToken::new();
        assert_eq!(driver.get_sample(Cap::LCD, &cancel), Err(ErrorKind::RequiredPositionSurface));
    }

    #[test]
    fn calibration_prompt_answers_once_then_fails_on_repeat() {
        let mut mock = MockSubprocess::default();
        // Same prompt twice in a row, as the dial was never actually moved:
        // the first is answered optimistically, the second is an error.
        mock.lines.push_back("Set instrument sensor to calibration position, then press a key".into());
        mock.lines.push_back("Set instrument sensor to calibration position, then press a key".into());
        let spawner = ScriptedSpawner { help: help_text_with_huey_third(), process: Some(mock) };
        let mut driver = ArgyllDriver::new(Kind::Huey, Box::new(spawner));
        driver.coldplug().unwrap();
        let cancel = CancelToken::new();
        assert_eq!(driver.get_sample(Cap::LCD, &cancel), Err(ErrorKind::RequiredPositionCalibrate));
    }
}
