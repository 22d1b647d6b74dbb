//! Sensor framework: the bookkeeping fields,
//! the `unknown -> idle <-> busy -> measuring` state machine, and
//! the capability/error-mapping seam every driver plugs into.
//!
//! Concrete drivers live in the sibling modules: [`huey`], [`colorhug`],
//! [`colormunki`], [`spark`], [`argyll`]. The USB and subprocess host
//! interfaces they're built on live in [`usb`] and [`subprocess`].

pub mod argyll;
pub mod colorhug;
pub mod colormunki;
pub mod huey;
pub mod spark;
pub mod subprocess;
pub mod usb;

use crate::color::Xyz;
use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

bitflags::bitflags! {
    /// Capability bitfield.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cap: u32 {
        const LCD               = 1 << 0;
        const CRT                = 1 << 1;
        const PROJECTOR          = 1 << 2;
        const PRINTER            = 1 << 3;
        const SPOT               = 1 << 4;
        const AMBIENT            = 1 << 5;
        const CALIBRATION        = 1 << 6;
        const LED                = 1 << 7;
        const PLASMA             = 1 << 8;
        const LCD_CCFL           = 1 << 9;
        const LCD_RGB_LED        = 1 << 10;
        const WIDE_GAMUT_CCFL    = 1 << 11;
        const WIDE_GAMUT_RGB_LED = 1 << 12;
        const LCD_WHITE_LED      = 1 << 13;
    }
}

impl Cap {
    /// The `-y` letter `spotread` expects for this cap. Picks
    /// the most specific display technology bit set, falling back to the
    /// coarse LCD/CRT/projector bits.
    #[must_use]
    pub fn argyll_letter(self) -> Option<char> {
        if self.contains(Cap::LCD_CCFL) {
            Some('f')
        } else if self.contains(Cap::LCD_RGB_LED) {
            Some('b')
        } else if self.contains(Cap::WIDE_GAMUT_CCFL) {
            Some('L')
        } else if self.contains(Cap::WIDE_GAMUT_RGB_LED) {
            Some('B')
        } else if self.contains(Cap::LCD_WHITE_LED) {
            Some('e')
        } else if self.contains(Cap::LCD) {
            Some('l')
        } else if self.contains(Cap::CRT) {
            Some('c')
        } else if self.contains(Cap::PROJECTOR) {
            Some('p')
        } else {
            None
        }
    }
}

/// The device model a sensor identifies as. Native drivers cover a handful
/// of models directly; everything else still works through [`argyll`] and
/// is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Huey,
    HueyLenovo,
    ColorHug,
    ColorHugPlus,
    ColorHugAles,
    ColorMunkiPhoto,
    ColorMunkiDisplay,
    ColorMunkiSmile,
    Spark,
    I1Display1,
    I1Display2,
    I1DisplayPro,
    I1Monitor,
    I1Pro,
    I1Pro2,
    Spyder2,
    Spyder3,
    Spyder4,
    Spyder5,
    DTP92,
    DTP94,
    Other(String),
}

/// The sensor's run state, driven entirely by the framework;
/// drivers never set this directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unknown,
    Idle,
    Busy,
    Measuring,
}

/// An asynchronous notification fired regardless of the sensor's own
/// in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ButtonPressed,
    PropertyChanged { name: &'static str },
}

/// A first-class, idempotent cancellation handle shared between a caller
/// and the in-flight call it cancels.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a driver reports once coldplug succeeds; seeds the framework's
/// bookkeeping fields.
#[derive(Debug, Clone)]
pub struct ColdplugInfo {
    pub kind: Kind,
    pub caps: Cap,
    pub native: bool,
    pub embedded: bool,
    pub serial: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
}

/// The capability set every driver implements. Method names intentionally
/// don't carry an `_async` suffix — every suspension point here is a
/// blocking call on its own task lane, not a polled future.
pub trait Driver: Send {
    fn coldplug(&mut self) -> Result<ColdplugInfo>;
    fn lock(&mut self, cancel: &CancelToken) -> Result<()>;
    fn unlock(&mut self, cancel: &CancelToken) -> Result<()>;
    fn get_sample(&mut self, cap: Cap, cancel: &CancelToken) -> Result<Xyz>;
    fn get_spectrum(&mut self, cap: Cap, cancel: &CancelToken) -> Result<Spectrum>;
    fn set_options(&mut self, options: &BTreeMap<String, String>, cancel: &CancelToken) -> Result<()>;
    fn dump_device(&self) -> String;

    /// Drains any button/dial events the driver has observed since the last
    /// call. Most drivers have nothing to report; ColorMunki's interrupt
    /// endpoint is the one that matters here.
    fn poll_events(&mut self) -> Vec<Event> {
        Vec::new()
    }
}

fn cancelled_guard(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ErrorKind::Cancelled);
    }
    Ok(())
}

/// A sensor instance: the framework's bookkeeping fields
/// plus a boxed driver. `Sensor` is the single owner of the driver's USB
/// handle; dropping it drops the handle.
pub struct Sensor {
    driver: Mutex<Box<dyn Driver>>,
    in_flight: AtomicBool,
    state: Mutex<State>,
    kind: Kind,
    caps: Cap,
    native: bool,
    embedded: bool,
    locked: AtomicBool,
    serial: Mutex<Option<String>>,
    model: Mutex<Option<String>>,
    vendor: Mutex<Option<String>>,
    id: String,
    object_path: String,
    mode: Mutex<Option<Cap>>,
    options: Mutex<BTreeMap<String, String>>,
    metadata: Mutex<BTreeMap<String, String>>,
    listeners: Mutex<Vec<Box<dyn Fn(Event) + Send>>>,
}

impl Sensor {
    /// Coldplugs a device: runs the driver's own coldplug, and on success
    /// builds a `Sensor` with `state == Idle` and `kind`/`caps`/`native`/
    /// `embedded` populated from the driver's report.
    pub fn coldplug(id: impl Into<String>, object_path: impl Into<String>, mut driver: Box<dyn Driver>) -> Result<Self> {
        let info = driver.coldplug()?;
        Ok(Self {
            driver: Mutex::new(driver),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(State::Idle),
            kind: info.kind,
            caps: info.caps,
            native: info.native,
            embedded: info.embedded,
            locked: AtomicBool::new(false),
            serial: Mutex::new(info.serial),
            model: Mutex::new(info.model),
            vendor: Mutex::new(info.vendor),
            id: id.into(),
            object_path: object_path.into(),
            mode: Mutex::new(None),
            options: Mutex::new(BTreeMap::new()),
            metadata: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn on_event<F: Fn(Event) + Send + 'static>(&self, f: F) {
        self.listeners.lock().unwrap().push(Box::new(f));
    }

    fn emit(&self, ev: Event) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener(ev.clone());
        }
    }

    fn drain_driver_events(&self, driver: &mut dyn Driver) {
        for ev in driver.poll_events() {
            self.emit(ev);
        }
    }

    /// Claims the single in-flight slot, transitioning `idle -> busy`.
    /// Rejects a concurrent call with `Busy` rather than queueing it.
    fn enter(&self) -> Result<()> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(ErrorKind::Busy);
        }
        *self.state.lock().unwrap() = State::Busy;
        Ok(())
    }

    /// Always transitions back to `idle`, win or lose.
    fn exit(&self) {
        *self.state.lock().unwrap() = State::Idle;
        self.in_flight.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    #[must_use]
    pub fn caps(&self) -> Cap {
        self.caps
    }

    #[must_use]
    pub fn native(&self) -> bool {
        self.native
    }

    #[must_use]
    pub fn embedded(&self) -> bool {
        self.embedded
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    #[must_use]
    pub fn serial(&self) -> Option<String> {
        self.serial.lock().unwrap().clone()
    }

    #[must_use]
    pub fn mode(&self) -> Option<Cap> {
        *self.mode.lock().unwrap()
    }

    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.lock().unwrap().insert(key.into(), value.into());
        self.emit(Event::PropertyChanged { name: "metadata" });
    }

    /// `idle -> busy -> idle`. Performs driver warmup/EEPROM reads and, on
    /// success, transitions `locked` to true.
    pub fn lock(&self, cancel: &CancelToken) -> Result<()> {
        self.enter()?;
        let result = (|| {
            cancelled_guard(cancel)?;
            if self.locked.load(Ordering::Acquire) {
                return Err(ErrorKind::AlreadyLocked);
            }
            let mut driver = self.driver.lock().unwrap();
            let r = driver.lock(cancel);
            self.drain_driver_events(&mut **driver);
            r
        })();
        if result.is_ok() {
            self.locked.store(true, Ordering::Release);
        }
        self.exit();
        if result.is_ok() {
            self.emit(Event::PropertyChanged { name: "locked" });
        }
        result
    }

    /// `idle -> busy -> idle`; reverses `lock`'s warmup.
    pub fn unlock(&self, cancel: &CancelToken) -> Result<()> {
        self.enter()?;
        let result = (|| {
            cancelled_guard(cancel)?;
            if !self.locked.load(Ordering::Acquire) {
                return Err(ErrorKind::NotLocked);
            }
            let mut driver = self.driver.lock().unwrap();
            let r = driver.unlock(cancel);
            self.drain_driver_events(&mut **driver);
            r
        })();
        if result.is_ok() {
            self.locked.store(false, Ordering::Release);
        }
        self.exit();
        if result.is_ok() {
            self.emit(Event::PropertyChanged { name: "locked" });
        }
        result
    }

    /// `idle -> busy -> measuring -> busy -> idle`, returning a tristimulus
    /// sample.
    pub fn get_sample(&self, cap: Cap, cancel: &CancelToken) -> Result<Xyz> {
        self.enter()?;
        let result = (|| {
            cancelled_guard(cancel)?;
            if !self.locked.load(Ordering::Acquire) {
                return Err(ErrorKind::NotLocked);
            }
            *self.state.lock().unwrap() = State::Measuring;
            let mut driver = self.driver.lock().unwrap();
            let r = driver.get_sample(cap, cancel);
            self.drain_driver_events(&mut **driver);
            r
        })();
        if result.is_ok() {
            *self.mode.lock().unwrap() = Some(cap);
        }
        self.exit();
        result
    }

    /// `idle -> busy -> measuring -> busy -> idle`, returning a spectrum.
    pub fn get_spectrum(&self, cap: Cap, cancel: &CancelToken) -> Result<Spectrum> {
        self.enter()?;
        let result = (|| {
            cancelled_guard(cancel)?;
            if !self.locked.load(Ordering::Acquire) {
                return Err(ErrorKind::NotLocked);
            }
            *self.state.lock().unwrap() = State::Measuring;
            let mut driver = self.driver.lock().unwrap();
            let r = driver.get_spectrum(cap, cancel);
            self.drain_driver_events(&mut **driver);
            r
        })();
        if result.is_ok() {
            *self.mode.lock().unwrap() = Some(cap);
        }
        self.exit();
        result
    }

    pub fn set_options(&self, options: BTreeMap<String, String>, cancel: &CancelToken) -> Result<()> {
        self.enter()?;
        let result = (|| {
            cancelled_guard(cancel)?;
            let mut driver = self.driver.lock().unwrap();
            let r = driver.set_options(&options, cancel);
            self.drain_driver_events(&mut **driver);
            r
        })();
        if result.is_ok() {
            *self.options.lock().unwrap() = options;
        }
        self.exit();
        if result.is_ok() {
            self.emit(Event::PropertyChanged { name: "options" });
        }
        result
    }

    #[must_use]
    pub fn options(&self) -> BTreeMap<String, String> {
        self.options.lock().unwrap().clone()
    }

    #[must_use]
    pub fn dump_device(&self) -> String {
        self.driver.lock().unwrap().dump_device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeDriver {
        calls: Arc<AtomicUsize>,
        fail_lock: bool,
    }

    impl Driver for FakeDriver {
        fn coldplug(&mut self) -> Result<ColdplugInfo> {
            Ok(ColdplugInfo {
                kind: Kind::Other("fake".into()),
                caps: Cap::LCD | Cap::SPOT,
                native: true,
                embedded: false,
                serial: Some("FAKE123".into()),
                model: None,
                vendor: None,
            })
        }

        fn lock(&mut self, _cancel: &CancelToken) -> Result<()> {
            if self.fail_lock {
                return Err(ErrorKind::Internal("warmup failed".into()));
            }
            Ok(())
        }

        fn unlock(&mut self, _cancel: &CancelToken) -> Result<()> {
            Ok(())
        }

        fn get_sample(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Xyz> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Xyz { x: 40.0, y: 42.0, z: 30.0 })
        }

        fn get_spectrum(&mut self, _cap: Cap, _cancel: &CancelToken) -> Result<Spectrum> {
            Spectrum::new(380.0, 730.0, vec![0.1, 0.2], 1.0)
        }

        fn set_options(&mut self, _options: &BTreeMap<String, String>, _cancel: &CancelToken) -> Result<()> {
            Ok(())
        }

        fn dump_device(&self) -> String {
            "fake".into()
        }
    }

    fn sensor(fail_lock: bool) -> Sensor {
        let driver = Box::new(FakeDriver { calls: Arc::new(AtomicUsize::new(0)), fail_lock });
        Sensor::coldplug("sensor-0", "/org/example/Sensor/0", driver).unwrap()
    }

    #[test]
    fn coldplug_populates_bookkeeping_and_goes_idle() {
        let s = sensor(false);
        assert_eq!(s.state(), State::Idle);
        assert_eq!(s.caps(), Cap::LCD | Cap::SPOT);
        assert!(s.native());
        assert!(!s.is_locked());
    }

    #[test]
    fn sample_requires_lock_and_ends_idle() {
        let s = sensor(false);
        let cancel = CancelToken::new();
        assert_eq!(s.get_sample(Cap::LCD, &cancel), Err(ErrorKind::NotLocked));
        assert_eq!(s.state(), State::Idle);
        s.lock(&cancel).unwrap();
        assert!(s.is_locked());
        let xyz = s.get_sample(Cap::LCD, &cancel).unwrap();
        assert!((xyz.y - 42.0).abs() < 1e-9);
        assert_eq!(s.state(), State::Idle);
    }

    #[test]
    fn failed_lock_still_returns_to_idle_and_stays_unlocked() {
        let s = sensor(true);
        let cancel = CancelToken::new();
        assert!(s.lock(&cancel).is_err());
        assert_eq!(s.state(), State::Idle);
        assert!(!s.is_locked());
    }

    #[test]
    fn cancellation_short_circuits_and_leaves_idle() {
        let s = sensor(false);
        let cancel = CancelToken::new();
        s.lock(&cancel).unwrap();
        cancel.cancel();
        assert_eq!(s.get_sample(Cap::LCD, &cancel), Err(ErrorKind::Cancelled));
        assert_eq!(s.state(), State::Idle);
    }

    #[test]
    fn property_changed_fires_on_lock_and_options() {
        let s = sensor(false);
        let cancel = CancelToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        s.on_event(move |ev| seen2.lock().unwrap().push(ev));
        s.lock(&cancel).unwrap();
        s.set_options(BTreeMap::from([("foo".into(), "bar".into())]), &cancel).unwrap();
        let events = seen.lock().unwrap();
        assert!(events.contains(&Event::PropertyChanged { name: "locked" }));
        assert!(events.contains(&Event::PropertyChanged { name: "options" }));
    }
}
