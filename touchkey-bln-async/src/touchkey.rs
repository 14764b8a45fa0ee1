//! The driver instance tying bus, engine and configuration together.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex as BlockingMutex},
    mutex::Mutex,
};
use embassy_time::{Duration, Timer};
use embedded_bus_async::RetryI2cDevice;
use embedded_hal_async::{
    digital::Wait,
    i2c::{I2c, SevenBitAddress},
};

use crate::backlight::{BacklightState, BreathingCursor, FadeLocks};
use crate::config::{Settings, BL_STANDARD};
use crate::device::Device;
use crate::error::Error;
use crate::firmware::UpdateStatus;
use crate::keys::{self, DebugTrace, KeyEvent};
use crate::platform::{KeySink, Platform};
use crate::timer::{TimerContext, TimerKind, Timers};
use crate::variant::{Variant, MAX_KEYS};
use crate::work::{Scheduler, Work, WorkQueue};

/// Longest status block any variant reads per interrupt.
const STATUS_MAX: usize = 18;

/// Plain driver state, only touched inside short critical sections.
pub(crate) struct State {
    pub(crate) settings: Settings,
    pub(crate) backlight: BacklightState,
    /// Voltage the LED currently runs at (or will, once lit).
    pub(crate) voltage_mv: u32,
    pub(crate) bln_enabled: bool,
    pub(crate) bln_ongoing: bool,
    pub(crate) blink: bool,
    pub(crate) suspended: bool,
    pub(crate) wake_locked: bool,
    /// Last LED command byte written.
    pub(crate) led_status: u8,
    /// The last LED command failed and is re-sent on resume.
    pub(crate) led_cmd_reversed: bool,
    pub(crate) update_status: UpdateStatus,
    pub(crate) breathing: BreathingCursor,
    pub(crate) sensitivity: [u8; MAX_KEYS],
    pub(crate) trace: DebugTrace,
}

impl State {
    fn new() -> Self {
        Self {
            settings: Settings::default(),
            backlight: BacklightState::Off,
            voltage_mv: BL_STANDARD,
            bln_enabled: false,
            bln_ongoing: false,
            blink: false,
            suspended: false,
            wake_locked: false,
            led_status: 0,
            led_cmd_reversed: false,
            update_status: UpdateStatus::Idle,
            breathing: BreathingCursor::new(),
            sensitivity: [0; MAX_KEYS],
            trace: DebugTrace::new(),
        }
    }
}

/// A touch-key panel with backlight notification support.
///
/// The instance is shared by reference between three tasks:
/// [`run_interrupts`](Self::run_interrupts) (interrupt context),
/// [`TimerContext::run`] (timer context, see [`timer_context`](Self::timer_context))
/// and [`run_worker`](Self::run_worker) (worker context).
pub struct Touchkey<I2cType, P> {
    pub(crate) device: Mutex<CriticalSectionRawMutex, Device<I2cType, P>>,
    pub(crate) state: BlockingMutex<CriticalSectionRawMutex, RefCell<State>>,
    pub(crate) variant: Variant,
    pub(crate) keypad_enabled: AtomicBool,
    pub(crate) irq_enabled: AtomicBool,
    pub(crate) touchscreen_active: AtomicBool,
    pub(crate) fade: FadeLocks,
    pub(crate) notify_lock: Mutex<CriticalSectionRawMutex, ()>,
    pub(crate) work: WorkQueue,
    pub(crate) timers: Timers,
}

impl<I2cType, P> Touchkey<I2cType, P>
where
    I2cType: I2c<SevenBitAddress>,
    P: Platform,
{
    /// Creates the driver for a panel of the given `variant`.
    ///
    /// The controller stays unpowered until [`probe`](Self::probe).
    pub fn new(i2c: I2cType, platform: P, variant: Variant) -> Self {
        Self::from_device(Device::new(i2c, platform), variant)
    }

    /// Like [`new`](Self::new) with a custom bus retry policy.
    pub fn with_bus(bus: RetryI2cDevice<I2cType>, platform: P, variant: Variant) -> Self {
        Self::from_device(Device::with_bus(bus, platform), variant)
    }

    fn from_device(device: Device<I2cType, P>, variant: Variant) -> Self {
        Self {
            device: Mutex::new(device),
            state: BlockingMutex::new(RefCell::new(State::new())),
            variant,
            keypad_enabled: AtomicBool::new(true),
            irq_enabled: AtomicBool::new(false),
            touchscreen_active: AtomicBool::new(false),
            fade: FadeLocks::new(),
            notify_lock: Mutex::new(()),
            work: WorkQueue::new(),
            timers: Timers::new(),
        }
    }

    /// Powers the panel, checks it answers, updates its firmware if needed
    /// and calibrates it.
    pub async fn probe(&self) -> Result<(), Error<I2cType::Error>> {
        log::info!("probing {} touchkey panel", self.variant.name);
        {
            let mut device = self.device.lock().await;
            device.mark_present();
            device.power_up().await;
            if let Err(err) = device.read_versions().await {
                log::error!("touchkey not detected: {err:?}");
                device.mark_absent();
                device.power_down();
                return Err(Error::NotDetected);
            }
            device.platform().set_led_power(true);
        }

        if let Err(err) = self.check_firmware().await {
            self.device.lock().await.mark_absent();
            return Err(err);
        }

        if self.variant.autocal {
            if let Err(err) = self.autocalibrate().await {
                log::warn!("autocalibration failed: {err:?}");
            }
        }

        self.trace(b'K');
        self.irq_enabled.store(true, Ordering::Release);
        Ok(())
    }

    /// Detaches the panel: stops all pending work and timers and powers it off.
    pub async fn remove(&self) {
        self.irq_enabled.store(false, Ordering::Release);
        self.cancel_deferred().await;
        self.timers.disarm_all();
        let release = self.with_state(|s| {
            s.bln_ongoing = false;
            s.backlight = BacklightState::Off;
            core::mem::take(&mut s.wake_locked)
        });
        let mut device = self.device.lock().await;
        device.power_down();
        device.mark_absent();
        if release {
            device.platform().set_wake_lock(false);
        }
        log::info!("touchkey removed");
    }

    /// Services one interrupt: reads the status block and reports the key.
    ///
    /// Returns the reported event. Out-of-range key indices are dropped, and
    /// presses are held back while the touchscreen is being touched.
    pub async fn handle_interrupt<S: KeySink>(
        &self,
        sink: &mut S,
    ) -> Result<Option<KeyEvent>, Error<I2cType::Error>> {
        self.trace(b'a');
        if !self.keypad_enabled.load(Ordering::Acquire) || !self.irq_enabled.load(Ordering::Acquire)
        {
            return Ok(None);
        }

        let mut buf = [0u8; STATUS_MAX];
        let len = self.variant.status_len.min(STATUS_MAX);
        let data = &mut buf[..len];
        self.device.lock().await.read(data).await.map_err(|err| {
            log::warn!("touchkey status read failed: {err:?}");
            err
        })?;

        let status = data[0];
        let variant = &self.variant;
        self.with_state(|s| {
            s.trace.push(status);
            for (slot, offset) in s.sensitivity.iter_mut().zip(variant.sensitivity) {
                if let Some(value) = data.get(*offset) {
                    *slot = *value;
                }
            }
        });

        let Some(event) = keys::decode(status, variant.keys) else {
            log::debug!("invalid key index in status {status:#04x}");
            return Ok(None);
        };
        if event.pressed {
            self.trace(b'P');
        }

        let reported = if event.pressed && self.touchscreen_active.load(Ordering::Acquire) {
            log::debug!("{:?} pressed during a touch, not reported", event.key);
            None
        } else {
            log::debug!("{:?} pressed: {}", event.key, event.pressed);
            sink.report(event);
            sink.sync();
            Some(event)
        };
        self.trace(b'A');

        if event.pressed {
            self.notify_touch().await;
        }
        Ok(reported)
    }

    /// Interrupt task: waits for the falling edge of the panel's interrupt
    /// line and handles it, forever.
    pub async fn run_interrupts<W: Wait, S: KeySink>(&self, mut irq: W, sink: &mut S) -> ! {
        loop {
            if let Err(err) = irq.wait_for_falling_edge().await {
                log::warn!("touchkey interrupt line error: {err:?}");
                Timer::after(Duration::from_millis(10)).await;
                continue;
            }
            if let Err(err) = self.handle_interrupt(sink).await {
                log::warn!("touchkey interrupt failed: {err:?}");
            }
        }
    }

    /// Worker task: runs deferred work, forever.
    pub async fn run_worker(&self) -> ! {
        loop {
            let work = self.work.next().await;
            if let Err(err) = self.perform(work).await {
                log::warn!("{work:?} failed: {err:?}");
            }
        }
    }

    /// Runs one work item now.
    pub async fn perform(&self, work: Work) -> Result<(), Error<I2cType::Error>> {
        log::trace!("performing {work:?}");
        match work {
            Work::FadeIn => self.fade_in().await,
            Work::FadeOut => self.fade_out().await,
            Work::BacklightOff => {
                self.bl_off();
                Ok(())
            }
            Work::NotificationOff => self.notification_off().await,
            Work::Breathe => {
                self.breathe().await;
                Ok(())
            }
            Work::FirmwareUpdate => self.update_firmware().await,
        }
    }

    /// The timer task for this instance.
    pub fn timer_context(&self) -> TimerContext<'_> {
        TimerContext::new(&self.timers, self.work.scheduler())
    }

    /// Enqueue-only handle on the work queue.
    pub fn scheduler(&self) -> Scheduler<'_> {
        self.work.scheduler()
    }

    /// Enters system suspend.
    ///
    /// Running fades are stopped and waited for before the rails are
    /// touched, and queued fades and firmware updates are dropped.
    /// Notification timeouts and breathing updates already queued still run.
    /// Pressed keys are released. The backlight is turned off unless a
    /// notification is shown, in which case the controller stays powered so
    /// the notification stays lit.
    pub async fn suspend<S: KeySink>(&self, sink: &mut S) {
        self.irq_enabled.store(false, Ordering::Release);
        self.work.cancel(Work::FirmwareUpdate);
        self.cancel_fades().await;

        for (pos, key) in self.variant.keys.iter().enumerate() {
            sink.report(KeyEvent {
                index: pos as u8 + 1,
                key: *key,
                pressed: false,
            });
        }
        sink.sync();

        let ongoing = self.with_state(|s| s.bln_ongoing);
        if !ongoing {
            if let Err(err) = self.fade_out().await {
                log::warn!("backlight off on suspend failed: {err:?}");
            }
        }
        self.with_state(|s| {
            s.suspended = true;
            s.trace.push(b'S');
        });
        if !ongoing {
            self.device.lock().await.power_down();
        }
        log::debug!("touchkey suspended");
    }

    /// Leaves system suspend.
    ///
    /// A notification still shown is ended without turning the LED off, the
    /// touch backlight then takes over.
    pub async fn resume(&self) {
        let _guard = self.notify_lock.lock().await;
        self.trace(b'R');

        let (ongoing, release) = self.with_state(|s| {
            s.suspended = false;
            let ongoing = core::mem::take(&mut s.bln_ongoing);
            (ongoing, core::mem::take(&mut s.wake_locked))
        });
        if ongoing {
            self.timers.disarm(TimerKind::Notification);
            self.stop_breathing().await;
        }
        if release {
            log::debug!("releasing notification wake lock");
            self.device.lock().await.platform().set_wake_lock(false);
        }

        self.cancel_fades().await;
        self.timers.disarm(TimerKind::Notification);
        self.timers.disarm(TimerKind::Led);

        self.device.lock().await.power_up().await;

        if self.variant.autocal {
            if let Err(err) = self.autocalibrate().await {
                log::warn!("autocalibration on resume failed: {err:?}");
            }
        }

        let resend = self.with_state(|s| {
            core::mem::take(&mut s.led_cmd_reversed).then_some(s.led_status)
        });
        if let Some(cmd) = resend {
            match self.device.lock().await.command(cmd).await {
                Ok(()) => log::debug!("LED command {cmd:#04x} restored"),
                Err(err) => log::warn!("restoring LED command failed: {err:?}"),
            }
        }

        self.irq_enabled.store(true, Ordering::Release);
        self.bl_on().await;
        log::debug!("touchkey resumed");
    }

    /// Tells the driver whether the companion touchscreen is being touched.
    pub fn set_touchscreen_active(&self, active: bool) {
        self.touchscreen_active.store(active, Ordering::Release);
    }

    /// Enables or disables key reporting.
    pub fn set_keypad_enabled(&self, enabled: bool) {
        self.keypad_enabled.store(enabled, Ordering::Release);
    }

    pub fn keypad_enabled(&self) -> bool {
        self.keypad_enabled.load(Ordering::Acquire)
    }

    /// Whether interrupts are currently serviced.
    pub fn interrupts_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::Acquire)
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> Settings {
        self.with_state(|s| s.settings.clone())
    }

    /// Changes settings directly, without the side effects the attribute
    /// surface applies.
    pub fn update_settings<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        self.with_state(|s| f(&mut s.settings))
    }

    pub fn backlight_state(&self) -> BacklightState {
        self.with_state(|s| s.backlight)
    }

    pub fn notification_ongoing(&self) -> bool {
        self.with_state(|s| s.bln_ongoing)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.with_state(|s| s.bln_enabled)
    }

    pub fn update_status(&self) -> UpdateStatus {
        self.with_state(|s| s.update_status)
    }

    /// The last recorded sensitivity of each key, in variant key order.
    pub fn sensitivity(&self) -> [u8; MAX_KEYS] {
        self.with_state(|s| s.sensitivity)
    }

    /// The debug trace, oldest byte first.
    pub fn debug_trace(&self) -> heapless::Vec<u8, 100> {
        self.with_state(|s| s.trace.iter().collect())
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        self.state.lock(|s| f(&mut s.borrow_mut()))
    }

    pub(crate) fn trace(&self, value: u8) {
        self.with_state(|s| s.trace.push(value));
    }

    pub(crate) fn set_backlight(&self, state: BacklightState) {
        self.with_state(|s| s.backlight = state);
    }

    pub(crate) async fn is_enabled(&self) -> bool {
        self.device.lock().await.is_ready()
    }

    /// Sets the LED voltage unless it exceeds the brightness cap.
    ///
    /// Refused with [`Error::NotReady`] while the controller is not enabled.
    pub(crate) async fn set_led_voltage(
        &self,
        millivolts: u32,
    ) -> Result<(), Error<I2cType::Error>> {
        let cap = self.with_state(|s| s.settings.brightness_mv);
        if millivolts > cap {
            log::debug!("ignoring LED voltage {millivolts}mV, cap is {cap}mV");
            return Ok(());
        }
        let mut device = self.device.lock().await;
        if !device.is_ready() {
            log::debug!("LED voltage {millivolts}mV refused, controller not enabled");
            return Err(Error::NotReady);
        }
        device.platform().set_led_voltage(millivolts);
        Ok(())
    }

    /// Switches the LED rail. Refused while the controller is not enabled.
    pub(crate) async fn set_led_power(&self, on: bool) -> Result<(), Error<I2cType::Error>> {
        let mut device = self.device.lock().await;
        if !device.is_ready() {
            log::debug!("LED rail switch refused, controller not enabled");
            return Err(Error::NotReady);
        }
        device.platform().set_led_power(on);
        Ok(())
    }

    /// Writes the variant's LED on or off command.
    pub(crate) async fn write_led(&self, on: bool) -> Result<(), Error<I2cType::Error>> {
        let cmd = if on {
            self.variant.led_on
        } else {
            self.variant.led_off
        };
        let result = self.device.lock().await.command(cmd).await;
        self.with_state(|s| {
            s.led_status = cmd;
            if matches!(result, Err(Error::Bus(_))) {
                s.led_cmd_reversed = true;
            }
        });
        result.map_err(|err| {
            log::warn!("LED command {cmd:#04x} failed: {err:?}");
            err
        })
    }

    /// Stops both fade directions and drops their queued work.
    async fn cancel_fades(&self) {
        for work in [Work::FadeIn, Work::FadeOut] {
            self.work.cancel(work);
            self.work.abort(work);
        }
        drop(self.fade.fade_in.lock().await);
        drop(self.fade.fade_out.lock().await);
    }

    /// Drops all queued work and waits for running ramps to stop.
    async fn cancel_deferred(&self) {
        self.work.clear();
        self.cancel_fades().await;
    }
}
