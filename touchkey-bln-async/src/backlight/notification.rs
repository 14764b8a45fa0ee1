use embassy_time::Duration;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use super::{BacklightState, BREATHING_START_DELAY};
use crate::error::Error;
use crate::platform::Platform;
use crate::timer::TimerKind;
use crate::touchkey::Touchkey;
use crate::work::Work;

impl<I2cType, P> Touchkey<I2cType, P>
where
    I2cType: I2c<SevenBitAddress>,
    P: Platform,
{
    /// Lights the touch backlight and (re)starts its timeout.
    ///
    /// Does nothing while the LED is force-disabled, a notification is shown
    /// or the controller is not enabled.
    pub async fn bl_on(&self) {
        let (disabled, ongoing, timeout) = self.with_state(|s| {
            (
                s.settings.led_disabled,
                s.bln_ongoing,
                s.settings.led_timeout(),
            )
        });
        if disabled {
            log::debug!("backlight is disabled, not turning on");
            return;
        }
        if ongoing || !self.is_enabled().await {
            return;
        }
        self.work.scheduler().schedule(Work::FadeIn);
        if let Some(timeout) = timeout {
            self.timers.arm(TimerKind::Led, timeout);
        }
    }

    /// Turns the touch backlight off unless a notification owns it.
    pub fn bl_off(&self) {
        let (disabled, ongoing) =
            self.with_state(|s| (s.settings.led_disabled, s.bln_ongoing));
        if disabled {
            log::debug!("backlight is disabled, nothing to turn off");
            return;
        }
        if ongoing {
            return;
        }
        self.work.scheduler().schedule(Work::FadeOut);
    }

    /// Key press hook: lights the backlight when configured to.
    pub(crate) async fn notify_touch(&self) {
        let light = self.with_state(|s| !s.suspended && s.settings.led_on_touch);
        if light {
            self.bl_on().await;
        }
    }

    /// Starts showing a notification.
    ///
    /// While suspended the controller is powered back up for it. Arms the
    /// notification timeout and starts breathing when configured.
    pub async fn enable_led_notification(&self) -> Result<(), Error<I2cType::Error>> {
        let _guard = self.notify_lock.lock().await;
        let (bln_enabled, suspended) = self.with_state(|s| (s.bln_enabled, s.suspended));
        if !bln_enabled {
            log::debug!("notifications are disabled");
            return Ok(());
        }

        if suspended && !self.is_enabled().await {
            self.activate().await;
        }
        if self.is_enabled().await {
            log::debug!("notification on");
            self.with_state(|s| s.bln_ongoing = true);
            self.set_sleep_retention(true).await;
            self.write_led(true).await?;
            self.set_backlight(BacklightState::On);
        }

        let (timeout, breathing) =
            self.with_state(|s| (s.settings.notification_timeout(), s.settings.breathing));
        if let Some(timeout) = timeout {
            self.timers.arm(TimerKind::Notification, timeout);
        }
        if breathing {
            self.with_state(|s| s.breathing.reset());
            self.timers.arm(TimerKind::Breathing, BREATHING_START_DELAY);
        }
        Ok(())
    }

    /// Stops showing a notification and powers down again when suspended.
    pub async fn disable_led_notification(&self) -> Result<(), Error<I2cType::Error>> {
        let _guard = self.notify_lock.lock().await;
        self.end_notification().await
    }

    pub(crate) async fn end_notification(&self) -> Result<(), Error<I2cType::Error>> {
        log::debug!("notification off");
        let (suspended, breathing) = self.with_state(|s| {
            s.blink = false;
            s.bln_ongoing = false;
            (s.suspended, s.settings.breathing)
        });
        self.set_sleep_retention(false).await;

        if !self.is_enabled().await {
            return Ok(());
        }
        let written = self.write_led(false).await;
        self.set_backlight(BacklightState::Off);
        if suspended {
            self.deactivate().await;
        }
        self.timers.disarm(TimerKind::Notification);
        if breathing {
            self.stop_breathing().await;
        }
        written
    }

    /// Notification timeout handler.
    pub(crate) async fn notification_off(&self) -> Result<(), Error<I2cType::Error>> {
        let _guard = self.notify_lock.lock().await;
        let ongoing = self.with_state(|s| s.bln_ongoing);
        if !ongoing || !self.is_enabled().await {
            return Ok(());
        }
        self.end_notification().await
    }

    /// One breathing update: sets the next voltage and re-arms the timer
    /// with the current step's period.
    pub(crate) async fn breathe(&self) {
        let ongoing = self.with_state(|s| s.bln_ongoing && s.settings.breathing);
        if !ongoing || !self.is_enabled().await {
            return;
        }
        let (mv, period_ms) = self.with_state(|s| {
            s.backlight = BacklightState::Breathing;
            let (mv, period_ms) = s.breathing.advance(s.settings.breathing_steps.steps());
            s.voltage_mv = mv;
            (mv, period_ms)
        });
        if self.set_led_voltage(mv).await.is_err() {
            return;
        }
        self.timers
            .arm(TimerKind::Breathing, Duration::from_millis(period_ms.into()));
    }

    /// Cancels the breathing timer and goes back to the steady voltage.
    pub async fn stop_breathing(&self) {
        self.timers.disarm(TimerKind::Breathing);
        let mv = self.with_state(|s| {
            if s.backlight == BacklightState::Breathing {
                s.backlight = if s.bln_ongoing {
                    BacklightState::On
                } else {
                    BacklightState::Off
                };
            }
            s.voltage_mv = s.settings.brightness_mv;
            s.voltage_mv
        });
        // The rails may already be down after a suspended notification.
        let _ = self.set_led_voltage(mv).await;
    }

    /// Blink phase control: `true` darkens the LED, `false` lights it again.
    pub async fn set_blink(&self, on: bool) -> Result<(), Error<I2cType::Error>> {
        self.with_state(|s| s.blink = on);
        self.write_led(!on).await
    }

    /// Powers the controller up for a notification while suspended.
    async fn activate(&self) {
        let hold = self.with_state(|s| {
            let hold = !s.settings.bln_without_wakelock || s.settings.needs_wake_lock();
            if hold && !s.wake_locked {
                s.wake_locked = true;
                true
            } else {
                false
            }
        });
        let mut device = self.device.lock().await;
        if hold {
            log::debug!("taking notification wake lock");
            device.platform().set_wake_lock(true);
        }
        log::debug!("activating controller for notification");
        device.power_up().await;
        device.platform().set_led_power(true);
    }

    /// Powers the controller down again after a notification while suspended.
    async fn deactivate(&self) {
        let release = self.with_state(|s| core::mem::take(&mut s.wake_locked));
        let mut device = self.device.lock().await;
        device.power_down();
        if release {
            log::debug!("releasing notification wake lock");
            device.platform().set_wake_lock(false);
        }
    }

    /// Keeps the rails powered through system sleep. Only used when
    /// notifications run without a wake lock.
    async fn set_sleep_retention(&self, retain: bool) {
        let blnww = self.with_state(|s| s.settings.bln_without_wakelock);
        if retain && !blnww {
            return;
        }
        self.device.lock().await.platform().set_sleep_retention(retain);
    }
}
