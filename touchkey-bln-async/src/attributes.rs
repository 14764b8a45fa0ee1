//! Text attribute surface.
//!
//! Every tunable and diagnostic value is exposed as an [`Attribute`] read or
//! written as a short line of text. Malformed input is logged and ignored,
//! leaving the previous value in place.

use core::fmt::Write;
use core::sync::atomic::Ordering;

use embassy_time::Duration;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use heapless::String;

use crate::backlight::BLN_VERSION;
use crate::config::{self, BreathingStep};
use crate::error::Error;
use crate::keys::KeyCode;
use crate::platform::Platform;
use crate::timer::TimerKind;
use crate::touchkey::Touchkey;
use crate::variant::{IDAC_BLOCK_LEN, IDAC_OFFSET, RAW_BLOCK_LEN, THRESHOLD_OFFSET};
use crate::work::Work;

/// Capacity of an attribute value.
pub const ATTRIBUTE_LEN: usize = 384;

/// An attribute value.
pub type AttributeText = String<ATTRIBUTE_LEN>;

/// The attributes of a touch-key panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// Write a display brightness level: 0 turns the backlight off, anything
    /// else turns it on (and sets the cap with dynamic brightness).
    LedControl,
    /// LED regulator voltage in mV.
    LedVoltage,
    FadeIn,
    FadeOut,
    FadeStepMs,
    FadeStepMv,
    /// Breathing during notifications, `on`/`off`.
    Breathing,
    /// One `start end period step` line appended per write, `reset` to clear.
    BreathingSteps,
    LedTimeoutMs,
    /// Touch backlight timeout in whole seconds.
    LedTimeout,
    LedOnTouch,
    DynBrightness,
    /// Notifications without a wake lock.
    Blnww,
    /// Force the touch backlight off.
    LedDisabled,
    /// Read only: whether the breathing table needs the CPU awake.
    NeedsWakeLock,
    /// Whether notifications may be shown at all.
    NotificationEnabled,
    /// Write 1 to show a notification, 0 to end it.
    NotificationLed,
    NotificationTimeout,
    BlinkControl,
    /// Read only notification interface version.
    Version,
    KeypadEnable,
    /// Read only: firmware version the driver can flash.
    FirmwareVersionRecommended,
    /// Read only: firmware version the panel reports.
    FirmwareVersionPanel,
    /// Write `S` to start a firmware update.
    FirmwareUpdate,
    FirmwareUpdateStatus,
    /// Read only: last sensitivity of a key.
    Sensitivity(KeyCode),
    /// Read only: raw count of the n-th key.
    RawCount(u8),
    /// Read only: idac value of the n-th key.
    Idac(u8),
    Threshold,
    /// Write 1 to start autocalibration.
    AutocalEnable,
    AutocalStatus,
    /// Write anything to switch the panel to sensitivity reporting.
    SensitivityMode,
}

fn text(args: core::fmt::Arguments<'_>) -> AttributeText {
    let mut out = AttributeText::new();
    // Every formatted value is far shorter than the capacity.
    let _ = out.write_fmt(args);
    out
}

fn flag(value: bool) -> AttributeText {
    text(format_args!("{}\n", u8::from(value)))
}

fn invalid(attr: Attribute, input: &str) {
    log::warn!("ignoring invalid value {:?} for {attr:?}", input.trim_end());
}

impl<I2cType, P> Touchkey<I2cType, P>
where
    I2cType: I2c<SevenBitAddress>,
    P: Platform,
{
    /// Reads an attribute as text.
    pub async fn read_attribute(
        &self,
        attr: Attribute,
    ) -> Result<AttributeText, Error<I2cType::Error>> {
        let value = match attr {
            Attribute::LedVoltage => text(format_args!("{}\n", self.with_state(|s| s.voltage_mv))),
            Attribute::FadeIn => flag(self.with_state(|s| s.settings.fade.fade_in)),
            Attribute::FadeOut => flag(self.with_state(|s| s.settings.fade.fade_out)),
            Attribute::FadeStepMs => text(format_args!(
                "{}\n",
                self.with_state(|s| s.settings.fade.step_interval.as_millis())
            )),
            Attribute::FadeStepMv => {
                text(format_args!("{}\n", self.with_state(|s| s.settings.fade.step_mv)))
            }
            Attribute::Breathing => flag(self.with_state(|s| s.settings.breathing)),
            Attribute::BreathingSteps => {
                let mut out = AttributeText::new();
                if self
                    .with_state(|s| s.settings.breathing_steps.render(&mut out))
                    .is_err()
                {
                    log::warn!("breathing table does not fit the attribute buffer");
                }
                out
            }
            Attribute::LedTimeoutMs => {
                text(format_args!("{}\n", self.with_state(|s| s.settings.led_timeout_ms)))
            }
            Attribute::LedTimeout => text(format_args!(
                "{}\n",
                self.with_state(|s| s.settings.led_timeout_ms / 1000)
            )),
            Attribute::LedOnTouch => flag(self.with_state(|s| s.settings.led_on_touch)),
            Attribute::DynBrightness => flag(self.with_state(|s| s.settings.dyn_brightness)),
            Attribute::Blnww => flag(self.with_state(|s| s.settings.bln_without_wakelock)),
            Attribute::LedDisabled => flag(self.with_state(|s| s.settings.led_disabled)),
            Attribute::NeedsWakeLock => {
                flag(self.with_state(|s| s.settings.breathing_steps.needs_wake_lock()))
            }
            Attribute::NotificationEnabled => flag(self.with_state(|s| s.bln_enabled)),
            Attribute::NotificationLed => flag(self.with_state(|s| s.bln_ongoing)),
            Attribute::NotificationTimeout => text(format_args!(
                "{}\n",
                self.with_state(|s| s.settings.notification_timeout_ms)
            )),
            Attribute::BlinkControl => flag(self.with_state(|s| s.blink)),
            Attribute::Version => text(format_args!("{BLN_VERSION}\n")),
            Attribute::KeypadEnable => flag(self.keypad_enabled.load(Ordering::Acquire)),
            Attribute::FirmwareVersionRecommended => {
                let policy = self.variant.firmware.ok_or(Error::Unsupported)?;
                text(format_args!("{:#x}\n", policy.latest))
            }
            Attribute::FirmwareVersionPanel => {
                let (firmware, module) = self.device.lock().await.read_versions().await?;
                log::debug!("panel firmware {firmware:#04x}, module {module:#04x}");
                text(format_args!("{firmware:#x}\n"))
            }
            Attribute::FirmwareUpdateStatus => {
                let status = self.with_state(|s| s.update_status);
                if status.as_str().is_empty() {
                    AttributeText::new()
                } else {
                    text(format_args!("{}\n", status.as_str()))
                }
            }
            Attribute::Sensitivity(key) => {
                let index = self.variant.index_of(key).ok_or(Error::Unsupported)?;
                let value = self.with_state(|s| s.sensitivity[index - 1]);
                text(format_args!("{value}\n"))
            }
            Attribute::RawCount(n) => {
                let offset = *self
                    .variant
                    .raw_counts
                    .get(usize::from(n))
                    .ok_or(Error::Unsupported)?;
                let mut data = [0u8; RAW_BLOCK_LEN];
                self.device.lock().await.read(&mut data).await?;
                let count = u16::from_be_bytes([data[offset], data[offset + 1]]);
                text(format_args!("{count}\n"))
            }
            Attribute::Idac(n) => {
                if usize::from(n) >= self.variant.keys.len() {
                    return Err(Error::Unsupported);
                }
                let mut data = [0u8; IDAC_BLOCK_LEN];
                self.device.lock().await.read(&mut data).await?;
                text(format_args!("{}\n", data[IDAC_OFFSET + usize::from(n)]))
            }
            Attribute::Threshold => {
                let mut data = [0u8; IDAC_BLOCK_LEN];
                self.device.lock().await.read(&mut data).await?;
                text(format_args!("{}\n", data[THRESHOLD_OFFSET]))
            }
            Attribute::AutocalStatus => {
                if self.autocal_enabled().await? {
                    text(format_args!("Enabled\n"))
                } else {
                    text(format_args!("Disabled\n"))
                }
            }
            Attribute::LedControl
            | Attribute::FirmwareUpdate
            | Attribute::AutocalEnable
            | Attribute::SensitivityMode => return Err(Error::Unsupported),
        };
        Ok(value)
    }

    /// Writes an attribute from text.
    ///
    /// Invalid input is not an error: it is logged and the previous value is
    /// kept. Errors are reserved for read-only attributes and hardware
    /// failures.
    pub async fn write_attribute(
        &self,
        attr: Attribute,
        input: &str,
    ) -> Result<(), Error<I2cType::Error>> {
        log::debug!("{attr:?} <- {:?}", input.trim_end());
        match attr {
            Attribute::LedControl => self.write_led_control(input).await,
            Attribute::LedVoltage => {
                match config::parse_int(input).and_then(|v| u32::try_from(v).ok()) {
                    Some(mv) => {
                        self.set_led_voltage(mv).await?;
                        self.with_state(|s| {
                            if mv <= s.settings.brightness_mv {
                                s.voltage_mv = mv;
                            }
                        });
                    }
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::FadeIn => {
                self.write_setting(attr, input, config::parse_switch, |s, v| {
                    s.fade.fade_in = v
                });
                Ok(())
            }
            Attribute::FadeOut => {
                self.write_setting(attr, input, config::parse_switch, |s, v| {
                    s.fade.fade_out = v
                });
                Ok(())
            }
            Attribute::FadeStepMs => {
                self.write_setting(attr, input, parse_positive, |s, v| {
                    s.fade.step_interval = Duration::from_millis(v.into())
                });
                Ok(())
            }
            Attribute::FadeStepMv => {
                self.write_setting(attr, input, parse_positive, |s, v| s.fade.step_mv = v);
                Ok(())
            }
            Attribute::Breathing => {
                match config::parse_switch(input) {
                    Some(on) => {
                        self.with_state(|s| s.settings.breathing = on);
                        if !on {
                            self.stop_breathing().await;
                        }
                    }
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::BreathingSteps => {
                self.write_breathing_step(input);
                Ok(())
            }
            Attribute::LedTimeoutMs => {
                match config::parse_int(input).and_then(|v| u32::try_from(v).ok()) {
                    Some(ms) => self.set_led_timeout(ms, false),
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::LedTimeout => {
                match config::parse_int(input).and_then(|v| u32::try_from(v).ok()) {
                    Some(secs) => self.set_led_timeout(secs.saturating_mul(1000), true),
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::LedOnTouch => {
                self.write_setting(attr, input, config::parse_switch, |s, v| {
                    s.led_on_touch = v
                });
                Ok(())
            }
            Attribute::DynBrightness => {
                self.write_setting(attr, input, config::parse_strict_switch, |s, v| {
                    s.dyn_brightness = v
                });
                Ok(())
            }
            Attribute::Blnww => {
                self.write_setting(attr, input, config::parse_strict_switch, |s, v| {
                    s.bln_without_wakelock = v
                });
                Ok(())
            }
            Attribute::LedDisabled => {
                match config::parse_switch(input) {
                    Some(disabled) => {
                        let ongoing = self.with_state(|s| {
                            s.settings.led_disabled = disabled;
                            s.bln_ongoing
                        });
                        if disabled {
                            self.timers.disarm(TimerKind::Led);
                            if !ongoing {
                                self.work.scheduler().schedule(Work::FadeOut);
                            }
                        }
                    }
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::NotificationEnabled => {
                match config::parse_strict_switch(input) {
                    Some(true) => self.with_state(|s| s.bln_enabled = true),
                    Some(false) => {
                        let ongoing = self.with_state(|s| {
                            s.bln_enabled = false;
                            s.bln_ongoing
                        });
                        if ongoing {
                            self.disable_led_notification().await?;
                        }
                    }
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::NotificationLed => match config::parse_int(input) {
                Some(1) => self.enable_led_notification().await,
                Some(0) => self.disable_led_notification().await,
                _ => {
                    invalid(attr, input);
                    Ok(())
                }
            },
            Attribute::NotificationTimeout => {
                self.write_setting(attr, input, config::parse_int, |s, v| {
                    s.notification_timeout_ms = v
                });
                Ok(())
            }
            Attribute::BlinkControl => match config::parse_int(input) {
                Some(1) => self.set_blink(true).await,
                Some(0) => self.set_blink(false).await,
                _ => {
                    invalid(attr, input);
                    Ok(())
                }
            },
            Attribute::KeypadEnable => {
                match config::parse_int(input) {
                    Some(v) => self.set_keypad_enabled(v != 0),
                    None => invalid(attr, input),
                }
                Ok(())
            }
            Attribute::FirmwareUpdate => {
                if self.variant.firmware.is_none() {
                    return Err(Error::Unsupported);
                }
                if input.starts_with('S') {
                    log::info!("touchkey firmware update requested");
                    self.request_firmware_update();
                } else {
                    invalid(attr, input);
                }
                Ok(())
            }
            Attribute::AutocalEnable => {
                if !self.variant.autocal {
                    return Err(Error::Unsupported);
                }
                if config::parse_int(input) == Some(1) {
                    self.autocalibrate().await?;
                }
                Ok(())
            }
            Attribute::SensitivityMode => {
                self.device
                    .lock()
                    .await
                    .command(crate::device::CMD_SENSITIVITY_MODE)
                    .await
            }
            Attribute::NeedsWakeLock
            | Attribute::Version
            | Attribute::FirmwareVersionRecommended
            | Attribute::FirmwareVersionPanel
            | Attribute::FirmwareUpdateStatus
            | Attribute::Sensitivity(_)
            | Attribute::RawCount(_)
            | Attribute::Idac(_)
            | Attribute::Threshold
            | Attribute::AutocalStatus => Err(Error::Unsupported),
        }
    }

    fn write_setting<T>(
        &self,
        attr: Attribute,
        input: &str,
        parse: impl FnOnce(&str) -> Option<T>,
        apply: impl FnOnce(&mut config::Settings, T),
    ) {
        match parse(input) {
            Some(value) => self.with_state(|s| apply(&mut s.settings, value)),
            None => invalid(attr, input),
        }
    }

    async fn write_led_control(&self, input: &str) -> Result<(), Error<I2cType::Error>> {
        let Some(level) = config::parse_int(input) else {
            invalid(Attribute::LedControl, input);
            return Ok(());
        };
        let (blocked, off_allowed) = self.with_state(|s| {
            let blocked = s.bln_enabled && s.bln_ongoing;
            if !blocked {
                if let Ok(level) = u32::try_from(level) {
                    s.settings.apply_brightness_level(level);
                }
            }
            (blocked, s.settings.led_timeout_ms == 0)
        });
        if blocked {
            log::debug!("notification shown, ignoring LED control");
            return Ok(());
        }

        if level == 0 {
            // With a timeout configured the timer turns the light off.
            if off_allowed {
                self.bl_off();
            }
        } else {
            self.bl_on().await;
        }
        let cmd = if level != 0 {
            self.variant.led_on
        } else {
            self.variant.led_off
        };
        self.with_state(|s| s.led_status = cmd);
        Ok(())
    }

    fn write_breathing_step(&self, input: &str) {
        if input.starts_with("reset") {
            self.with_state(|s| {
                s.settings.breathing_steps.reset();
                s.breathing.reset();
            });
            return;
        }
        let Some(step) = BreathingStep::parse(input) else {
            invalid(Attribute::BreathingSteps, input);
            return;
        };
        let pushed = self.with_state(|s| {
            let pushed = s.settings.breathing_steps.push(step).is_ok();
            s.breathing.reset();
            pushed
        });
        if !pushed {
            log::warn!(
                "breathing table full ({} steps), ignoring {step:?}",
                config::MAX_BREATHING_STEPS
            );
        }
    }

    /// Stores the touch backlight timeout and re-arms its timer.
    ///
    /// A zero timeout set in seconds also relights the backlight.
    fn set_led_timeout(&self, ms: u32, relight: bool) {
        let disabled = self.with_state(|s| {
            s.settings.led_timeout_ms = ms;
            s.settings.led_disabled
        });
        if disabled {
            return;
        }
        if ms == 0 {
            self.timers.disarm(TimerKind::Led);
            if relight {
                self.work.scheduler().schedule(Work::FadeIn);
            }
        } else {
            self.timers
                .arm(TimerKind::Led, Duration::from_millis(ms.into()));
        }
    }
}

fn parse_positive(input: &str) -> Option<u32> {
    config::parse_int(input)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}
