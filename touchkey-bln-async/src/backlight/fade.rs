use embassy_time::Timer;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use super::{BacklightState, LED_OFF_SETTLE};
use crate::config::BL_MIN;
use crate::error::Error;
use crate::platform::Platform;
use crate::touchkey::Touchkey;
use crate::work::Work;

impl<I2cType, P> Touchkey<I2cType, P>
where
    I2cType: I2c<SevenBitAddress>,
    P: Platform,
{
    /// Turns the backlight on, ramping up from [`BL_MIN`] when fade-in is
    /// enabled.
    ///
    /// A running fade-out is stopped and waited for first. A second fade-in
    /// requested while one is running is dropped.
    pub async fn fade_in(&self) -> Result<(), Error<I2cType::Error>> {
        self.work.abort(Work::FadeOut);
        drop(self.fade.fade_out.lock().await);

        let Ok(_guard) = self.fade.fade_in.try_lock() else {
            log::debug!("fade-in already running, ignoring");
            return Ok(());
        };
        self.work.clear_abort(Work::FadeIn);
        if !self.is_enabled().await {
            log::debug!("fade-in refused, controller not enabled");
            return Err(Error::NotReady);
        }

        let (fade, target) = self.with_state(|s| {
            s.voltage_mv = s.settings.brightness_mv;
            (s.settings.fade, s.voltage_mv)
        });

        if !fade.fade_in {
            self.set_led_voltage(target).await?;
            self.set_led_power(true).await?;
            self.write_led(true).await?;
            self.set_backlight(BacklightState::On);
            return Ok(());
        }

        self.set_backlight(BacklightState::FadingIn);
        self.set_led_voltage(BL_MIN).await?;
        self.set_led_power(true).await?;
        self.write_led(true).await?;

        let step = fade.step_mv.max(1);
        let mut mv = BL_MIN;
        while mv <= target {
            if self.work.is_aborted(Work::FadeIn) {
                log::debug!("fade-in aborted at {mv}mV");
                return Ok(());
            }
            self.set_led_voltage(mv).await?;
            Timer::after(fade.step_interval).await;
            mv += step;
        }
        self.set_backlight(BacklightState::On);
        Ok(())
    }

    /// Turns the backlight off, ramping down to [`BL_MIN`] when fade-out is
    /// enabled, then restores the voltage to the brightness cap.
    ///
    /// A running fade-in is stopped and waited for first. An aborted ramp
    /// leaves the LED to whoever aborted it.
    pub async fn fade_out(&self) -> Result<(), Error<I2cType::Error>> {
        self.work.abort(Work::FadeIn);
        drop(self.fade.fade_in.lock().await);

        let Ok(_guard) = self.fade.fade_out.try_lock() else {
            log::debug!("fade-out already running, ignoring");
            return Ok(());
        };
        self.work.clear_abort(Work::FadeOut);
        if !self.is_enabled().await {
            log::debug!("fade-out refused, controller not enabled");
            return Err(Error::NotReady);
        }

        let (fade, from) = self.with_state(|s| (s.settings.fade, s.voltage_mv));

        if fade.fade_out {
            self.set_backlight(BacklightState::FadingOut);
            let step = fade.step_mv.max(1);
            let mut mv = from;
            while mv >= BL_MIN {
                if self.work.is_aborted(Work::FadeOut) {
                    log::debug!("fade-out aborted at {mv}mV");
                    return Ok(());
                }
                self.set_led_voltage(mv).await?;
                Timer::after(fade.step_interval).await;
                mv = mv.saturating_sub(step);
                if mv == 0 {
                    break;
                }
            }
        }

        let written = self.write_led(false).await;
        let powered_off = self.set_led_power(false).await;
        self.set_backlight(BacklightState::Off);

        Timer::after(LED_OFF_SETTLE).await;
        let cap = self.with_state(|s| {
            s.voltage_mv = s.settings.brightness_mv;
            s.voltage_mv
        });
        let restored = self.set_led_voltage(cap).await;
        written.and(powered_off).and(restored)
    }
}
