//! Firmware update and autocalibration.

use core::sync::atomic::Ordering;

use embassy_time::{Duration, Timer};
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::error::Error;
use crate::platform::Platform;
use crate::touchkey::Touchkey;
use crate::work::Work;

/// Flash attempts before an update is declared failed.
pub const FLASH_ATTEMPTS: usize = 3;
/// Pause after each flash attempt.
pub const FLASH_SETTLE: Duration = Duration::from_millis(50);

/// Autocalibration attempts.
pub const AUTOCAL_ATTEMPTS: usize = 3;
/// Time the controller needs to run its calibration.
pub const AUTOCAL_SETTLE: Duration = Duration::from_millis(100);

const CMD_AUTOCAL: u8 = 0x50;
const AUTOCAL_STATUS_LEN: usize = 6;
const AUTOCAL_STATUS_BIT: u8 = 0x80;

/// Progress of the last firmware update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateStatus {
    #[default]
    Idle,
    Downloading,
    Pass,
    Fail,
}

impl UpdateStatus {
    /// Text as reported through the attribute surface, empty while idle.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Downloading => "Downloading",
            Self::Pass => "PASS",
            Self::Fail => "Fail",
        }
    }
}

impl<I2cType, P> Touchkey<I2cType, P>
where
    I2cType: I2c<SevenBitAddress>,
    P: Platform,
{
    /// Flashes the bundled image when the panel's firmware is older than it.
    ///
    /// Runs while probing with interrupts masked. On failure the controller
    /// is powered off.
    pub(crate) async fn check_firmware(&self) -> Result<(), Error<I2cType::Error>> {
        let Some(policy) = self.variant.firmware else {
            return Ok(());
        };
        let mut device = self.device.lock().await;
        let (firmware, module) = device.read_versions().await?;
        if !policy.needs_update(firmware, module) {
            log::debug!(
                "firmware {firmware:#04x} (module {module:#04x}) is up to date, latest {:#04x}",
                policy.latest
            );
            return Ok(());
        }

        log::info!("updating touchkey firmware {firmware:#04x} -> {:#04x}", policy.latest);
        self.with_state(|s| s.update_status = UpdateStatus::Downloading);
        for attempt in 1..=FLASH_ATTEMPTS {
            let flashed = device.platform().flash_firmware().await;
            Timer::after(FLASH_SETTLE).await;
            if flashed.is_ok() {
                self.with_state(|s| s.update_status = UpdateStatus::Pass);
                let (firmware, module) = device.read_versions().await?;
                log::info!("touchkey firmware now {firmware:#04x}, module {module:#04x}");
                return Ok(());
            }
            log::warn!("firmware flash attempt {attempt}/{FLASH_ATTEMPTS} failed");
        }

        device.platform().set_key_power(false);
        device.set_enabled(false);
        self.with_state(|s| s.update_status = UpdateStatus::Fail);
        log::error!("touchkey firmware update failed");
        Err(Error::Firmware)
    }

    /// Masks interrupts and queues a firmware update for the worker.
    pub fn request_firmware_update(&self) {
        self.irq_enabled.store(false, Ordering::Release);
        if !self.work.scheduler().schedule(Work::FirmwareUpdate) {
            log::debug!("firmware update already pending");
        }
    }

    /// Reflashes the controller. Interrupts are unmasked afterwards whatever
    /// the outcome.
    pub(crate) async fn update_firmware(&self) -> Result<(), Error<I2cType::Error>> {
        self.with_state(|s| s.update_status = UpdateStatus::Downloading);
        let result = self.flash_with_retries().await;
        self.irq_enabled.store(true, Ordering::Release);
        result
    }

    async fn flash_with_retries(&self) -> Result<(), Error<I2cType::Error>> {
        let mut device = self.device.lock().await;
        device.set_enabled(false);
        for attempt in 1..=FLASH_ATTEMPTS {
            if device.platform().flash_firmware().await.is_ok() {
                Timer::after(FLASH_SETTLE).await;
                device.set_enabled(true);
                drop(device);
                if self.variant.autocal {
                    self.autocalibrate().await?;
                }
                self.with_state(|s| s.update_status = UpdateStatus::Pass);
                log::info!("touchkey firmware update succeeded");
                return Ok(());
            }
            log::warn!("firmware flash attempt {attempt}/{FLASH_ATTEMPTS} failed");
            device.platform().set_key_power(false);
        }
        self.with_state(|s| s.update_status = UpdateStatus::Fail);
        log::error!("touchkey firmware update failed");
        Err(Error::Firmware)
    }

    /// Starts autocalibration and waits for the controller to confirm it.
    ///
    /// Returns whether calibration got enabled within [`AUTOCAL_ATTEMPTS`].
    pub async fn autocalibrate(&self) -> Result<bool, Error<I2cType::Error>> {
        if !self.variant.autocal {
            return Err(Error::Unsupported);
        }
        let mut device = self.device.lock().await;
        for attempt in 1..=AUTOCAL_ATTEMPTS {
            let mut data = [0u8; AUTOCAL_STATUS_LEN];
            device.read(&mut data[..4]).await?;
            device
                .write(&[CMD_AUTOCAL, data[1], data[2], 0x01])
                .await?;
            Timer::after(AUTOCAL_SETTLE).await;

            device.read(&mut data).await?;
            if data[5] & AUTOCAL_STATUS_BIT != 0 {
                log::debug!("autocalibration enabled");
                return Ok(true);
            }
            log::debug!("autocalibration not enabled, attempt {attempt}/{AUTOCAL_ATTEMPTS}");
        }
        log::warn!("autocalibration failed");
        Ok(false)
    }

    /// Whether the controller reports autocalibration as enabled.
    pub async fn autocal_enabled(&self) -> Result<bool, Error<I2cType::Error>> {
        if !self.variant.autocal {
            return Err(Error::Unsupported);
        }
        let mut data = [0u8; AUTOCAL_STATUS_LEN];
        self.device.lock().await.read(&mut data).await?;
        Ok(data[5] & AUTOCAL_STATUS_BIT != 0)
    }
}
