//! The bus-facing half of the driver: the readiness gate in front of the
//! controller's registers plus the board's power rails.

use embassy_time::{Duration, Timer};
use embedded_bus_async::RetryI2cDevice;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::error::Error;
use crate::platform::Platform;

/// Seven bit address of the touch-key controller.
pub const I2C_ADDRESS: SevenBitAddress = 0x20;

/// Length of the version block (status, firmware, module).
pub const VERSION_LEN: usize = 3;

/// Puts the controller into sensitivity reporting mode.
pub const CMD_SENSITIVITY_MODE: u8 = 0x40;

/// Time the controller needs after its supply comes up.
pub const POWER_ON_SETTLE: Duration = Duration::from_millis(50);

/// Registers, rails and the "enabled" gate of one touch-key controller.
///
/// Every register access is refused with [`Error::NotReady`] while the
/// controller is unpowered or was found absent, without touching the bus.
pub struct Device<I2cType, P> {
    bus: RetryI2cDevice<I2cType>,
    platform: P,
    enabled: bool,
    present: bool,
    firmware_ver: u8,
    module_ver: u8,
}

impl<I2cType, P> Device<I2cType, P>
where
    I2cType: I2c<SevenBitAddress>,
    P: Platform,
{
    /// Creates a device on `i2c` at [`I2C_ADDRESS`] with the default retry policy.
    pub fn new(i2c: I2cType, platform: P) -> Self {
        Self::with_bus(RetryI2cDevice::new(i2c, I2C_ADDRESS), platform)
    }

    /// Creates a device on an already configured retrying bus.
    pub fn with_bus(bus: RetryI2cDevice<I2cType>, platform: P) -> Self {
        Self {
            bus,
            platform,
            enabled: false,
            present: true,
            firmware_ver: 0,
            module_ver: 0,
        }
    }

    /// Whether register accesses are currently allowed.
    pub fn is_ready(&self) -> bool {
        self.enabled && self.present
    }

    /// Whether the controller is powered and marked enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Firmware version read during the last version query.
    pub fn firmware_version(&self) -> u8 {
        self.firmware_ver
    }

    /// Module revision read during the last version query.
    pub fn module_version(&self) -> u8 {
        self.module_ver
    }

    /// Access to the board hooks.
    pub fn platform(&mut self) -> &mut P {
        &mut self.platform
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn mark_absent(&mut self) {
        self.present = false;
    }

    pub(crate) fn mark_present(&mut self) {
        self.present = true;
    }

    /// Reads a raw block from the controller.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(), Error<I2cType::Error>> {
        if !self.is_ready() {
            log::error!("touchkey read refused, controller not enabled");
            return Err(Error::NotReady);
        }
        self.bus.read(buf).await.map_err(Error::Bus)
    }

    /// Writes a raw block to the controller.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error<I2cType::Error>> {
        if !self.is_ready() {
            log::error!("touchkey write refused, controller not enabled");
            return Err(Error::NotReady);
        }
        self.bus.write(data).await.map_err(Error::Bus)
    }

    /// Sends a one byte command.
    pub async fn command(&mut self, cmd: u8) -> Result<(), Error<I2cType::Error>> {
        self.write(&[cmd]).await
    }

    /// Reads and caches firmware and module versions.
    pub async fn read_versions(&mut self) -> Result<(u8, u8), Error<I2cType::Error>> {
        let mut data = [0u8; VERSION_LEN];
        self.read(&mut data).await.map_err(|err| {
            log::error!("touchkey version read failed: {err:?}");
            err
        })?;
        self.firmware_ver = data[1];
        self.module_ver = data[2];
        log::debug!(
            "touchkey firmware {:#04x}, module {:#04x}",
            self.firmware_ver,
            self.module_ver
        );
        Ok((self.firmware_ver, self.module_ver))
    }

    /// Powers the controller, waits for it to settle and opens the gate.
    pub async fn power_up(&mut self) {
        self.platform.set_key_power(true);
        Timer::after(POWER_ON_SETTLE).await;
        self.enabled = true;
    }

    /// Closes the gate and cuts both rails.
    pub fn power_down(&mut self) {
        self.enabled = false;
        self.platform.set_led_power(false);
        self.platform.set_key_power(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal::i2c::{ErrorKind, Operation};
    use embedded_hal_async::i2c;

    #[derive(Default)]
    struct CountingBus {
        calls: usize,
    }

    impl i2c::ErrorType for CountingBus {
        type Error = ErrorKind;
    }

    impl I2c for CountingBus {
        async fn transaction(
            &mut self,
            _address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), ErrorKind> {
            self.calls += 1;
            for op in operations {
                if let Operation::Read(buf) = op {
                    for (i, byte) in buf.iter_mut().enumerate() {
                        *byte = i as u8 * 3;
                    }
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Rails {
        key: bool,
        led: bool,
    }

    impl Platform for Rails {
        fn set_key_power(&mut self, on: bool) {
            self.key = on;
        }

        fn set_led_power(&mut self, on: bool) {
            self.led = on;
        }

        fn set_led_voltage(&mut self, _millivolts: u32) {}
    }

    #[test]
    fn unpowered_device_refuses_access() {
        let mut device = Device::new(CountingBus::default(), Rails::default());
        let mut buf = [0u8; 3];
        assert_eq!(block_on(device.read(&mut buf)), Err(Error::NotReady));
        assert_eq!(block_on(device.write(&[1])), Err(Error::NotReady));
        assert_eq!(device.bus.release().calls, 0);
    }

    #[test]
    fn absent_device_refuses_access_even_when_powered() {
        let mut device = Device::new(CountingBus::default(), Rails::default());
        block_on(device.power_up());
        device.mark_absent();
        assert_eq!(block_on(device.command(1)), Err(Error::NotReady));
    }

    #[test]
    fn versions_are_cached() {
        let mut device = Device::new(CountingBus::default(), Rails::default());
        block_on(device.power_up());
        assert!(device.platform().key);
        assert_eq!(block_on(device.read_versions()), Ok((3, 6)));
        assert_eq!(device.firmware_version(), 3);
        assert_eq!(device.module_version(), 6);
    }

    #[test]
    fn power_down_closes_the_gate() {
        let mut device = Device::new(CountingBus::default(), Rails::default());
        block_on(device.power_up());
        device.platform().set_led_power(true);
        device.power_down();
        assert!(!device.is_enabled());
        assert!(!device.platform().key);
        assert!(!device.platform().led);
    }
}
