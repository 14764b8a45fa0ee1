//! A single-address I2C device that retries failed transfers.
//!
//! Small capacitive controllers tend to NAK while they are busy scanning, so a
//! transfer is attempted a fixed number of times with a fixed pause in
//! between before the error is handed back to the driver.

use embassy_time::{Duration, Timer};
use embedded_hal::i2c::SevenBitAddress;
use embedded_hal_async::i2c::I2c;

/// Number of attempts made for every transfer unless configured otherwise.
pub const DEFAULT_ATTEMPTS: u8 = 3;
/// Pause between two attempts unless configured otherwise.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

/// An I2C device bound to one address with a fixed retry policy.
pub struct RetryI2cDevice<I2cType> {
    i2c: I2cType,
    address: SevenBitAddress,
    attempts: u8,
    backoff: Duration,
}

impl<I2cType> RetryI2cDevice<I2cType>
where
    I2cType: I2c<SevenBitAddress>,
{
    /// Creates a new `RetryI2cDevice` using the default retry policy.
    ///
    /// # Arguments
    ///
    /// * `i2c` - An I2C peripheral (or shared bus device) implementing `embedded-hal-async::i2c::I2c`.
    /// * `address` - The seven bit address of the target.
    pub fn new(i2c: I2cType, address: SevenBitAddress) -> Self {
        Self {
            i2c,
            address,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Replaces the retry policy. At least one attempt is always made.
    pub fn with_policy(mut self, attempts: u8, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// The address transfers are sent to.
    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Reads `buf.len()` bytes from the device.
    ///
    /// Returns the error of the last attempt when every attempt failed.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(), I2cType::Error> {
        let mut attempt = 1;
        loop {
            match self.i2c.read(self.address, buf).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.attempts => {
                    log::warn!(
                        "i2c read of {} bytes from {:#04x} failed ({attempt}/{}): {err:?}",
                        buf.len(),
                        self.address,
                        self.attempts
                    );
                    attempt += 1;
                    Timer::after(self.backoff).await;
                }
                Err(err) => {
                    log::error!(
                        "i2c read from {:#04x} failed after {} attempts: {err:?}",
                        self.address,
                        self.attempts
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Writes `data` to the device.
    ///
    /// Returns the error of the last attempt when every attempt failed.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), I2cType::Error> {
        let mut attempt = 1;
        loop {
            match self.i2c.write(self.address, data).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.attempts => {
                    log::warn!(
                        "i2c write of {} bytes to {:#04x} failed ({attempt}/{}): {err:?}",
                        data.len(),
                        self.address,
                        self.attempts
                    );
                    attempt += 1;
                    Timer::after(self.backoff).await;
                }
                Err(err) => {
                    log::error!(
                        "i2c write to {:#04x} failed after {} attempts: {err:?}",
                        self.address,
                        self.attempts
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Gives the underlying bus back.
    pub fn release(self) -> I2cType {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, Operation};
    use embedded_hal_async::i2c;

    struct FlakyBus {
        failures_left: usize,
        calls: usize,
        written: Vec<u8>,
    }

    impl FlakyBus {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: times,
                calls: 0,
                written: Vec::new(),
            }
        }
    }

    impl i2c::ErrorType for FlakyBus {
        type Error = ErrorKind;
    }

    impl I2c for FlakyBus {
        async fn transaction(
            &mut self,
            _address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), ErrorKind> {
            self.calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ErrorKind::Bus);
            }
            for op in operations {
                match op {
                    Operation::Read(buf) => buf.fill(0xA5),
                    Operation::Write(data) => self.written.extend_from_slice(data),
                }
            }
            Ok(())
        }
    }

    fn device(bus: FlakyBus) -> RetryI2cDevice<FlakyBus> {
        RetryI2cDevice::new(bus, 0x20).with_policy(DEFAULT_ATTEMPTS, Duration::from_millis(1))
    }

    #[test]
    fn read_recovers_after_transient_failures() {
        let mut dev = device(FlakyBus::failing(2));
        let mut buf = [0u8; 3];
        embassy_futures::block_on(dev.read(&mut buf)).unwrap();
        assert_eq!(buf, [0xA5; 3]);
        assert_eq!(dev.release().calls, 3);
    }

    #[test]
    fn read_gives_up_after_three_attempts() {
        let mut dev = device(FlakyBus::failing(5));
        let mut buf = [0u8; 3];
        let res = embassy_futures::block_on(dev.read(&mut buf));
        assert_eq!(res, Err(ErrorKind::Bus));
        assert_eq!(buf, [0u8; 3]);
        assert_eq!(dev.release().calls, 3);
    }

    #[test]
    fn write_is_sent_once_on_success() {
        let mut dev = device(FlakyBus::failing(0));
        embassy_futures::block_on(dev.write(&[0x01])).unwrap();
        let bus = dev.release();
        assert_eq!(bus.calls, 1);
        assert_eq!(bus.written, vec![0x01]);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut dev = RetryI2cDevice::new(FlakyBus::failing(1), 0x20)
            .with_policy(0, Duration::from_millis(1));
        assert!(embassy_futures::block_on(dev.write(&[0x02])).is_err());
        assert_eq!(dev.release().calls, 1);
    }
}
