use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};
use embedded_hal::i2c::{Operation, SevenBitAddress};
use embedded_hal_async::i2c::{self, I2c};

/// `Mutex`-based shared bus [`I2c`] device.
///
/// Several drivers can hold a `MutexI2cDevice` pointing at the same bus, e.g.
/// the touch-key controller and the touchscreen that share one I2C port.
/// Every transaction locks the bus for its whole duration, so multi-message
/// transfers from different drivers never interleave.
pub struct MutexI2cDevice<'a, M: RawMutex, BUS> {
    bus: &'a Mutex<M, BUS>,
}

impl<'a, M: RawMutex, BUS> MutexI2cDevice<'a, M, BUS> {
    /// Create a new [`MutexI2cDevice`] on top of a shared bus.
    pub fn new(bus: &'a Mutex<M, BUS>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, BUS> i2c::ErrorType for MutexI2cDevice<'_, M, BUS>
where
    BUS: i2c::ErrorType,
{
    type Error = BUS::Error;
}

impl<M: RawMutex, BUS> I2c for MutexI2cDevice<'_, M, BUS>
where
    BUS: I2c<SevenBitAddress>,
{
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.transaction(address, operations).await
    }
}
