//! Collaborators the driver talks to besides the I2C bus.

use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Sender};

use crate::keys::KeyEvent;

/// Board hooks for the touch-key panel: power rails, LED regulator and a few
/// system services.
///
/// All rail operations are expected to be quick; the driver never holds them
/// across long waits.
#[allow(async_fn_in_trait)]
pub trait Platform {
    /// Switches the controller's supply.
    fn set_key_power(&mut self, on: bool);

    /// Switches the key LED supply.
    fn set_led_power(&mut self, on: bool);

    /// Sets the key LED regulator output.
    fn set_led_voltage(&mut self, millivolts: u32);

    /// Keeps (or stops keeping) both rails powered while the system sleeps,
    /// so a notification can stay lit.
    fn set_sleep_retention(&mut self, _retain: bool) {}

    /// Holds or releases a wake lock preventing deep sleep.
    fn set_wake_lock(&mut self, _held: bool) {}

    /// Programs the bundled firmware image into the controller.
    async fn flash_firmware(&mut self) -> Result<(), ()> {
        Err(())
    }
}

/// Receiver of decoded key events, typically the input subsystem.
pub trait KeySink {
    /// Reports one press or release.
    fn report(&mut self, event: KeyEvent);

    /// Marks the end of a batch of reports.
    fn sync(&mut self) {}
}

impl<M: RawMutex, const N: usize> KeySink for Sender<'_, M, KeyEvent, N> {
    fn report(&mut self, event: KeyEvent) {
        if self.try_send(event).is_err() {
            log::warn!("key event queue full, dropping {event:?}");
        }
    }
}
