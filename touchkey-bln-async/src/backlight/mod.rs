//! The backlight and notification engine.
//!
//! Illumination is driven through three knobs: the LED rail, the LED
//! regulator voltage and the controller's LED on/off command. Fades ramp the
//! voltage between [`BL_MIN`](crate::config::BL_MIN) and the brightness cap,
//! breathing walks a table of voltage segments while a notification is shown.

mod breathing;
mod fade;
mod notification;

pub use breathing::BreathingCursor;

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::Duration;

/// Time the LED needs to go dark before its voltage may be raised again.
pub const LED_OFF_SETTLE: Duration = Duration::from_millis(100);

/// Delay before the first breathing update after a notification starts.
pub const BREATHING_START_DELAY: Duration = Duration::from_millis(40);

/// Version reported for the notification interface.
pub const BLN_VERSION: u8 = 9;

/// What the key backlight is currently doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BacklightState {
    #[default]
    Off,
    On,
    FadingIn,
    FadingOut,
    Breathing,
}

/// One lock per fade direction. A ramp holds its direction's lock for its
/// whole duration.
pub(crate) struct FadeLocks {
    pub(crate) fade_in: Mutex<CriticalSectionRawMutex, ()>,
    pub(crate) fade_out: Mutex<CriticalSectionRawMutex, ()>,
}

impl FadeLocks {
    pub(crate) const fn new() -> Self {
        Self {
            fade_in: Mutex::new(()),
            fade_out: Mutex::new(()),
        }
    }
}
