//! Error types for the touch-key driver.

use core::fmt::{self, Debug};

/// The main error type of the touch-key driver.
///
/// `E` is the error type of the underlying I2C bus.
pub enum Error<E> {
    /// The controller is powered down, suspended or was never probed.
    /// No bus traffic was generated.
    NotReady,
    /// A bus transfer failed on every retry.
    Bus(E),
    /// The controller did not answer the version query while probing.
    NotDetected,
    /// The attribute cannot be accessed in the requested direction or is not
    /// backed by the selected hardware variant.
    Unsupported,
    /// Flashing new firmware failed on every retry.
    Firmware,
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "NotReady"),
            Self::Bus(err) => write!(f, "Bus({err:?})"),
            Self::NotDetected => write!(f, "NotDetected"),
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Firmware => write!(f, "Firmware"),
        }
    }
}

impl<E: PartialEq> PartialEq for Error<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bus(a), Self::Bus(b)) => a == b,
            (Self::NotReady, Self::NotReady)
            | (Self::NotDetected, Self::NotDetected)
            | (Self::Unsupported, Self::Unsupported)
            | (Self::Firmware, Self::Firmware) => true,
            _ => false,
        }
    }
}
