#![cfg_attr(not(test), no_std)]
#![doc = "Asynchronous shared and retrying I2C bus devices for embedded-hal."]

// Note: The shared device mirrors the idea of embassy's shared bus helpers but
// borrows the bus mutex instead of reference counting it, so it works without
// an allocator.
//
// For the official Embassy implementation, see:
// - https://github.com/embassy-rs/embassy/tree/main/embassy-embedded-hal/src/shared_bus

pub mod i2c;
pub mod retry;

pub use i2c::MutexI2cDevice;
pub use retry::RetryI2cDevice;
