//! An asynchronous, `no_std` driver for capacitive touch-key panels with
//! backlight notification (BLN) support.
//!
//! The driver decodes key presses from the panel controller, drives the key
//! backlight (fades, touch timeout, notifications, breathing) and exposes its
//! configuration as text attributes.
//!
//! # Usage
//!
//! You need an I2C peripheral implementing `embedded-hal-async::i2c::I2c`, the
//! panel's interrupt line implementing `embedded-hal-async::digital::Wait` and
//! a [`Platform`] implementation switching the board's rails. The driver is
//! shared by reference between three tasks.
//!
//! ```ignore
//! use embassy_futures::join::join3;
//! use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
//! use touchkey_bln_async::{variant, KeyEvent, Touchkey};
//!
//! static KEYS: Channel<CriticalSectionRawMutex, KeyEvent, 8> = Channel::new();
//!
//! async fn touchkeys(i2c: impl I2c, irq: impl Wait, platform: impl Platform) {
//!     let touchkey = Touchkey::new(i2c, platform, variant::MENU_BACK);
//!     touchkey.probe().await.unwrap();
//!
//!     let mut sink = KEYS.sender();
//!     join3(
//!         touchkey.run_interrupts(irq, &mut sink),
//!         touchkey.timer_context().run(),
//!         touchkey.run_worker(),
//!     )
//!     .await;
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod attributes;
pub mod backlight;
pub mod config;
pub mod device;
pub mod error;
pub mod firmware;
pub mod keys;
pub mod platform;
pub mod timer;
pub mod touchkey;
pub mod variant;
pub mod work;

pub use attributes::Attribute;
pub use backlight::BacklightState;
pub use config::Settings;
pub use error::Error;
pub use firmware::UpdateStatus;
pub use keys::{KeyCode, KeyEvent};
pub use platform::{KeySink, Platform};
pub use touchkey::Touchkey;
pub use variant::Variant;
pub use work::Work;
