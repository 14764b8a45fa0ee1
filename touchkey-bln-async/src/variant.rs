//! Per-board hardware descriptions.
//!
//! Panels built around the same controller differ in key layout, in how long
//! the status block is and in where the per-key diagnostic counters live.
//! A [`Variant`] captures those differences and is selected once when the
//! driver is created.

use crate::keys::KeyCode;

/// Maximum number of keys any variant carries.
pub const MAX_KEYS: usize = 4;

/// Length of the block holding the raw counts.
pub const RAW_BLOCK_LEN: usize = 26;
/// Length of the block holding threshold and idac values.
pub const IDAC_BLOCK_LEN: usize = 10;
/// Offset of the touch threshold inside the idac block.
pub const THRESHOLD_OFFSET: usize = 4;
/// Offset of the first idac value inside the idac block.
pub const IDAC_OFFSET: usize = 6;

/// How a panel's firmware is checked against the image shipped with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwarePolicy {
    /// Version of the image the platform can flash.
    pub latest: u8,
    /// Module revision the image was built for; `None` accepts any module.
    pub module: Option<u8>,
    /// Accept any module revision up to `module` instead of an exact match.
    pub module_at_most: bool,
}

impl FirmwarePolicy {
    /// Whether a panel reporting `firmware` / `module` should be reflashed.
    pub fn needs_update(&self, firmware: u8, module: u8) -> bool {
        if firmware >= self.latest {
            return false;
        }
        match self.module {
            None => true,
            Some(expected) if self.module_at_most => module <= expected,
            Some(expected) => module == expected,
        }
    }
}

/// Hardware description of one touch-key panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    /// Human readable board name used in logs.
    pub name: &'static str,
    /// Keys in controller index order (index 1 is the first entry).
    pub keys: &'static [KeyCode],
    /// Bytes read per interrupt.
    pub status_len: usize,
    /// Offset of each key's sensitivity byte inside the status block.
    pub sensitivity: &'static [usize],
    /// Offset of each key's big-endian raw count inside the raw block.
    pub raw_counts: &'static [usize],
    /// Command byte switching the key LEDs on.
    pub led_on: u8,
    /// Command byte switching the key LEDs off.
    pub led_off: u8,
    /// Whether the firmware supports autocalibration.
    pub autocal: bool,
    /// Firmware update policy; `None` disables updates.
    pub firmware: Option<FirmwarePolicy>,
}

impl Variant {
    /// Returns the controller index (1-based) of `key`, if the panel has it.
    pub fn index_of(&self, key: KeyCode) -> Option<usize> {
        self.keys.iter().position(|k| *k == key).map(|pos| pos + 1)
    }
}

/// Menu + back panel found on most boards.
pub const MENU_BACK: Variant = Variant {
    name: "menu-back",
    keys: &[KeyCode::Menu, KeyCode::Back],
    status_len: 10,
    sensitivity: &[7, 9],
    raw_counts: &[10, 12],
    led_on: 0x01,
    led_off: 0x02,
    autocal: false,
    firmware: Some(FirmwarePolicy {
        latest: 0x0A,
        module: None,
        module_at_most: false,
    }),
};

/// Menu + back panel with the long status block and autocalibration.
pub const MENU_BACK_AUTOCAL: Variant = Variant {
    name: "menu-back-autocal",
    keys: &[KeyCode::Menu, KeyCode::Back],
    status_len: 18,
    sensitivity: &[13, 11],
    raw_counts: &[14, 16],
    led_on: 0x01,
    led_off: 0x02,
    autocal: true,
    firmware: Some(FirmwarePolicy {
        latest: 0x06,
        module: Some(0x05),
        module_at_most: false,
    }),
};

/// Back + menu panel (reversed key order).
pub const BACK_MENU: Variant = Variant {
    name: "back-menu",
    keys: &[KeyCode::Back, KeyCode::Menu],
    status_len: 18,
    sensitivity: &[11, 13],
    raw_counts: &[14, 16],
    led_on: 0x01,
    led_off: 0x02,
    autocal: true,
    firmware: Some(FirmwarePolicy {
        latest: 0x09,
        module: Some(0x08),
        module_at_most: true,
    }),
};

/// Four key search / back / home / menu panel.
pub const FOUR_KEY: Variant = Variant {
    name: "four-key",
    keys: &[KeyCode::Search, KeyCode::Back, KeyCode::Home, KeyCode::Menu],
    status_len: 18,
    sensitivity: &[11, 13, 15, 17],
    raw_counts: &[18, 20, 22, 24],
    led_on: 0x10,
    led_off: 0x20,
    autocal: true,
    firmware: None,
};

/// Four key menu / enter / back / end panel.
pub const FOUR_KEY_CARRIER: Variant = Variant {
    name: "four-key-carrier",
    keys: &[KeyCode::Menu, KeyCode::Enter, KeyCode::Back, KeyCode::End],
    status_len: 10,
    sensitivity: &[6, 7, 8, 9],
    raw_counts: &[18, 20, 22, 24],
    led_on: 0x01,
    led_off: 0x02,
    autocal: false,
    firmware: None,
};
