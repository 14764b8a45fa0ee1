#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress};
use embedded_hal_async::i2c::{self, I2c};
use touchkey_bln_async::{KeyEvent, KeySink, Platform, Touchkey, Variant};

/// Everything the driver did to the panel, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read(usize),
    Write(Vec<u8>),
    KeyPower(bool),
    LedPower(bool),
    Voltage(u32),
    Retention(bool),
    WakeLock(bool),
    Flash,
}

pub struct Panel {
    pub log: Vec<Op>,
    /// Returned (zero padded) for every read.
    pub block: Vec<u8>,
    pub absent: bool,
    pub flash_results: VecDeque<bool>,
}

#[derive(Clone)]
pub struct Shared(pub Rc<RefCell<Panel>>);

impl Shared {
    pub fn log(&self) -> Vec<Op> {
        self.0.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.0.borrow_mut().log.clear();
    }

    pub fn count(&self, op: &Op) -> usize {
        self.0.borrow().log.iter().filter(|o| *o == op).count()
    }

    pub fn bus_ops(&self) -> usize {
        self.0
            .borrow()
            .log
            .iter()
            .filter(|o| matches!(o, Op::Read(_) | Op::Write(_)))
            .count()
    }

    pub fn voltages(&self) -> Vec<u32> {
        self.0
            .borrow()
            .log
            .iter()
            .filter_map(|o| match o {
                Op::Voltage(mv) => Some(*mv),
                _ => None,
            })
            .collect()
    }

    pub fn set_status(&self, status: u8) {
        self.0.borrow_mut().block[0] = status;
    }

    pub fn set_byte(&self, offset: usize, value: u8) {
        self.0.borrow_mut().block[offset] = value;
    }
}

pub struct MockBus(pub Shared);

impl i2c::ErrorType for MockBus {
    type Error = ErrorKind;
}

impl I2c for MockBus {
    async fn transaction(
        &mut self,
        _address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), ErrorKind> {
        let mut panel = self.0 .0.borrow_mut();
        if panel.absent {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Read(buf) => {
                    buf.fill(0);
                    let n = buf.len().min(panel.block.len());
                    buf[..n].copy_from_slice(&panel.block[..n]);
                    panel.log.push(Op::Read(buf.len()));
                }
                Operation::Write(data) => panel.log.push(Op::Write(data.to_vec())),
            }
        }
        Ok(())
    }
}

pub struct MockPlatform(pub Shared);

impl MockPlatform {
    fn push(&mut self, op: Op) {
        self.0 .0.borrow_mut().log.push(op);
    }
}

impl Platform for MockPlatform {
    fn set_key_power(&mut self, on: bool) {
        self.push(Op::KeyPower(on));
    }

    fn set_led_power(&mut self, on: bool) {
        self.push(Op::LedPower(on));
    }

    fn set_led_voltage(&mut self, millivolts: u32) {
        self.push(Op::Voltage(millivolts));
    }

    fn set_sleep_retention(&mut self, retain: bool) {
        self.push(Op::Retention(retain));
    }

    fn set_wake_lock(&mut self, held: bool) {
        self.push(Op::WakeLock(held));
    }

    async fn flash_firmware(&mut self) -> Result<(), ()> {
        self.push(Op::Flash);
        let ok = self.0 .0.borrow_mut().flash_results.pop_front().unwrap_or(false);
        if ok {
            Ok(())
        } else {
            Err(())
        }
    }
}

pub type TestTouchkey = Touchkey<MockBus, MockPlatform>;

/// Status block of an idle, up to date panel: firmware 0x0a, module 1,
/// autocalibration enabled.
pub fn default_block() -> Vec<u8> {
    let mut block = vec![0u8; 26];
    block[1] = 0x0A;
    block[2] = 0x01;
    block[5] = 0x80;
    block
}

pub fn touchkey(variant: Variant) -> (TestTouchkey, Shared) {
    touchkey_with_block(variant, default_block())
}

pub fn touchkey_with_block(variant: Variant, block: Vec<u8>) -> (TestTouchkey, Shared) {
    let shared = Shared(Rc::new(RefCell::new(Panel {
        log: Vec::new(),
        block,
        absent: false,
        flash_results: VecDeque::new(),
    })));
    let touchkey = Touchkey::new(
        MockBus(shared.clone()),
        MockPlatform(shared.clone()),
        variant,
    );
    (touchkey, shared)
}

/// A probed driver with an empty log.
pub fn probed(variant: Variant) -> (TestTouchkey, Shared) {
    let (touchkey, shared) = touchkey(variant);
    embassy_futures::block_on(touchkey.probe()).unwrap();
    shared.clear_log();
    (touchkey, shared)
}

/// Collects reported key events.
#[derive(Default)]
pub struct Keys {
    pub events: Vec<KeyEvent>,
    pub syncs: usize,
}

impl KeySink for Keys {
    fn report(&mut self, event: KeyEvent) {
        self.events.push(event);
    }

    fn sync(&mut self) {
        self.syncs += 1;
    }
}
