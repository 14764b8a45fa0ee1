mod common;

use common::{probed, touchkey, Op};
use embassy_futures::block_on;
use touchkey_bln_async::{variant, Attribute, Error};

fn read(touchkey: &common::TestTouchkey, attr: Attribute) -> String {
    block_on(touchkey.read_attribute(attr))
        .unwrap()
        .as_str()
        .to_owned()
}

fn write(touchkey: &common::TestTouchkey, attr: Attribute, value: &str) {
    block_on(touchkey.write_attribute(attr, value)).unwrap();
}

#[test]
fn defaults() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    assert_eq!(read(&touchkey, Attribute::FadeIn), "0\n");
    assert_eq!(read(&touchkey, Attribute::FadeOut), "0\n");
    assert_eq!(read(&touchkey, Attribute::FadeStepMs), "50\n");
    assert_eq!(read(&touchkey, Attribute::FadeStepMv), "50\n");
    assert_eq!(read(&touchkey, Attribute::NotificationTimeout), "-1\n");
    assert_eq!(read(&touchkey, Attribute::LedTimeoutMs), "0\n");
    assert_eq!(read(&touchkey, Attribute::Version), "9\n");
    assert_eq!(read(&touchkey, Attribute::NeedsWakeLock), "0\n");
    assert_eq!(read(&touchkey, Attribute::KeypadEnable), "1\n");
    assert_eq!(
        read(&touchkey, Attribute::BreathingSteps),
        "3000mV 3000mV 1000ms 50mV\n"
    );
}

#[test]
fn switches_take_words_and_numbers() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    write(&touchkey, Attribute::FadeIn, "on");
    assert_eq!(read(&touchkey, Attribute::FadeIn), "1\n");
    write(&touchkey, Attribute::FadeIn, "off\n");
    assert_eq!(read(&touchkey, Attribute::FadeIn), "0\n");
    write(&touchkey, Attribute::LedOnTouch, "1");
    assert_eq!(read(&touchkey, Attribute::LedOnTouch), "1\n");
    write(&touchkey, Attribute::DynBrightness, "on");
    assert_eq!(read(&touchkey, Attribute::DynBrightness), "1\n");
    write(&touchkey, Attribute::Blnww, "1");
    assert_eq!(read(&touchkey, Attribute::Blnww), "1\n");
}

#[test]
fn invalid_input_keeps_the_previous_value() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    write(&touchkey, Attribute::FadeStepMs, "20");
    write(&touchkey, Attribute::FadeStepMs, "fast");
    write(&touchkey, Attribute::FadeStepMs, "0");
    write(&touchkey, Attribute::FadeStepMs, "-5");
    assert_eq!(read(&touchkey, Attribute::FadeStepMs), "20\n");

    write(&touchkey, Attribute::FadeOut, "maybe");
    assert_eq!(read(&touchkey, Attribute::FadeOut), "0\n");

    write(&touchkey, Attribute::DynBrightness, "2");
    assert_eq!(read(&touchkey, Attribute::DynBrightness), "0\n");

    write(&touchkey, Attribute::LedTimeoutMs, "-100");
    assert_eq!(read(&touchkey, Attribute::LedTimeoutMs), "0\n");

    write(&touchkey, Attribute::NotificationTimeout, "soon");
    assert_eq!(read(&touchkey, Attribute::NotificationTimeout), "-1\n");
}

#[test]
fn breathing_table_appends_and_resets() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    write(&touchkey, Attribute::BreathingSteps, "2500 3000 50 100\n");
    write(&touchkey, Attribute::BreathingSteps, "3000 2500 40 50");
    assert_eq!(
        read(&touchkey, Attribute::BreathingSteps),
        "2500mV 3000mV 50ms 100mV\n3000mV 2500mV 40ms 50mV\n"
    );
    assert_eq!(read(&touchkey, Attribute::NeedsWakeLock), "1\n");

    // Incomplete lines are ignored.
    write(&touchkey, Attribute::BreathingSteps, "2500 3000");
    assert_eq!(read(&touchkey, Attribute::BreathingSteps).lines().count(), 2);

    write(&touchkey, Attribute::BreathingSteps, "reset");
    assert_eq!(
        read(&touchkey, Attribute::BreathingSteps),
        "3000mV 3000mV 1000ms 50mV\n"
    );
    assert_eq!(read(&touchkey, Attribute::NeedsWakeLock), "0\n");
}

#[test]
fn breathing_table_is_capped_at_ten_steps() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    for i in 0..12 {
        let line = format!("{} 3000 100 50", 2500 + i * 10);
        write(&touchkey, Attribute::BreathingSteps, &line);
    }
    let table = read(&touchkey, Attribute::BreathingSteps);
    assert_eq!(table.lines().count(), 10);
    assert!(table.ends_with("2590mV 3000mV 100ms 50mV\n"));
}

#[test]
fn led_timeout_in_seconds() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    write(&touchkey, Attribute::LedTimeout, "3");
    assert_eq!(read(&touchkey, Attribute::LedTimeoutMs), "3000\n");
    assert_eq!(read(&touchkey, Attribute::LedTimeout), "3\n");
    write(&touchkey, Attribute::LedTimeoutMs, "1500");
    assert_eq!(read(&touchkey, Attribute::LedTimeout), "1\n");
}

#[test]
fn led_voltage_respects_the_cap() {
    let (touchkey, panel) = probed(variant::MENU_BACK);
    write(&touchkey, Attribute::LedVoltage, "2800");
    write(&touchkey, Attribute::LedVoltage, "3300");
    assert_eq!(panel.voltages(), vec![2800]);
    assert_eq!(read(&touchkey, Attribute::LedVoltage), "2800\n");
}

#[test]
fn dynamic_brightness_raises_the_cap() {
    let (touchkey, panel) = probed(variant::MENU_BACK);
    write(&touchkey, Attribute::DynBrightness, "1");
    write(&touchkey, Attribute::LedControl, "255");
    assert_eq!(touchkey.settings().brightness_mv, 3300);

    write(&touchkey, Attribute::LedVoltage, "3300");
    assert_eq!(panel.voltages(), vec![3300]);
}

#[test]
fn direction_mismatch_is_unsupported() {
    let (touchkey, _) = probed(variant::MENU_BACK);
    assert_eq!(
        block_on(touchkey.write_attribute(Attribute::Version, "10")),
        Err(Error::Unsupported)
    );
    assert_eq!(
        block_on(touchkey.write_attribute(Attribute::NeedsWakeLock, "1")),
        Err(Error::Unsupported)
    );
    assert_eq!(
        block_on(touchkey.read_attribute(Attribute::LedControl)),
        Err(Error::Unsupported)
    );
    assert_eq!(
        block_on(touchkey.read_attribute(Attribute::SensitivityMode)),
        Err(Error::Unsupported)
    );
}

#[test]
fn diagnostic_counters_come_from_the_panel() {
    let (touchkey, panel) = probed(variant::FOUR_KEY);
    panel.set_byte(18, 0x01);
    panel.set_byte(19, 0x02);
    panel.set_byte(24, 0xAB);
    panel.set_byte(25, 0xCD);
    panel.set_byte(4, 77);
    panel.set_byte(6, 11);
    panel.set_byte(9, 14);

    assert_eq!(read(&touchkey, Attribute::RawCount(0)), "258\n");
    assert_eq!(read(&touchkey, Attribute::RawCount(3)), "43981\n");
    assert_eq!(read(&touchkey, Attribute::Threshold), "77\n");
    assert_eq!(read(&touchkey, Attribute::Idac(0)), "11\n");
    assert_eq!(read(&touchkey, Attribute::Idac(3)), "14\n");
    assert_eq!(
        block_on(touchkey.read_attribute(Attribute::RawCount(4))),
        Err(Error::Unsupported)
    );
    assert_eq!(
        panel.log(),
        vec![Op::Read(26), Op::Read(26), Op::Read(10), Op::Read(10), Op::Read(10)]
    );
}

#[test]
fn sensitivity_mode_sends_its_command() {
    let (touchkey, panel) = probed(variant::FOUR_KEY);
    write(&touchkey, Attribute::SensitivityMode, "1");
    assert_eq!(panel.log(), vec![Op::Write(vec![0x40])]);
}

#[test]
fn autocalibration_status() {
    let (touchkey, panel) = probed(variant::FOUR_KEY);
    assert_eq!(read(&touchkey, Attribute::AutocalStatus), "Enabled\n");
    panel.set_byte(5, 0x00);
    assert_eq!(read(&touchkey, Attribute::AutocalStatus), "Disabled\n");

    let (plain, _) = probed(variant::MENU_BACK);
    assert_eq!(
        block_on(plain.read_attribute(Attribute::AutocalStatus)),
        Err(Error::Unsupported)
    );
}

#[test]
fn unpowered_panel_generates_no_bus_traffic() {
    let (touchkey, panel) = touchkey(variant::FOUR_KEY);
    for attr in [
        Attribute::Threshold,
        Attribute::RawCount(0),
        Attribute::Idac(1),
        Attribute::FirmwareVersionPanel,
        Attribute::AutocalStatus,
    ] {
        assert_eq!(
            block_on(touchkey.read_attribute(attr)),
            Err(Error::NotReady)
        );
    }
    assert_eq!(
        block_on(touchkey.write_attribute(Attribute::SensitivityMode, "1")),
        Err(Error::NotReady)
    );
    assert_eq!(
        block_on(touchkey.write_attribute(Attribute::BlinkControl, "1")),
        Err(Error::NotReady)
    );
    assert_eq!(panel.bus_ops(), 0);
}
