//! Runtime configuration of the backlight and notification engine.
//!
//! Values are plain data. Side effects of changing them (re-arming timers,
//! stopping a breathing cycle) are applied by the driver when an attribute is
//! written.

use core::fmt::Write;

use embassy_time::Duration;
use heapless::{String, Vec};

/// Lowest LED voltage the ramps start from or end at.
pub const BL_MIN: u32 = 2500;
/// Default LED voltage and brightness cap.
pub const BL_STANDARD: u32 = 3000;
/// Highest LED voltage the dynamic brightness mapping produces.
pub const BL_MAX: u32 = 3300;

/// Maximum number of entries in the breathing table.
pub const MAX_BREATHING_STEPS: usize = 10;

/// Fade ramp settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeConfig {
    /// Ramp the voltage up when the backlight turns on.
    pub fade_in: bool,
    /// Ramp the voltage down when the backlight turns off.
    pub fade_out: bool,
    /// Voltage change per ramp step.
    pub step_mv: u32,
    /// Pause between two ramp steps.
    pub step_interval: Duration,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            fade_in: false,
            fade_out: false,
            step_mv: 50,
            step_interval: Duration::from_millis(50),
        }
    }
}

/// One segment of a breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreathingStep {
    /// Voltage the segment starts at.
    pub start_mv: u32,
    /// Voltage the segment ends at.
    pub end_mv: u32,
    /// Time between two voltage updates.
    pub period_ms: u32,
    /// Voltage change per update.
    pub step_mv: u32,
}

impl BreathingStep {
    /// The steady step left after a reset: constant 3000 mV.
    pub const STEADY: Self = Self {
        start_mv: BL_STANDARD,
        end_mv: BL_STANDARD,
        period_ms: 1000,
        step_mv: 50,
    };

    /// Parses `"start end period step"`.
    ///
    /// A zero step is only accepted for a constant segment, anything else
    /// would never reach its end.
    pub fn parse(input: &str) -> Option<Self> {
        let [start, end, period, step] = parse_ints::<4>(input)?;
        let start_mv = u32::try_from(start).ok()?;
        let end_mv = u32::try_from(end).ok()?;
        let period_ms = u32::try_from(period).ok()?;
        let step_mv = u32::try_from(step).ok()?;
        if step_mv == 0 && start_mv != end_mv {
            return None;
        }
        Some(Self {
            start_mv,
            end_mv,
            period_ms,
            step_mv,
        })
    }
}

/// The breathing cycle, a list of up to [`MAX_BREATHING_STEPS`] segments.
///
/// After a reset the table holds [`BreathingStep::STEADY`]; the first
/// appended step replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreathingTable {
    steps: Vec<BreathingStep, MAX_BREATHING_STEPS>,
    custom: bool,
}

impl BreathingTable {
    /// A table holding only the steady step.
    pub fn new() -> Self {
        let mut steps = Vec::new();
        // Capacity is at least one.
        let _ = steps.push(BreathingStep::STEADY);
        Self {
            steps,
            custom: false,
        }
    }

    /// Drops all custom steps and goes back to the steady step.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Appends a step. Returns the step back when the table is full.
    pub fn push(&mut self, step: BreathingStep) -> Result<(), BreathingStep> {
        if !self.custom {
            self.steps.clear();
            self.custom = true;
        }
        self.steps.push(step)
    }

    /// The active steps, never empty.
    pub fn steps(&self) -> &[BreathingStep] {
        &self.steps
    }

    /// Whether user supplied steps replaced the steady step.
    pub fn is_custom(&self) -> bool {
        self.custom
    }

    /// Whether running this table needs the CPU awake, i.e. whether the
    /// voltage ever changes.
    pub fn needs_wake_lock(&self) -> bool {
        self.steps.len() > 1 || self.steps.iter().any(|s| s.start_mv != s.end_mv)
    }

    /// One `"{start}mV {end}mV {period}ms {step}mV"` line per step.
    pub fn render<const N: usize>(&self, out: &mut String<N>) -> core::fmt::Result {
        for s in self.steps.iter() {
            writeln!(
                out,
                "{}mV {}mV {}ms {}mV",
                s.start_mv, s.end_mv, s.period_ms, s.step_mv
            )?;
        }
        Ok(())
    }
}

impl Default for BreathingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the user can tune at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub fade: FadeConfig,
    /// Light the backlight when a key is pressed.
    pub led_on_touch: bool,
    /// Touch backlight timeout, 0 keeps it on.
    pub led_timeout_ms: u32,
    /// Notification timeout, anything `<= 0` never expires.
    pub notification_timeout_ms: i32,
    /// Run the breathing cycle while a notification is shown.
    pub breathing: bool,
    pub breathing_steps: BreathingTable,
    /// Derive the brightness cap from the display brightness.
    pub dyn_brightness: bool,
    /// Show notifications without holding a wake lock.
    pub bln_without_wakelock: bool,
    /// Never light the touch backlight.
    pub led_disabled: bool,
    /// Voltage cap; requests above it are ignored.
    pub brightness_mv: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fade: FadeConfig::default(),
            led_on_touch: false,
            led_timeout_ms: 0,
            notification_timeout_ms: -1,
            breathing: false,
            breathing_steps: BreathingTable::new(),
            dyn_brightness: false,
            bln_without_wakelock: false,
            led_disabled: false,
            brightness_mv: BL_STANDARD,
        }
    }
}

impl Settings {
    /// The notification timeout when one is configured.
    pub fn notification_timeout(&self) -> Option<Duration> {
        u64::try_from(self.notification_timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// The touch backlight timeout when one is configured.
    pub fn led_timeout(&self) -> Option<Duration> {
        (self.led_timeout_ms > 0).then(|| Duration::from_millis(self.led_timeout_ms.into()))
    }

    /// Whether showing a notification should hold the wake lock.
    pub fn needs_wake_lock(&self) -> bool {
        self.breathing && self.breathing_steps.needs_wake_lock()
    }

    /// Maps a display brightness level to the voltage cap, when dynamic
    /// brightness is on and the level is not zero.
    pub fn apply_brightness_level(&mut self, level: u32) -> bool {
        if !self.dyn_brightness || level == 0 {
            return false;
        }
        self.brightness_mv = brightness_for_level(level);
        true
    }
}

/// `2500 + ((level * 100 / 255) * 800 / 100 / 50) * 50`, in 50 mV steps.
pub fn brightness_for_level(level: u32) -> u32 {
    let percent = level.min(255) * 100 / 255;
    BL_MIN + (percent * (BL_MAX - BL_MIN) / 100 / 50) * 50
}

/// Parses a leading decimal integer: optional whitespace, optional sign,
/// digits. Trailing text is ignored.
pub fn parse_int(input: &str) -> Option<i32> {
    parse_prefix(input).map(|(value, _)| value)
}

/// Parses `"on"` / `"off"` prefixes or an integer, non-zero meaning on.
pub fn parse_switch(input: &str) -> Option<bool> {
    if input.starts_with("on") {
        Some(true)
    } else if input.starts_with("off") {
        Some(false)
    } else {
        parse_int(input).map(|v| v != 0)
    }
}

/// Like [`parse_switch`] but only `0` and `1` are accepted as numbers.
pub fn parse_strict_switch(input: &str) -> Option<bool> {
    match parse_int(input) {
        Some(0) => Some(false),
        Some(1) => Some(true),
        Some(_) => None,
        None if input.starts_with("on") => Some(true),
        None if input.starts_with("off") => Some(false),
        None => None,
    }
}

/// Parses `N` whitespace separated leading integers.
pub fn parse_ints<const N: usize>(input: &str) -> Option<[i32; N]> {
    let mut out = [0; N];
    let mut rest = input;
    for slot in out.iter_mut() {
        let (value, tail) = parse_prefix(rest)?;
        *slot = value;
        rest = tail;
    }
    Some(out)
}

fn parse_prefix(input: &str) -> Option<(i32, &str)> {
    let s = input.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let magnitude: i64 = s[..digits].parse().ok()?;
    let value = if negative { -magnitude } else { magnitude };
    Some((i32::try_from(value).ok()?, &s[digits..]))
}
