//! Deadlines and the timer task.

use core::cell::RefCell;

use embassy_futures::select::select;
use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};
use embassy_time::{Duration, Instant, Timer};

use crate::work::{Scheduler, Work};

/// Longest the timer task sleeps without re-checking its deadlines.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// An optional point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const fn disarmed() -> Self {
        Self(None)
    }

    pub fn arm(&mut self, at: Instant) {
        self.0 = Some(at);
    }

    pub fn disarm(&mut self) {
        self.0 = None;
    }

    pub fn at(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }

    /// Disarms and returns `true` if the deadline passed.
    pub fn take_expired(&mut self, now: Instant) -> bool {
        match self.0 {
            Some(at) if at <= now => {
                self.0 = None;
                true
            }
            _ => false,
        }
    }
}

/// The timers of the backlight engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Touch backlight timeout.
    Led,
    /// Notification timeout.
    Notification,
    /// Next breathing update.
    Breathing,
}

impl TimerKind {
    const ALL: [TimerKind; 3] = [Self::Led, Self::Notification, Self::Breathing];

    /// The work scheduled when this timer fires.
    pub const fn work(self) -> Work {
        match self {
            Self::Led => Work::BacklightOff,
            Self::Notification => Work::NotificationOff,
            Self::Breathing => Work::Breathe,
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Led => 0,
            Self::Notification => 1,
            Self::Breathing => 2,
        }
    }
}

/// Deadlines shared between the driver and the timer task.
pub struct Timers {
    deadlines: Mutex<CriticalSectionRawMutex, RefCell<[Deadline; 3]>>,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl Timers {
    pub const fn new() -> Self {
        Self {
            deadlines: Mutex::new(RefCell::new([Deadline::disarmed(); 3])),
            changed: Signal::new(),
        }
    }

    /// Arms (or re-arms) `kind` to fire `after` from now.
    pub fn arm(&self, kind: TimerKind, after: Duration) {
        let at = Instant::now() + after;
        self.deadlines
            .lock(|d| d.borrow_mut()[kind.slot()].arm(at));
        self.changed.signal(());
    }

    pub fn disarm(&self, kind: TimerKind) {
        self.deadlines
            .lock(|d| d.borrow_mut()[kind.slot()].disarm());
        self.changed.signal(());
    }

    pub fn disarm_all(&self) {
        self.deadlines.lock(|d| {
            for deadline in d.borrow_mut().iter_mut() {
                deadline.disarm();
            }
        });
        self.changed.signal(());
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.lock(|d| d.borrow()[kind.slot()].is_armed())
    }

    fn take_expired(&self, kind: TimerKind, now: Instant) -> bool {
        self.deadlines
            .lock(|d| d.borrow_mut()[kind.slot()].take_expired(now))
    }

    fn earliest(&self) -> Option<Instant> {
        self.deadlines
            .lock(|d| d.borrow().iter().filter_map(Deadline::at).min())
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

/// The timer task. It owns no device access and can only schedule work.
pub struct TimerContext<'a> {
    timers: &'a Timers,
    scheduler: Scheduler<'a>,
}

impl<'a> TimerContext<'a> {
    pub fn new(timers: &'a Timers, scheduler: Scheduler<'a>) -> Self {
        Self { timers, scheduler }
    }

    /// Fires expired deadlines, then sleeps until the next one, a change or
    /// at most [`MAX_POLL_INTERVAL`].
    pub async fn run(self) -> ! {
        loop {
            let now = Instant::now();
            for kind in TimerKind::ALL {
                if self.timers.take_expired(kind, now) {
                    log::debug!("{kind:?} timer expired");
                    self.scheduler.schedule(kind.work());
                }
            }

            let poll = now + MAX_POLL_INTERVAL;
            let wake = self.timers.earliest().map_or(poll, |at| at.min(poll));
            select(Timer::at(wake), self.timers.changed.wait()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::WorkQueue;
    use embassy_futures::{block_on, select::select as race};

    #[test]
    fn deadline_expires_once() {
        let start = Instant::now();
        let mut deadline = Deadline::disarmed();
        assert!(!deadline.take_expired(start));

        deadline.arm(start + Duration::from_millis(10));
        assert!(!deadline.take_expired(start));
        assert!(deadline.take_expired(start + Duration::from_millis(10)));
        assert!(!deadline.is_armed());
        assert!(!deadline.take_expired(start + Duration::from_millis(20)));
    }

    #[test]
    fn expired_timer_schedules_its_work() {
        let queue = WorkQueue::new();
        let timers = Timers::new();
        timers.arm(TimerKind::Notification, Duration::from_millis(20));
        timers.arm(TimerKind::Led, Duration::from_secs(60));

        let context = TimerContext::new(&timers, queue.scheduler());
        block_on(race(context.run(), Timer::after(Duration::from_millis(80))));

        assert!(queue.is_pending(Work::NotificationOff));
        assert!(!queue.is_pending(Work::BacklightOff));
        assert!(!timers.is_armed(TimerKind::Notification));
        assert!(timers.is_armed(TimerKind::Led));
    }

    #[test]
    fn disarmed_timer_never_fires() {
        let queue = WorkQueue::new();
        let timers = Timers::new();
        timers.arm(TimerKind::Breathing, Duration::from_millis(20));
        timers.disarm(TimerKind::Breathing);

        let context = TimerContext::new(&timers, queue.scheduler());
        block_on(race(context.run(), Timer::after(Duration::from_millis(60))));

        assert!(!queue.is_pending(Work::Breathe));
    }
}
