//! Deferred work.
//!
//! Interrupt and timer contexts never sleep beyond a bus transfer. Everything
//! that does (fade ramps, breathing steps, firmware updates) is queued here
//! and executed by the worker task.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

/// Number of work items that can be queued at once.
pub const QUEUE_DEPTH: usize = 8;

/// A deferred work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Work {
    /// Turn the backlight on, ramping if fade-in is enabled.
    FadeIn,
    /// Turn the backlight off, ramping if fade-out is enabled.
    FadeOut,
    /// Touch backlight timeout expired.
    BacklightOff,
    /// Notification timeout expired.
    NotificationOff,
    /// Advance the breathing cycle by one update.
    Breathe,
    /// Reflash the controller firmware.
    FirmwareUpdate,
}

impl Work {
    const fn bit(self) -> u8 {
        match self {
            Self::FadeIn => 1 << 0,
            Self::FadeOut => 1 << 1,
            Self::BacklightOff => 1 << 2,
            Self::NotificationOff => 1 << 3,
            Self::Breathe => 1 << 4,
            Self::FirmwareUpdate => 1 << 5,
        }
    }

    /// The ramp running in the opposite direction, for fades.
    pub const fn opposite(self) -> Option<Work> {
        match self {
            Self::FadeIn => Some(Self::FadeOut),
            Self::FadeOut => Some(Self::FadeIn),
            _ => None,
        }
    }

    const fn abort_slot(self) -> Option<usize> {
        match self {
            Self::FadeIn => Some(0),
            Self::FadeOut => Some(1),
            _ => None,
        }
    }
}

/// The work queue shared by all contexts.
///
/// Each kind of work is pending at most once. A pending bit is set when the
/// item is queued and cleared when the worker picks it up, so cancelling an
/// item only needs to clear its bit.
pub struct WorkQueue {
    channel: Channel<CriticalSectionRawMutex, Work, QUEUE_DEPTH>,
    pending: AtomicU8,
    abort: [AtomicBool; 2],
}

impl WorkQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            pending: AtomicU8::new(0),
            abort: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// A handle that can only enqueue work.
    pub fn scheduler(&self) -> Scheduler<'_> {
        Scheduler { queue: self }
    }

    /// Whether `work` is queued and not yet picked up.
    pub fn is_pending(&self, work: Work) -> bool {
        self.pending.load(Ordering::Acquire) & work.bit() != 0
    }

    /// Waits for the next item that is still pending.
    pub(crate) async fn next(&self) -> Work {
        loop {
            let work = self.channel.receive().await;
            let prev = self.pending.fetch_and(!work.bit(), Ordering::AcqRel);
            if prev & work.bit() != 0 {
                return work;
            }
            log::trace!("skipping cancelled {work:?}");
        }
    }

    /// Cancels a pending item. Returns whether it was pending.
    pub(crate) fn cancel(&self, work: Work) -> bool {
        self.pending.fetch_and(!work.bit(), Ordering::AcqRel) & work.bit() != 0
    }

    /// Drops everything queued.
    pub(crate) fn clear(&self) {
        self.pending.store(0, Ordering::Release);
        self.channel.clear();
    }

    /// Drops cancelled entries and duplicates of pending ones, keeping the
    /// first entry of each pending item in order. `incoming` is about to be
    /// queued, so older entries of it go too.
    fn drop_stale(&self, incoming: Work) {
        let mut kept = incoming.bit();
        for _ in 0..self.channel.len() {
            let Ok(work) = self.channel.try_receive() else {
                break;
            };
            if self.is_pending(work) && kept & work.bit() == 0 {
                kept |= work.bit();
                // Just made room for it.
                let _ = self.channel.try_send(work);
            } else {
                log::trace!("dropping stale {work:?}");
            }
        }
    }

    /// Asks a running ramp to stop at its next step.
    pub(crate) fn abort(&self, work: Work) {
        if let Some(slot) = work.abort_slot() {
            self.abort[slot].store(true, Ordering::Release);
        }
    }

    pub(crate) fn clear_abort(&self, work: Work) {
        if let Some(slot) = work.abort_slot() {
            self.abort[slot].store(false, Ordering::Release);
        }
    }

    pub(crate) fn is_aborted(&self, work: Work) -> bool {
        work.abort_slot()
            .is_some_and(|slot| self.abort[slot].load(Ordering::Acquire))
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Enqueue-only access to a [`WorkQueue`], the only thing timer context holds.
#[derive(Clone, Copy)]
pub struct Scheduler<'a> {
    queue: &'a WorkQueue,
}

impl Scheduler<'_> {
    /// Queues `work` unless it is already pending.
    ///
    /// Scheduling one fade direction cancels a pending ramp in the other
    /// direction and stops a running one. Returns whether an item was queued.
    pub fn schedule(&self, work: Work) -> bool {
        if let Some(other) = work.opposite() {
            self.queue.cancel(other);
            self.queue.abort(other);
        }
        let prev = self.queue.pending.fetch_or(work.bit(), Ordering::AcqRel);
        if prev & work.bit() != 0 {
            log::trace!("{work:?} already pending");
            return false;
        }
        let queued = self.queue.channel.try_send(work).is_ok() || {
            self.queue.drop_stale(work);
            self.queue.channel.try_send(work).is_ok()
        };
        if !queued {
            self.queue.pending.fetch_and(!work.bit(), Ordering::AcqRel);
            log::warn!("work queue full, dropping {work:?}");
            return false;
        }
        true
    }
}
