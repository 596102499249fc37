//! Tick driven software timers
//!
//! Timers live in an arena owned by a [`TimerScheduler`] and are addressed by
//! [`TimerId`] handles. An external loop calls [`TimerScheduler::tick`] with
//! the current monotonic time; expired timers have their callback invoked
//! with the internal lock released, so callbacks may start or stop any timer,
//! including their own.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use serde::Serialize;

/// Resolution of timer periods
pub const TICKS_PER_SECOND: u64 = 128;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Length of `ticks` timer ticks in microseconds
pub fn ticks_to_micros(ticks: u64) -> u64 {
    ticks.saturating_mul(MICROS_PER_SECOND) / TICKS_PER_SECOND
}

/// Round `us` up to the next tick boundary
fn round_to_tick(us: u64) -> u64 {
    let scaled = us as u128 * TICKS_PER_SECOND as u128;
    let ticks = (scaled + MICROS_PER_SECOND as u128 - 1) / MICROS_PER_SECOND as u128;
    (ticks * MICROS_PER_SECOND as u128 / TICKS_PER_SECOND as u128) as u64
}

/// Handle to a timer created with [`TimerScheduler::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerId {
    index: u32,
    generation: u32,
}

impl core::fmt::Display for TimerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("unknown timer {0}")]
    Unknown(TimerId),
    #[error("periodic timer {name} started with a zero period")]
    ZeroPeriod { name: &'static str },
}

pub type TimerCallback = Box<dyn FnMut(&TimerScheduler, TimerId) + Send>;

struct TimerEntry {
    name: &'static str,
    instance: u32,
    callback: Option<TimerCallback>,
    period_us: u64,
    periodic: bool,
    deadline_us: u64,
    linked: bool,
    stop_pending: bool,
    callbacks: u64,
    losses: u64,
}

struct Slot {
    generation: u32,
    entry: Option<TimerEntry>,
}

#[derive(Default)]
struct TimerList {
    slots: Vec<Slot>,
    active: Vec<usize>,
}

impl TimerList {
    fn entry_mut(&mut self, id: TimerId) -> Option<&mut TimerEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn unlink(&mut self, index: usize) {
        self.active.retain(|&i| i != index);
        if let Some(entry) = self.slots[index].entry.as_mut() {
            entry.linked = false;
            entry.stop_pending = false;
        }
    }

    fn purge_stopped(&mut self) {
        let slots = &mut self.slots;
        self.active.retain(|&index| match slots[index].entry.as_mut() {
            Some(entry) if entry.stop_pending => {
                entry.linked = false;
                entry.stop_pending = false;
                false
            }
            Some(_) => true,
            None => false,
        });
    }

    fn next_deadline(&self) -> Option<u64> {
        self.active
            .iter()
            .filter_map(|&index| self.slots[index].entry.as_ref())
            .filter(|entry| !entry.stop_pending)
            .map(|entry| entry.deadline_us)
            .min()
    }

    fn id_of(&self, index: usize) -> TimerId {
        TimerId {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }
}

/// Snapshot of one timer for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerInfo {
    pub id: TimerId,
    pub name: &'static str,
    pub instance: u32,
    pub armed: bool,
    pub periodic: bool,
    pub period_us: u64,
    pub deadline_us: u64,
    pub callbacks: u64,
    pub losses: u64,
}

/// The list of software timers
///
/// The list has its own lock, separate from anything the callbacks touch, and
/// that lock is never held while a callback runs.
pub struct TimerScheduler {
    inner: Mutex<TimerList>,
    now: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl core::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("timers", &self.dump())
            .finish()
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    /// A scheduler measuring time in microseconds since its creation
    pub fn new() -> Self {
        let epoch = Instant::now();
        Self::with_time_source(move || epoch.elapsed().as_micros() as u64)
    }

    /// A scheduler reading the current time from `now`, which must be the
    /// same monotonic microsecond counter that is passed to [`Self::tick`]
    pub fn with_time_source(now: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::new(TimerList::default()),
            now: Box::new(now),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerList> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a timer without arming it
    pub fn init(
        &self,
        name: &'static str,
        instance: u32,
        callback: impl FnMut(&TimerScheduler, TimerId) + Send + 'static,
    ) -> TimerId {
        let entry = TimerEntry {
            name,
            instance,
            callback: Some(Box::new(callback)),
            period_us: 0,
            periodic: false,
            deadline_us: 0,
            linked: false,
            stop_pending: false,
            callbacks: 0,
            losses: 0,
        };

        let mut list = self.lock();
        let index = match list.slots.iter().position(|slot| slot.entry.is_none()) {
            Some(index) => {
                let slot = &mut list.slots[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.entry = Some(entry);
                index
            }
            None => {
                list.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                list.slots.len() - 1
            }
        };

        let id = list.id_of(index);
        tracing::trace!(name, instance, %id, "timer initialized");
        id
    }

    /// Arm a timer to expire `ticks` ticks from now.
    ///
    /// Restarting an armed timer only moves its deadline.
    pub fn start(&self, id: TimerId, ticks: u64, periodic: bool) -> Result<(), TimerError> {
        let now = (self.now)();
        let mut list = self.lock();

        let Some(entry) = list.entry_mut(id) else {
            tracing::warn!(%id, "attempt to start unknown timer");
            return Err(TimerError::Unknown(id));
        };

        let period_us = ticks_to_micros(ticks);
        if periodic && period_us == 0 {
            tracing::warn!(
                name = entry.name,
                instance = entry.instance,
                "periodic timer needs a period"
            );
            return Err(TimerError::ZeroPeriod { name: entry.name });
        }

        entry.period_us = period_us;
        entry.periodic = periodic;
        entry.deadline_us = round_to_tick(now.saturating_add(period_us));
        entry.stop_pending = false;
        tracing::trace!(
            name = entry.name,
            instance = entry.instance,
            period_us,
            deadline_us = entry.deadline_us,
            "timer started"
        );

        if !entry.linked {
            entry.linked = true;
            list.active.push(id.index as usize);
        }

        Ok(())
    }

    /// Prevent future expiries. The timer is taken off the active list on the
    /// next tick.
    pub fn stop(&self, id: TimerId) {
        let mut list = self.lock();
        if let Some(entry) = list.entry_mut(id) {
            if entry.linked {
                entry.stop_pending = true;
                tracing::trace!(name = entry.name, instance = entry.instance, "timer stopped");
            }
        }
    }

    /// Destroy a timer. Its handle becomes invalid.
    pub fn remove(&self, id: TimerId) {
        let mut list = self.lock();
        if list.entry_mut(id).is_some() {
            let index = id.index as usize;
            list.unlink(index);
            list.slots[index].entry = None;
        }
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        let mut list = self.lock();
        list.entry_mut(id)
            .map(|entry| entry.linked && !entry.stop_pending)
            .unwrap_or(false)
    }

    /// Fire every timer whose deadline is at or before `now_us`, and return
    /// the earliest deadline still pending.
    ///
    /// A periodic timer that missed several periods fires once; the missed
    /// periods are counted as losses.
    pub fn tick(&self, now_us: u64) -> Option<u64> {
        let due: Vec<TimerId> = {
            let mut list = self.lock();
            list.purge_stopped();
            list.active
                .iter()
                .copied()
                .filter(|&index| {
                    list.slots[index]
                        .entry
                        .as_ref()
                        .is_some_and(|entry| entry.deadline_us <= now_us)
                })
                .map(|index| list.id_of(index))
                .collect()
        };

        for id in due {
            let mut callback = {
                let mut list = self.lock();
                let Some(entry) = list.entry_mut(id) else {
                    continue;
                };
                // an earlier callback may have stopped or restarted this one
                if !entry.linked || entry.stop_pending || entry.deadline_us > now_us {
                    continue;
                }

                entry.callbacks += 1;
                let callback = entry.callback.take();
                if entry.periodic {
                    let missed = (now_us - entry.deadline_us) / entry.period_us;
                    entry.deadline_us += (missed + 1) * entry.period_us;
                    if missed > 0 {
                        entry.losses += missed;
                        tracing::debug!(
                            name = entry.name,
                            instance = entry.instance,
                            missed,
                            "timer missed periods"
                        );
                    }
                } else {
                    list.unlink(id.index as usize);
                }

                match callback {
                    Some(callback) => callback,
                    None => continue,
                }
            };

            callback(self, id);

            let mut list = self.lock();
            if let Some(entry) = list.entry_mut(id) {
                if entry.callback.is_none() {
                    entry.callback = Some(callback);
                }
            }
        }

        let mut list = self.lock();
        list.purge_stopped();
        list.next_deadline()
    }

    /// The state of every timer
    pub fn dump(&self) -> Vec<TimerInfo> {
        let list = self.lock();
        list.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                Some(TimerInfo {
                    id: list.id_of(index),
                    name: entry.name,
                    instance: entry.instance,
                    armed: entry.linked && !entry.stop_pending,
                    periodic: entry.periodic,
                    period_us: entry.period_us,
                    deadline_us: entry.deadline_us,
                    callbacks: entry.callbacks,
                    losses: entry.losses,
                })
            })
            .collect()
    }
}
