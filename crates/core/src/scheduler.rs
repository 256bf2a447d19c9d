//! Single owner of the session's timers, driven by virtual time.
//!
//! Nothing fires on its own: the caller advances the clock and receives the
//! tasks that came due, in firing order. Dropping or calling
//! [`Scheduler::cancel_all`] guarantees nothing fires afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerTask {
    FlushSelection,
    Autosave,
    RemotePull,
}

#[derive(Clone, Debug)]
struct Timer {
    task: TimerTask,
    due: Duration,
    period: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule_once(&mut self, delay: Duration, task: TimerTask) -> TimerId {
        self.insert(Timer { task, due: self.now + delay, period: None })
    }

    /// Zero periods are bumped to one millisecond so `advance` always ends.
    pub fn schedule_every(&mut self, period: Duration, task: TimerTask) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.insert(Timer { task, due: self.now + period, period: Some(period) })
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Moves the clock forward and returns every task that came due. Ties
    /// fire in scheduling order; periodic timers may fire several times.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerTask> {
        let target = self.now + by;
        let mut fired = Vec::new();

        while let Some((id, due)) = self.next_due(target) {
            self.now = due;
            let Some(timer) = self.timers.get_mut(&id) else {
                break;
            };
            fired.push(timer.task);
            match timer.period {
                Some(period) => timer.due += period,
                None => {
                    self.timers.remove(&id);
                }
            }
        }

        self.now = target;
        fired
    }

    fn next_due(&self, target: Duration) -> Option<(TimerId, Duration)> {
        self.timers
            .iter()
            .filter(|(_, timer)| timer.due <= target)
            .min_by_key(|(id, timer)| (timer.due, **id))
            .map(|(id, timer)| (*id, timer.due))
    }

    fn insert(&mut self, timer: Timer) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(id, timer);
        id
    }
}
