use std::collections::HashMap;

use crate::names::TimerName;
use crate::scheduler::ScheduledTask;

/// At most one armed task per timer slot.
///
/// Every arm gets a fresh generation. A firing task must claim its slot with
/// [`claim`](TimerBank::claim) before running its callback, so a task
/// superseded by a re-arm can never fire even if its delay had already
/// elapsed.
///
/// A slot stays occupied after its task fires. Only [`cancel`](TimerBank::cancel)
/// and [`cancel_all`](TimerBank::cancel_all) return it to idle, so the next
/// trigger on a fired slot still counts as a re-trigger.
#[derive(Debug, Default)]
pub(crate) struct TimerBank {
    slots: HashMap<TimerName, Armed>,
    next_generation: u64,
}

#[derive(Debug)]
struct Armed {
    generation: u64,
    task: ScheduledTask,
    fired: bool,
}

impl TimerBank {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve the generation for the next arm.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Store `task` in the slot, cancelling whatever was armed there.
    pub(crate) fn install(&mut self, name: TimerName, generation: u64, task: ScheduledTask) {
        if let Some(previous) = self.slots.insert(
            name,
            Armed {
                generation,
                task,
                fired: false,
            },
        ) {
            previous.task.cancel();
        }
    }

    /// Cancel and clear a slot. Returns whether it was occupied, fired or not.
    pub(crate) fn cancel(&mut self, name: &TimerName) -> bool {
        match self.slots.remove(name) {
            Some(armed) => {
                armed.task.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.slots.len();
        for (_, armed) in self.slots.drain() {
            armed.task.cancel();
        }
        count
    }

    /// Whether the slot holds a handle, including one that already fired.
    pub(crate) fn is_armed(&self, name: &TimerName) -> bool {
        self.slots.contains_key(name)
    }

    /// Whether the slot holds a handle that has not fired yet.
    pub(crate) fn is_pending(&self, name: &TimerName) -> bool {
        self.slots.get(name).is_some_and(|armed| !armed.fired)
    }

    /// Mark `generation` as fired if the slot still holds it. Returns whether
    /// the caller may run its callback. The slot itself stays occupied.
    pub(crate) fn claim(&mut self, name: &TimerName, generation: u64) -> bool {
        match self.slots.get_mut(name) {
            Some(armed) if armed.generation == generation && !armed.fired => {
                armed.fired = true;
                true
            }
            _ => false,
        }
    }
}
