//! Tick-polled timers. Nothing here sleeps: the owner advances them once per
//! tick with the frame delta and reacts to what they report.

/// A one-shot countdown measured in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    duration: f32,
    remaining: f32,
    finished: bool,
}

impl Countdown {
    pub fn new(seconds: f32) -> Self {
        let seconds = seconds.max(0.0);
        Self {
            duration: seconds,
            remaining: seconds,
            finished: false,
        }
    }

    /// Advance by `dt`. Returns true only on the tick the countdown finishes.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.finished {
            return false;
        }
        self.remaining -= dt.max(0.0);
        if self.remaining <= 0.0 {
            self.remaining = 0.0;
            self.finished = true;
            return true;
        }
        false
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn elapsed(&self) -> f32 {
        self.duration - self.remaining
    }

    /// Fraction of the countdown already elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed() / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

}

/// Handle returned by [`TaskQueue::schedule`], used to cancel the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
struct DelayedTask<T> {
    handle: TaskHandle,
    countdown: Countdown,
    payload: T,
}

/// Delayed actions resumed once per tick. A task fires at most once;
/// cancelling it before its deadline drops the payload unfired.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tasks: Vec<DelayedTask<T>>,
    next_handle: u64,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_handle: 1,
        }
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, delay: f32, payload: T) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.tasks.push(DelayedTask {
            handle,
            countdown: Countdown::new(delay),
            payload,
        });
        handle
    }

    /// Returns true if the task was still pending.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.handle != handle);
        before != self.tasks.len()
    }

    /// Advance every task and return the payloads that fired this tick, in
    /// scheduling order.
    pub fn tick(&mut self, dt: f32) -> Vec<T> {
        let mut fired = Vec::new();
        let mut pending = Vec::with_capacity(self.tasks.len());
        for mut task in std::mem::take(&mut self.tasks) {
            if task.countdown.tick(dt) {
                fired.push(task.payload);
            } else {
                pending.push(task);
            }
        }
        self.tasks = pending;
        fired
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_fires_once() {
        let mut c = Countdown::new(1.0);
        assert!(!c.tick(0.5));
        assert!(c.tick(0.6));
        assert!(c.is_finished());
        assert!(!c.tick(1.0), "finished countdown must not fire again");
        assert_eq!(c.remaining(), 0.0);
    }

    #[test]
    fn zero_duration_fires_on_first_tick() {
        let mut c = Countdown::new(0.0);
        assert_eq!(c.progress(), 1.0);
        assert!(c.tick(0.0));
    }

    #[test]
    fn queue_fires_in_schedule_order() {
        let mut q = TaskQueue::new();
        q.schedule(1.0, "late");
        q.schedule(0.5, "early");
        assert!(q.tick(0.4).is_empty());
        assert_eq!(q.tick(0.2), vec!["early"]);
        assert_eq!(q.tick(0.5), vec!["late"]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_task_never_fires() {
        let mut q = TaskQueue::new();
        let h = q.schedule(0.5, 1);
        q.schedule(0.5, 2);
        assert!(q.cancel(h));
        assert_eq!(q.len(), 1);
        assert!(!q.cancel(h));
        assert_eq!(q.tick(1.0), vec![2]);
    }
}
