//! Session-owned progress reporting.

use std::fmt;

/// Observer of progress updates. Implementations must not block.
pub trait ProgressSink: Send {
    fn report(&self, current: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send,
{
    fn report(&self, current: u64, total: u64) {
        self(current, total)
    }
}

/// Step counter with an optional observer. `current` never exceeds `total`.
#[derive(Default)]
pub struct ProgressChannel {
    total: u64,
    current: u64,
    sink: Option<Box<dyn ProgressSink>>,
}

impl fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("total", &self.total)
            .field("current", &self.current)
            .field("attached", &self.sink.is_some())
            .finish()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run of `total` steps. Negative totals become zero.
    pub fn set_total_steps(&mut self, total: i64) {
        self.total = total.max(0) as u64;
        self.current = 0;
        self.emit();
    }

    /// Advance one step, saturating at the total.
    pub fn inc(&mut self) {
        if self.current < self.total {
            self.current += 1;
        }
        self.emit();
    }

    pub fn reset(&mut self) {
        self.total = 0;
        self.current = 0;
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Completion in `[0, 1]`; zero when no total is set.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }

    pub fn attach(&mut self, sink: Box<dyn ProgressSink>) {
        self.sink = Some(sink);
    }

    pub fn detach(&mut self) {
        self.sink = None;
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    fn emit(&self) {
        if let Some(sink) = &self.sink {
            sink.report(self.current, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn increments_saturate_at_total() {
        let mut progress = ProgressChannel::new();
        progress.set_total_steps(5);
        for _ in 0..7 {
            progress.inc();
        }
        assert_eq!(progress.current(), 5);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn negative_total_is_zero_and_inc_is_harmless() {
        let mut progress = ProgressChannel::new();
        progress.set_total_steps(-3);
        progress.inc();
        assert_eq!((progress.current(), progress.total()), (0, 0));
    }

    #[test]
    fn reports_reach_the_attached_sink() {
        let (tx, rx) = mpsc::channel();
        let mut progress = ProgressChannel::new();
        progress.attach(Box::new(move |current, total| {
            let _ = tx.send((current, total));
        }));
        progress.set_total_steps(2);
        progress.inc();
        progress.detach();
        progress.inc();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn disconnected_sink_never_fails() {
        let (tx, rx) = mpsc::channel::<(u64, u64)>();
        drop(rx);
        let mut progress = ProgressChannel::new();
        progress.attach(Box::new(move |current, total| {
            let _ = tx.send((current, total));
        }));
        progress.set_total_steps(1);
        progress.inc();
        assert_eq!(progress.current(), 1);
    }
}
