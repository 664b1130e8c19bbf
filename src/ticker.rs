//! Tick scheduling. A clock task only emits ticks; the single loop that owns
//! the core decides per tick whether to reconcile the selected instance or
//! every instance.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// What a reconciliation pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickScope {
    Selected,
    All,
}

#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    slow_every: u64,
    count: u64,
}

impl Ticker {
    pub fn new(period: Duration, slow_every: u64) -> Self {
        Self {
            period,
            slow_every: slow_every.max(1),
            count: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Scope of the next tick: every `slow_every`th tick, starting with the
    /// first, covers all instances.
    pub fn next_scope(&mut self) -> TickScope {
        let scope = if self.count % self.slow_every == 0 {
            TickScope::All
        } else {
            TickScope::Selected
        };
        self.count = self.count.wrapping_add(1);
        scope
    }

    /// Spawn a clock that sends `make()` every period until the receiver
    /// goes away. Late ticks are skipped rather than bunched up.
    pub fn spawn_clock<A, F>(&self, tx: UnboundedSender<A>, make: F) -> JoinHandle<()>
    where
        A: Send + 'static,
        F: Fn() -> A + Send + 'static,
    {
        let period = self.period;
        tokio::spawn(async move {
            let mut clock = interval(period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                clock.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fifth_tick_covers_all() {
        let mut ticker = Ticker::new(Duration::from_millis(100), 5);
        let scopes: Vec<TickScope> = (0..11).map(|_| ticker.next_scope()).collect();
        let all: Vec<usize> = scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == TickScope::All)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(all, vec![0, 5, 10]);
    }

    #[test]
    fn zero_multiplier_means_every_tick() {
        let mut ticker = Ticker::new(Duration::from_millis(100), 0);
        assert_eq!(ticker.next_scope(), TickScope::All);
        assert_eq!(ticker.next_scope(), TickScope::All);
    }

    #[tokio::test]
    async fn clock_stops_when_receiver_drops() {
        let ticker = Ticker::new(Duration::from_millis(5), 1);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = ticker.spawn_clock(tx, || ());
        assert!(rx.recv().await.is_some());
        drop(rx);
        handle.await.unwrap();
    }
}
