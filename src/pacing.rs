use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Fixed-rate gate for task dispatch. The first call to [`DispatchPacer::ready`]
/// returns immediately, each later call waits until one period has passed
/// since the previous one. A zero period disables pacing.
#[derive(Debug)]
pub struct DispatchPacer {
    ticker: Option<Interval>,
}

impl DispatchPacer {
    pub fn new(period: Duration) -> Self {
        if period.is_zero() {
            return Self { ticker: None };
        }
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker: Some(ticker) }
    }

    pub async fn ready(&mut self) {
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.tick().await;
        }
    }
}
