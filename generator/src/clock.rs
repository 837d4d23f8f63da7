use std::time::Duration;

/// Source of the pauses between loop iterations
#[allow(async_fn_in_trait)]
pub trait Clock {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
