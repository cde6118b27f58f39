// # Clock Trait
//
// Wall-clock seam used for lease expiry and next-knock timestamps. Timer
// scheduling itself uses tokio's monotonic clock; only the Unix timestamps
// reported to the outside world come from here.

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch
    fn now_unix(&self) -> i64;
}

/// System wall clock (UTC)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
