use chrono::{DateTime, Utc};

/// Time source used by every expiry decision. Injected through `AppState`
/// so challenge-lifetime logic is deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
