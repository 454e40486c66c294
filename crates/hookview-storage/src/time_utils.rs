use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to millisecond precision.
pub fn now_ms_precision() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
