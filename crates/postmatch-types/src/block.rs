//! Block context: the only clock the state machine reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl BlockContext {
    #[must_use]
    pub fn new(height: u64, time: DateTime<Utc>) -> Self {
        Self { height, time }
    }

    /// Block time as unsigned milliseconds, for big-endian index keys.
    /// Pre-epoch times clamp to zero.
    #[must_use]
    pub fn time_millis(&self) -> u64 {
        millis(self.time)
    }
}

/// Unsigned milliseconds since the UNIX epoch, clamped at zero.
#[must_use]
pub fn millis(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_clamps_negative() {
        let before_epoch = DateTime::<Utc>::from_timestamp(-5, 0).unwrap();
        assert_eq!(millis(before_epoch), 0);
        let ctx = BlockContext::new(1, DateTime::<Utc>::from_timestamp(2, 0).unwrap());
        assert_eq!(ctx.time_millis(), 2000);
    }
}
