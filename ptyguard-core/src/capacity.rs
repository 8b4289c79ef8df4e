use serde::{Deserialize, Serialize};
use std::fmt;

/// System-wide PTY slot usage, recomputed on every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    pub max: u64,
    pub used: u64,
}

impl ResourceCapacity {
    pub fn new(max: u64, used: u64) -> Self {
        Self { max, used }
    }

    pub fn free(&self) -> u64 {
        self.max.saturating_sub(self.used)
    }

    /// Integer percentage, rounded down. A zero capacity reports 0.
    pub fn usage_percent(&self) -> u64 {
        if self.max == 0 {
            return 0;
        }
        self.used.saturating_mul(100) / self.max
    }
}

impl fmt::Display for ResourceCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({}%)",
            self.used,
            self.max,
            self.usage_percent()
        )
    }
}
