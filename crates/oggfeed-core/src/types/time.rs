//! Whole-second time values.

use serde::{Deserialize, Serialize};

/// A whole number of seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct Seconds(pub u64);

impl Seconds {
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// Format as M:SS or H:MM:SS.
    pub fn format(self) -> String {
        let total_secs = self.0;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}
