use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Row accounting for one run or one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub fetched: u64,
    pub inserted_or_upserted: u64,
    pub duplicates_skipped: u64,
    pub rejected: u64,
}

impl RunCounters {
    /// Rows that have reached a terminal outcome.
    pub fn settled(&self) -> u64 {
        self.inserted_or_upserted + self.duplicates_skipped + self.rejected
    }

    /// `fetched == inserted_or_upserted + duplicates_skipped + rejected`
    pub fn is_balanced(&self) -> bool {
        self.fetched == self.settled()
    }
}

impl AddAssign for RunCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.fetched += rhs.fetched;
        self.inserted_or_upserted += rhs.inserted_or_upserted;
        self.duplicates_skipped += rhs.duplicates_skipped;
        self.rejected += rhs.rejected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_tracks_all_outcomes() {
        let mut total = RunCounters::default();
        total += RunCounters {
            fetched: 10,
            inserted_or_upserted: 7,
            duplicates_skipped: 2,
            rejected: 1,
        };
        assert!(total.is_balanced());
        total.fetched += 1;
        assert!(!total.is_balanced());
    }
}
