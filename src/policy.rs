use serde::Serialize;
use thiserror::Error;

use crate::timestamp::{parse_timestamp, Timestamp, TimestampError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("unable to read {bound} time `{input}`")]
    InvalidBound {
        bound: &'static str,
        input: String,
        #[source]
        source: TimestampError,
    },
    #[error("end time {end} must not be before start time {start}")]
    EndBeforeStart { start: Timestamp, end: Timestamp },
}

/// Inclusive date range a warrant covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: Timestamp,
    end: Timestamp,
}

impl DateRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, PolicyError> {
        if end < start {
            return Err(PolicyError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, PolicyError> {
        let bound = |bound: &'static str, input: &str| {
            parse_timestamp(input).map_err(|source| PolicyError::InvalidBound {
                bound,
                input: input.to_string(),
                source,
            })
        };
        Self::new(bound("start", start)?, bound("end", end)?)
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Offsets are honoured: instants are compared, not wall clocks.
    pub fn contains(&self, ts: &Timestamp) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

/// What the evaluator keeps and removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub range: DateRange,
    /// Deleted items skip date filtering; their timestamps are often unreliable.
    pub exempt_deleted: bool,
    /// `TimeContacted` is not consulted.
    pub exempt_contact_last_seen: bool,
}

impl Policy {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            exempt_deleted: true,
            exempt_contact_last_seen: true,
        }
    }

    pub fn exempt_deleted(mut self, exempt: bool) -> Self {
        self.exempt_deleted = exempt;
        self
    }

    pub fn exempt_contact_last_seen(mut self, exempt: bool) -> Self {
        self.exempt_contact_last_seen = exempt;
        self
    }
}
