// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Monotonic identity sequence used to number inodes.
//!
//! A `Sequence` hands out strictly increasing values between an inclusive
//! minimum and maximum. It performs no locking of its own: the engine only
//! calls [`Sequence::next`] while holding the tree lock.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Smallest value a sequence may start from. Zero is reserved for "unset".
pub const MINIMUM_BOUND: u64 = 1;

/// Largest value a sequence may emit.
pub const MAXIMUM_BOUND: u64 = u64::MAX - 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Last emitted value, `None` until the first call to `next`
    current: Option<u64>,
    #[serde(rename = "increment")]
    step: u64,
    #[serde(rename = "minvalue")]
    min: u64,
    #[serde(rename = "maxvalue")]
    max: u64,
    #[serde(skip)]
    exhausted: bool,
}

impl Sequence {
    /// Count by one from `MINIMUM_BOUND` to `MAXIMUM_BOUND`.
    pub fn new() -> Self {
        Self {
            current: None,
            step: 1,
            min: MINIMUM_BOUND,
            max: MAXIMUM_BOUND,
            exhausted: false,
        }
    }

    /// Count by one over the inclusive range `[min, max]`.
    pub fn with_bounds(min: u64, max: u64) -> FsResult<Self> {
        Self::with_step(min, max, 1)
    }

    /// Count by `step` over the inclusive range `[min, max]`.
    pub fn with_step(min: u64, max: u64, step: u64) -> FsResult<Self> {
        let seq = Self {
            current: None,
            step,
            min,
            max,
            exhausted: false,
        };
        seq.validate()?;
        Ok(seq)
    }

    /// Bounds and step must be sane, and `current` must lie within the bounds.
    fn validate(&self) -> FsResult<()> {
        let bounds = MINIMUM_BOUND..=MAXIMUM_BOUND;
        let bounds_ok = bounds.contains(&self.min) && bounds.contains(&self.max);
        let range_ok = self.min <= self.max;
        let step_ok = self.step != 0 && self.step <= self.min;
        let current_ok = self
            .current
            .into_iter()
            .all(|current| (self.min..=self.max).contains(&current));
        if bounds_ok && range_ok && step_ok && current_ok {
            Ok(())
        } else {
            Err(FsError::InvalidArgument)
        }
    }

    /// Advance the sequence and return the new value.
    pub fn next(&mut self) -> FsResult<u64> {
        if self.exhausted {
            return Err(FsError::ResourceExhausted);
        }

        let candidate = match self.current {
            None => Some(self.min),
            Some(current) => current.checked_add(self.step),
        };

        match candidate {
            Some(value) if value <= self.max => {
                self.current = Some(value);
                Ok(value)
            }
            _ => {
                self.exhausted = true;
                Err(FsError::ResourceExhausted)
            }
        }
    }

    /// The last value handed out, if any.
    pub fn current(&self) -> Option<u64> {
        self.current
    }

    pub fn is_started(&self) -> bool {
        self.current.is_some() && !self.exhausted
    }

    /// How many more values `next` can produce.
    pub fn remaining(&self) -> u64 {
        if self.exhausted {
            return 0;
        }
        let first = match self.current {
            None => self.min,
            Some(current) => match current.checked_add(self.step) {
                Some(next) => next,
                None => return 0,
            },
        };
        if first > self.max {
            return 0;
        }
        (self.max - first) / self.step + 1
    }

    /// Serialize the sequence state so another process can continue it.
    pub fn dump(&self) -> FsResult<Vec<u8>> {
        if !self.is_started() {
            return Err(FsError::InvalidArgument);
        }
        serde_json::to_vec(self).map_err(|_| FsError::InvalidArgument)
    }

    /// Restore a sequence previously produced by [`Sequence::dump`].
    pub fn load(data: &[u8]) -> FsResult<Self> {
        let seq: Sequence = serde_json::from_slice(data).map_err(|_| FsError::InvalidArgument)?;
        if seq.current.is_none() {
            return Err(FsError::InvalidArgument);
        }
        seq.validate()?;
        Ok(seq)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = format!(
            "incremented by {} between {} and {}",
            self.step, self.min, self.max
        );
        match self.current {
            Some(current) if self.is_started() => write!(f, "Sequence at {current}, {range}"),
            _ => write!(f, "Unstarted Sequence {range}"),
        }
    }
}
