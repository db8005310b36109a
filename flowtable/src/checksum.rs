// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-table cookie checksums.
//!
//! A controller audits a table by comparing the XOR of the cookies it installed
//! with ours. To narrow down a mismatch the cookie space can be split in a
//! power-of-two number of buckets, indexed by the top bits of the cookie.

use tracing::{debug, error};

use crate::errors::FlowTableError;
use crate::types::Cookie;

use tracectl::trace_target;
trace_target!("flowtable-checksum", tracectl::LevelFilter::INFO, &["flowtable"]);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChecksum {
    checksum: u64,
    buckets: Vec<u64>,
    shift: u32,
}

impl TableChecksum {
    /// XOR of the cookies of all the entries of the table
    #[must_use]
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    #[must_use]
    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Number of buckets, 0 if the table is not bucketed
    #[must_use]
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn bucket_index(&self, cookie: Cookie) -> usize {
        // a shift of 64 (single bucket) overflows
        #[allow(clippy::cast_possible_truncation)]
        let index = cookie.checked_shr(self.shift).unwrap_or(0) as usize;
        index
    }

    /// Add or remove a cookie. XOR being its own inverse, both are the same.
    pub(crate) fn toggle(&mut self, cookie: Cookie) {
        self.checksum ^= cookie;
        if !self.buckets.is_empty() {
            let index = self.bucket_index(cookie);
            if let Some(bucket) = self.buckets.get_mut(index) {
                *bucket ^= cookie;
            }
        }
    }

    /// Check a bucket count without applying it
    pub(crate) fn validate_size(size: u32) -> Result<(), FlowTableError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(FlowTableError::InvalidBucketSize(size));
        }
        Ok(())
    }

    /// Replace the buckets with `size` buckets computed from `cookies`, which must
    /// be the cookies of every entry of the table.
    pub(crate) fn rebuild(
        &mut self,
        size: u32,
        cookies: impl Iterator<Item = Cookie>,
    ) -> Result<(), FlowTableError> {
        Self::validate_size(size)?;
        self.shift = 64 - size.trailing_zeros();
        self.buckets = vec![0; size as usize];
        let mut recomputed = 0;
        for cookie in cookies {
            recomputed ^= cookie;
            let index = self.bucket_index(cookie);
            if let Some(bucket) = self.buckets.get_mut(index) {
                *bucket ^= cookie;
            }
        }
        debug!("rebuild: {size} buckets, shift {}", self.shift);
        if recomputed != self.checksum {
            error!(
                "rebuild: table checksum {:#x} does not match entries {recomputed:#x}",
                self.checksum
            );
            debug_assert_eq!(recomputed, self.checksum);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn buckets_mut(&mut self) -> &mut [u64] {
        &mut self.buckets
    }

    /// Tell whether the buckets add up to the table checksum
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.buckets.is_empty() || self.buckets.iter().fold(0, |acc, b| acc ^ b) == self.checksum
    }
}
