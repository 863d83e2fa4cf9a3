// SPDX-License-Identifier: Apache-2.0

use crate::error::{CacheError, CacheErrorCode};

/// Process-local view of the cache quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceBudget {
    quota_bytes: u64,
    used_bytes: u64,
}

impl SpaceBudget {
    #[must_use]
    pub const fn new(quota_bytes: u64, used_bytes: u64) -> Self {
        Self {
            quota_bytes,
            used_bytes,
        }
    }

    #[must_use]
    pub const fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Zero when usage already exceeds the quota.
    #[must_use]
    pub const fn available_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_bytes)
    }

    /// Room left once `old_bytes` of existing data are given back.
    #[must_use]
    pub const fn available_replacing(&self, old_bytes: u64) -> u64 {
        self.quota_bytes
            .saturating_sub(self.used_bytes.saturating_sub(old_bytes))
    }

    /// Records `bytes` of new data. Fails without changing the budget when
    /// that would overrun the quota.
    pub fn charge(&mut self, bytes: u64) -> Result<(), CacheError> {
        self.replace(0, bytes)
    }

    /// Swaps `old_bytes` of existing data for `new_bytes` in one step.
    /// Fails without changing the budget when the result overruns the quota.
    pub fn replace(&mut self, old_bytes: u64, new_bytes: u64) -> Result<(), CacheError> {
        let available = self.available_replacing(old_bytes);
        if new_bytes > available {
            return Err(CacheError::new(
                CacheErrorCode::SpaceExhausted,
                format!(
                    "writing {new_bytes} bytes would exceed the cache quota ({available} of {} bytes available)",
                    self.quota_bytes
                ),
            ));
        }
        self.used_bytes = self.used_bytes.saturating_sub(old_bytes).saturating_add(new_bytes);
        Ok(())
    }

    pub fn release(&mut self, bytes: u64) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    /// Adds back bytes that are still on disk, quota or not.
    pub fn restore(&mut self, bytes: u64) {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
    }
}
