//! Per-user warning history

use crate::error::{BotError, BotResult};
use crate::store::{Dataset, JsonStore, Repository};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Warnings shown per listing page
pub const PAGE_SIZE: usize = 5;

/// A single warning. Never edited after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfractionRecord {
    pub reason: String,
    pub issued_by: u64,
    pub timestamp: DateTime<Utc>,
}

pub type WarningBook = BTreeMap<u64, Vec<InfractionRecord>>;

#[derive(Clone)]
pub struct InfractionLedger {
    repo: Arc<Repository<WarningBook>>,
}

impl InfractionLedger {
    pub async fn open(store: JsonStore) -> Self {
        Self {
            repo: Arc::new(Repository::open(store, Dataset::Warnings).await),
        }
    }

    /// Append a warning and return the user's new warning count
    pub async fn warn(&self, user: UserId, reason: impl Into<String>, issuer: UserId) -> usize {
        let record = InfractionRecord {
            reason: reason.into(),
            issued_by: issuer.get(),
            timestamp: Utc::now(),
        };
        let count = self
            .repo
            .update(|book| {
                let entries = book.entry(user.get()).or_default();
                entries.push(record);
                entries.len()
            })
            .await;
        info!(user_id = %user, issuer_id = %issuer, count, "Warning recorded");
        count
    }

    /// Drop every warning of `user`, returning how many there were
    pub async fn reset_all(&self, user: UserId) -> usize {
        self.repo
            .update(|book| book.remove(&user.get()).map_or(0, |entries| entries.len()))
            .await
    }

    /// Remove the warning at `index`; later warnings shift down by one
    pub async fn remove_at(
        &self,
        user: UserId,
        index: usize,
        reason: &str,
    ) -> BotResult<InfractionRecord> {
        let removed = self
            .repo
            .try_update::<_, BotError>(|book| {
                let entries = book
                    .get_mut(&user.get())
                    .filter(|entries| index < entries.len())
                    .ok_or_else(|| BotError::not_found(format!("Warning #{} not found.", index + 1)))?;
                let removed = entries.remove(index);
                if entries.is_empty() {
                    book.remove(&user.get());
                }
                Ok(removed)
            })
            .await?;
        info!(
            user_id = %user,
            index,
            removed_reason = %removed.reason,
            removal_reason = %reason,
            "Warning removed"
        );
        Ok(removed)
    }

    pub async fn list(&self, user: UserId) -> Vec<InfractionRecord> {
        self.repo
            .read(|book| book.get(&user.get()).cloned().unwrap_or_default())
            .await
    }

    pub async fn count(&self, user: UserId) -> usize {
        self.repo
            .read(|book| book.get(&user.get()).map_or(0, Vec::len))
            .await
    }
}

/// One page of a warning listing
#[derive(Debug, PartialEq, Eq)]
pub struct Page<'a> {
    pub items: &'a [InfractionRecord],
    /// Zero-based page number after clamping
    pub page: usize,
    pub total_pages: usize,
    /// Index of `items[0]` in the full list
    pub offset: usize,
}

/// Slice `records` into pages of [`PAGE_SIZE`], clamping `page` to the last one
#[must_use]
pub fn paginate(records: &[InfractionRecord], page: usize) -> Page<'_> {
    let total_pages = records.len().div_ceil(PAGE_SIZE).max(1);
    let page = page.min(total_pages - 1);
    let offset = page * PAGE_SIZE;
    let end = (offset + PAGE_SIZE).min(records.len());
    Page {
        items: &records[offset.min(end)..end],
        page,
        total_pages,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;

    const TARGET: UserId = UserId::new(10);
    const STAFF: UserId = UserId::new(20);

    async fn ledger_with(reasons: &[&str]) -> InfractionLedger {
        let ledger = InfractionLedger::open(temp_store()).await;
        for reason in reasons {
            ledger.warn(TARGET, *reason, STAFF).await;
        }
        ledger
    }

    #[tokio::test]
    async fn test_warn_returns_running_count() {
        let ledger = InfractionLedger::open(temp_store()).await;
        assert_eq!(ledger.warn(TARGET, "spam", STAFF).await, 1);
        assert_eq!(ledger.warn(TARGET, "spam again", STAFF).await, 2);
        assert_eq!(ledger.warn(UserId::new(11), "other", STAFF).await, 1);
        assert_eq!(ledger.count(TARGET).await, 2);
    }

    #[tokio::test]
    async fn test_remove_middle_renumbers() {
        let ledger = ledger_with(&["a", "b", "c"]).await;
        let removed = ledger.remove_at(TARGET, 1, "appeal accepted").await.unwrap();
        assert_eq!(removed.reason, "b");

        let reasons: Vec<String> = ledger.list(TARGET).await.into_iter().map(|r| r.reason).collect();
        assert_eq!(reasons, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_remove_out_of_range_leaves_ledger_untouched() {
        let ledger = ledger_with(&["a", "b", "c"]).await;
        let result = ledger.remove_at(TARGET, 3, "typo").await;
        assert!(matches!(result, Err(BotError::NotFound(_))));
        assert_eq!(ledger.count(TARGET).await, 3);

        let result = ledger.remove_at(UserId::new(99), 0, "typo").await;
        assert!(matches!(result, Err(BotError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reset_all_clears_and_persists() {
        let store = temp_store();
        let ledger = InfractionLedger::open(store.clone()).await;
        ledger.warn(TARGET, "a", STAFF).await;
        ledger.warn(TARGET, "b", STAFF).await;
        assert_eq!(ledger.reset_all(TARGET).await, 2);

        let reopened = InfractionLedger::open(store).await;
        assert!(reopened.list(TARGET).await.is_empty());
    }

    #[test]
    fn test_paginate_clamps_and_slices() {
        let records: Vec<InfractionRecord> = (0..12)
            .map(|i| InfractionRecord {
                reason: format!("r{i}"),
                issued_by: 1,
                timestamp: Utc::now(),
            })
            .collect();

        let first = paginate(&records, 0);
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.total_pages, 3);

        let last = paginate(&records, 9);
        assert_eq!(last.page, 2);
        assert_eq!(last.offset, 10);
        assert_eq!(last.items.len(), 2);

        let empty = paginate(&[], 0);
        assert!(empty.items.is_empty());
        assert_eq!(empty.total_pages, 1);
    }
}
