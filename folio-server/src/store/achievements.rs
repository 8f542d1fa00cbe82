//! Achievement-counter record operations.

use chrono::{DateTime, Utc};
use folio_core::records::{AchievementRecord, UserAchievements};
use tracing::info;

use crate::github::IssueHost;
use crate::provisioner::IssueKind;
use crate::store::{RecordStore, StoreError};

impl<H: IssueHost + ?Sized> RecordStore<H> {
    /// Bump `slug` for `username` and persist the record. Returns the new
    /// count. Concurrent increments from other processes are
    /// last-writer-wins, like every body-backed record.
    pub async fn record_achievement(
        &self,
        username: &str,
        slug: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let (issue, mut record) = self
            .read_record::<AchievementRecord>(IssueKind::Achievements)
            .await?;
        let count = record.record(username, slug, now);
        self.write_record(IssueKind::Achievements, issue.number, &record)
            .await?;
        info!("Recorded achievement {} for {} (now {})", slug, username, count);
        Ok(count)
    }

    /// Counters for one user, if any have been recorded.
    pub async fn user_achievements(
        &self,
        username: &str,
    ) -> Result<Option<UserAchievements>, StoreError> {
        let (_, record) = self
            .read_record::<AchievementRecord>(IssueKind::Achievements)
            .await?;
        Ok(record.users.get(username).cloned())
    }
}
