//! Ban-list record operations.

use folio_core::records::{BanEntry, BanRecord};
use tracing::info;

use crate::github::IssueHost;
use crate::provisioner::IssueKind;
use crate::store::{RecordStore, StoreError};

impl<H: IssueHost + ?Sized> RecordStore<H> {
    /// Current ban list. Fail-open: absent reads as empty.
    pub async fn ban_list(&self) -> Result<Vec<BanEntry>, StoreError> {
        let (_, record) = self.read_record::<BanRecord>(IssueKind::BanList).await?;
        Ok(record.banned)
    }

    /// Replace the ban list.
    pub async fn update_ban_list(&self, banned: Vec<BanEntry>) -> Result<(), StoreError> {
        let (issue, mut record) = self.read_record::<BanRecord>(IssueKind::BanList).await?;
        info!(
            "Updating ban list: {} -> {} entries",
            record.banned.len(),
            banned.len()
        );
        record.banned = banned;
        self.write_record(IssueKind::BanList, issue.number, &record)
            .await
    }
}
