//! Admin-list record operations.

use folio_core::payload::ExtractedPayload;
use folio_core::records::{AdminEntry, AdminRecord, BanRecord};
use tracing::{error, info};

use crate::github::IssueHost;
use crate::provisioner::IssueKind;
use crate::store::{RecordStore, StoreError};

impl<H: IssueHost + ?Sized> RecordStore<H> {
    /// Current administrators. Fail-open: an unprovisioned or unreadable
    /// list reads as empty.
    pub async fn admin_list(&self) -> Result<Vec<AdminEntry>, StoreError> {
        let (_, record) = self.read_record::<AdminRecord>(IssueKind::AdminList).await?;
        Ok(record.admins)
    }

    /// Permission check. Unlike the read path this fails closed: the admin
    /// list is a security precondition, so a missing or unreadable payload
    /// is a hard Forbidden, never an empty default.
    pub async fn require_admin(
        &self,
        username: &str,
        user_id: Option<u64>,
    ) -> Result<(), StoreError> {
        let (issue, parsed) = self
            .read_payload::<AdminRecord>(IssueKind::AdminList)
            .await?;
        let record = match parsed {
            ExtractedPayload::Ok(record) => record,
            ExtractedPayload::Missing => {
                return Err(StoreError::Forbidden(
                    "admin list is not provisioned".to_string(),
                ));
            }
            ExtractedPayload::Malformed(e) => {
                error!(
                    "Admin list payload in issue #{} is unreadable: {}",
                    issue.number, e
                );
                return Err(StoreError::Forbidden(
                    "admin list is unreadable".to_string(),
                ));
            }
        };

        if record.contains(username, user_id) {
            Ok(())
        } else {
            Err(StoreError::Forbidden(format!(
                "{} is not an administrator",
                username
            )))
        }
    }

    /// Replace the admin list.
    ///
    /// Entries that are new relative to the current list are cross-checked
    /// against the ban list before anything is written; a single banned
    /// candidate rejects the whole update. Entries already on the list are
    /// grandfathered (banning them is the ban-list update's job).
    pub async fn update_admin_list(&self, new_admins: Vec<AdminEntry>) -> Result<(), StoreError> {
        let (issue, mut record) = self.read_record::<AdminRecord>(IssueKind::AdminList).await?;

        let added: Vec<&AdminEntry> = new_admins
            .iter()
            .filter(|entry| !record.contains(&entry.username, entry.user_id))
            .collect();

        if !added.is_empty() {
            let (_, bans) = self.read_record::<BanRecord>(IssueKind::BanList).await?;
            for entry in &added {
                if bans.matches(&entry.username, entry.user_id) {
                    return Err(StoreError::Forbidden(format!(
                        "cannot grant admin access to banned user {}",
                        entry.username
                    )));
                }
            }
        }

        info!(
            "Updating admin list: {} -> {} entries ({} new)",
            record.admins.len(),
            new_admins.len(),
            added.len()
        );
        record.admins = new_admins;
        self.write_record(IssueKind::AdminList, issue.number, &record)
            .await
    }
}
