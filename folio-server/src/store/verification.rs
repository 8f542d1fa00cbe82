//! Email-verification code storage.
//!
//! Codes churn far faster than the other records, so instead of rewriting
//! the index issue's body on every request, each pending code lives in its
//! own comment on the verification index issue. Re-requesting a code for the
//! same address updates that address's comment in place; verifying consumes
//! the comment; expired comments are swept opportunistically during scans.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use folio_core::payload::{self, ExtractedPayload};
use folio_core::records::VerificationEntry;

use crate::github::IssueHost;
use crate::provisioner::IssueKind;
use crate::store::{RecordStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

const ENTRY_HEADING: &str = "### Verification code";

/// Hash of the verification key (the requesting address). Stored instead of
/// the address itself.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Keyed MAC of a code, bound to its key hash. Plaintext codes never reach
/// the issue tracker; verification compares freshly sealed submissions.
pub fn seal_code(secret: &str, key_hash: &str, code: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(key_hash.as_bytes());
    mac.update(b":");
    mac.update(code.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

impl<H: IssueHost + ?Sized> RecordStore<H> {
    /// Store (or refresh) the pending code for `key_hash`.
    pub async fn store_verification_code(
        &self,
        key_hash: &str,
        sealed_code: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, StoreError> {
        let issue = self
            .provisioner()
            .get_or_create(IssueKind::VerificationCodes)
            .await?;

        let expires_at = now + ttl;
        let entry = VerificationEntry {
            key_hash: key_hash.to_string(),
            sealed_code: sealed_code.to_string(),
            expires_at,
            extra: Default::default(),
        };
        let body = payload::embed(ENTRY_HEADING, &entry)?;

        let comments = self.host().list_comments(issue.number).await?;
        let mut existing = None;
        for comment in &comments {
            let ExtractedPayload::Ok(parsed) = payload::extract::<VerificationEntry>(&comment.body)
            else {
                continue;
            };
            if parsed.key_hash == key_hash {
                existing = Some(comment.id);
            } else if parsed.is_expired(now) {
                self.sweep_expired_comment(comment.id).await;
            }
        }

        match existing {
            Some(comment_id) => {
                self.host().update_comment(comment_id, &body).await?;
            }
            None => {
                self.host().create_comment(issue.number, &body).await?;
            }
        }
        Ok(expires_at)
    }

    /// Check a sealed submission against the stored entry for `key_hash`.
    ///
    /// A successful match consumes the entry so the code is single-use.
    /// Expired entries never match and are swept.
    pub async fn verify_code(
        &self,
        key_hash: &str,
        sealed_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let issue = self
            .provisioner()
            .get_or_create(IssueKind::VerificationCodes)
            .await?;

        let comments = self.host().list_comments(issue.number).await?;
        for comment in comments {
            let ExtractedPayload::Ok(entry) = payload::extract::<VerificationEntry>(&comment.body)
            else {
                continue;
            };
            if entry.key_hash != key_hash {
                if entry.is_expired(now) {
                    self.sweep_expired_comment(comment.id).await;
                }
                continue;
            }

            if entry.is_expired(now) {
                info!("Verification entry expired before use");
                self.sweep_expired_comment(comment.id).await;
                return Ok(false);
            }
            if entry.sealed_code == sealed_code {
                // Consume on success. Deletion is best-effort: the
                // verification already succeeded, a leftover comment only
                // allows a redundant re-verify until it expires.
                if let Err(e) = self.host().delete_comment(comment.id).await {
                    warn!("Failed to consume verification comment: {}", e);
                }
                return Ok(true);
            }
            return Ok(false);
        }
        Ok(false)
    }

    async fn sweep_expired_comment(&self, comment_id: u64) {
        if let Err(e) = self.host().delete_comment(comment_id).await {
            warn!("Failed to sweep expired verification comment: {}", e);
        }
    }
}
