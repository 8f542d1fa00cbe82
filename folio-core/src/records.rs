//! Record payloads stored inside index issues.
//!
//! Field names use camelCase because the browser editor reads and writes the
//! same payloads. Every record and entry carries a flattened `extra` map so
//! keys written by newer clients are preserved across a read-modify-write
//! cycle instead of being silently dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One wiki administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEntry {
    pub username: String,
    /// Immutable numeric account id. Preferred for identity comparisons
    /// because usernames can be changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AdminEntry {
    pub fn new(username: impl Into<String>, user_id: Option<u64>) -> Self {
        Self {
            username: username.into(),
            user_id,
            extra: Map::new(),
        }
    }
}

/// Payload of the admin-list index issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    #[serde(default)]
    pub admins: Vec<AdminEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AdminRecord {
    /// Whether the given user is listed, preferring the numeric id and
    /// falling back to a case-insensitive username match when either side
    /// has no id.
    pub fn contains(&self, username: &str, user_id: Option<u64>) -> bool {
        self.admins
            .iter()
            .any(|admin| identity_matches(&admin.username, admin.user_id, username, user_id))
    }
}

/// One banned user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BanEntry {
    pub fn new(username: impl Into<String>, user_id: Option<u64>) -> Self {
        Self {
            username: username.into(),
            user_id,
            extra: Map::new(),
        }
    }
}

/// Payload of the ban-list index issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    #[serde(default)]
    pub banned: Vec<BanEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BanRecord {
    /// Whether the given user appears on the ban list.
    ///
    /// The numeric id wins when both sides have one, so a banned account
    /// cannot slip back in by renaming itself.
    pub fn matches(&self, username: &str, user_id: Option<u64>) -> bool {
        self.banned
            .iter()
            .any(|ban| identity_matches(&ban.username, ban.user_id, username, user_id))
    }
}

fn identity_matches(
    listed_name: &str,
    listed_id: Option<u64>,
    username: &str,
    user_id: Option<u64>,
) -> bool {
    match (listed_id, user_id) {
        (Some(a), Some(b)) => a == b,
        _ => listed_name.eq_ignore_ascii_case(username),
    }
}

/// One stored verification code, kept as its own issue comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEntry {
    /// Hash of the verification key (the requesting address), used to find
    /// the entry without exposing the address.
    pub key_hash: String,
    /// Keyed MAC of the code; plaintext codes never reach the issue tracker.
    pub sealed_code: String,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerificationEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Per-user achievement counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievements {
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of the achievements index issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecord {
    #[serde(default)]
    pub users: BTreeMap<String, UserAchievements>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AchievementRecord {
    /// Bump `slug` for `username`, creating the user entry on first sight.
    pub fn record(&mut self, username: &str, slug: &str, now: DateTime<Utc>) -> u64 {
        let user = self.users.entry(username.to_string()).or_default();
        let count = user.counts.entry(slug.to_string()).or_insert(0);
        *count += 1;
        user.updated_at = Some(now);
        *count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ban_match_prefers_numeric_id_over_renamed_account() {
        let bans = BanRecord {
            banned: vec![BanEntry::new("bob2", Some(42))],
            extra: Map::new(),
        };
        // Same account id, different display name: still banned.
        assert!(bans.matches("Bob", Some(42)));
        // Different id: the name fallback must not fire when both ids exist.
        assert!(!bans.matches("bob2", Some(43)));
    }

    #[test]
    fn ban_match_falls_back_to_case_insensitive_name() {
        let bans = BanRecord {
            banned: vec![BanEntry::new("Eve", None)],
            extra: Map::new(),
        };
        assert!(bans.matches("eve", Some(99)));
        assert!(bans.matches("EVE", None));
        assert!(!bans.matches("mallory", None));
    }

    #[test]
    fn admin_contains_uses_the_same_identity_rules() {
        let admins = AdminRecord {
            admins: vec![AdminEntry::new("Alice", Some(7))],
            extra: Map::new(),
        };
        assert!(admins.contains("renamed-alice", Some(7)));
        assert!(admins.contains("alice", None));
        assert!(!admins.contains("alice", Some(8)));
    }

    #[test]
    fn achievement_record_increments_and_stamps() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let mut record = AchievementRecord::default();
        assert_eq!(record.record("alice", "pages-created", now), 1);
        assert_eq!(record.record("alice", "pages-created", now), 2);
        assert_eq!(record.record("alice", "images-uploaded", now), 1);
        assert_eq!(record.record("bob", "pages-created", now), 1);

        let alice = &record.users["alice"];
        assert_eq!(alice.counts["pages-created"], 2);
        assert_eq!(alice.updated_at, Some(now));
    }

    #[test]
    fn verification_entry_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let entry = VerificationEntry {
            key_hash: "abc".into(),
            sealed_code: "def".into(),
            expires_at: now,
            extra: Map::new(),
        };
        assert!(entry.is_expired(now));
        assert!(!entry.is_expired(now - chrono::Duration::seconds(1)));
    }
}
