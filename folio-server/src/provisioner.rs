//! Find-or-create for the singleton index issues.
//!
//! Each record kind lives in exactly one issue per repository, discovered by
//! label and identified by its canonical title. Creation is racy across
//! independent server instances (search-before-create, no provider-side
//! uniqueness), but within one instance all concurrent callers are coalesced
//! onto a single provider round trip and share a short-lived cache of the
//! resolved issue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use folio_core::error::ApiError;
use folio_core::payload;
use folio_core::records::{AchievementRecord, AdminRecord, BanRecord};

use crate::github::{Issue, IssueHost};

/// How long a resolved issue stays fresh. Long enough to absorb a burst of
/// concurrent editor saves into one lookup, short enough that out-of-band
/// changes are picked up quickly.
const CACHE_TTL: Duration = Duration::from_secs(5);

/// Candidates fetched per discovery call. Labels can be reused by humans, so
/// discovery fetches a handful and selects by exact title.
const DISCOVERY_PAGE_SIZE: u32 = 10;

const LOCK_REASON: &str = "resolved";

/// The record kinds stored as index issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    VerificationCodes,
    AdminList,
    BanList,
    Achievements,
}

impl IssueKind {
    /// Canonical issue title. Authoritative for discovery: a label match
    /// with a different title is somebody else's issue.
    pub fn title(self) -> &'static str {
        match self {
            Self::VerificationCodes => "[Email Verification]",
            Self::AdminList => "[Wiki Admins]",
            Self::BanList => "[Wiki Bans]",
            Self::Achievements => "[Wiki Achievements]",
        }
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Self::VerificationCodes => &["email-verification", "automated"],
            Self::AdminList => &["wiki-admins", "automated"],
            Self::BanList => &["wiki-bans", "automated"],
            Self::Achievements => &["wiki-achievements", "automated"],
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            Self::VerificationCodes => "## Email verification codes",
            Self::AdminList => "## Wiki administrators",
            Self::BanList => "## Banned users",
            Self::Achievements => "## Achievement records",
        }
    }

    /// Body a freshly created index issue starts with.
    pub fn initial_body(self) -> String {
        let body = match self {
            // Verification entries live in comments; the body payload stays
            // an empty object.
            Self::VerificationCodes => payload::embed(self.heading(), &serde_json::json!({})),
            Self::AdminList => payload::embed(self.heading(), &AdminRecord::default()),
            Self::BanList => payload::embed(self.heading(), &BanRecord::default()),
            Self::Achievements => payload::embed(self.heading(), &AchievementRecord::default()),
        };
        body.expect("default payloads serialize")
    }
}

struct CachedIssue {
    issue: Issue,
    resolved_at: Instant,
}

/// Per-instance find-or-create coordinator.
///
/// # Concurrency
///
/// Each kind has its own slot behind an async mutex. The first caller in a
/// burst performs the search/create round trip while the rest queue on the
/// slot; when they acquire it the result is inside the freshness window and
/// they return the same issue without touching the provider. Failures are
/// never cached, so the call after a failure starts a fresh search.
///
/// Distinct provisioner instances share nothing. Across instances the only
/// protection against duplicate creation is search-before-create, and the
/// remaining race is accepted.
pub struct IssueProvisioner<H: IssueHost + ?Sized> {
    host: Arc<H>,
    slots: RwLock<HashMap<IssueKind, Arc<Mutex<Option<CachedIssue>>>>>,
}

impl<H: IssueHost + ?Sized> IssueProvisioner<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the slot for a kind.
    async fn slot(&self, kind: IssueKind) -> Arc<Mutex<Option<CachedIssue>>> {
        // Fast path: slot already exists.
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(&kind) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots
            .entry(kind)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Resolve the index issue for `kind`, creating it if necessary.
    ///
    /// Does not retry; callers wrap this in the retry engine when they need
    /// resilience against transient provider errors.
    pub async fn get_or_create(&self, kind: IssueKind) -> Result<Issue, ApiError> {
        let slot = self.slot(kind).await;
        let mut guard = slot.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.resolved_at.elapsed() < CACHE_TTL {
                return Ok(cached.issue.clone());
            }
        }
        // Expired, or never resolved. Clear first so an error below leaves
        // nothing stale behind.
        *guard = None;

        let issue = self.provision(kind).await?;
        *guard = Some(CachedIssue {
            issue: issue.clone(),
            resolved_at: Instant::now(),
        });
        Ok(issue)
    }

    /// Write-through cache update after a body rewrite, so a
    /// read-modify-write followed by another read inside the freshness
    /// window observes the new body instead of the stale cached one.
    pub(crate) async fn refresh(&self, kind: IssueKind, issue: Issue) {
        let slot = self.slot(kind).await;
        let mut guard = slot.lock().await;
        *guard = Some(CachedIssue {
            issue,
            resolved_at: Instant::now(),
        });
    }

    async fn provision(&self, kind: IssueKind) -> Result<Issue, ApiError> {
        let candidates = self
            .host
            .list_issues(kind.labels(), "open", DISCOVERY_PAGE_SIZE)
            .await?;

        if let Some(found) = candidates
            .into_iter()
            .find(|issue| issue.title == kind.title())
        {
            if !found.locked {
                self.lock_best_effort(found.number).await;
            }
            return Ok(found);
        }

        info!("No {} index issue found, creating one", kind.title());
        let created = self
            .host
            .create_issue(kind.title(), &kind.initial_body(), kind.labels())
            .await?;
        info!("Created {} index issue #{}", kind.title(), created.number);
        self.lock_best_effort(created.number).await;
        Ok(created)
    }

    /// Locking is advisory hardening, not required for correctness.
    async fn lock_best_effort(&self, number: u64) {
        if let Err(e) = self.host.lock_issue(number, LOCK_REASON).await {
            warn!("Failed to lock issue #{}: {}", number, e);
        }
    }
}
