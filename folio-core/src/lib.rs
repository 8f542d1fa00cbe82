pub mod error;
pub mod payload;
pub mod records;
pub mod retry;

pub use error::{ApiError, StatusCarrier};
pub use payload::ExtractedPayload;
pub use records::{
    AchievementRecord, AdminEntry, AdminRecord, BanEntry, BanRecord, VerificationEntry,
};
pub use retry::{retry_github_api, retry_with_backoff, RetryConfig, RetryEvent};
