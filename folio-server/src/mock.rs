//! Scripted in-memory `IssueHost` for tests.
//!
//! Behaves like a tiny issue tracker (issues and comments live in memory,
//! created issues are discoverable by later list calls) and counts every
//! provider call so tests can assert how many round trips an operation cost.
//! Failures are scripted per call via FIFO queues.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use folio_core::error::ApiError;

use crate::github::{Issue, IssueComment, IssueHost};

#[derive(Default)]
pub struct CallCounts {
    pub list_issues: AtomicU32,
    pub create_issue: AtomicU32,
    pub update_issue: AtomicU32,
    pub lock_issue: AtomicU32,
    pub list_comments: AtomicU32,
    pub create_comment: AtomicU32,
    pub update_comment: AtomicU32,
    pub delete_comment: AtomicU32,
}

pub struct MockHost {
    issues: Mutex<Vec<Issue>>,
    comments: Mutex<Vec<(u64, IssueComment)>>,
    next_issue_number: AtomicU64,
    next_comment_id: AtomicU64,
    list_failures: Mutex<VecDeque<ApiError>>,
    create_failures: Mutex<VecDeque<ApiError>>,
    lock_failures: Mutex<VecDeque<ApiError>>,
    pub calls: CallCounts,
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_first_issue_number(100)
    }

    pub fn with_first_issue_number(first: u64) -> Self {
        Self {
            issues: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            next_issue_number: AtomicU64::new(first),
            next_comment_id: AtomicU64::new(1),
            list_failures: Mutex::new(VecDeque::new()),
            create_failures: Mutex::new(VecDeque::new()),
            lock_failures: Mutex::new(VecDeque::new()),
            calls: CallCounts::default(),
        }
    }

    pub async fn seed_issue(&self, title: &str, body: &str, labels: &[&str]) -> u64 {
        let number = self.next_issue_number.fetch_add(1, Ordering::SeqCst);
        self.issues.lock().await.push(Issue {
            number,
            title: title.to_string(),
            body: Some(body.to_string()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            locked: false,
        });
        number
    }

    pub async fn issue_body(&self, number: u64) -> Option<String> {
        self.issues
            .lock()
            .await
            .iter()
            .find(|i| i.number == number)
            .and_then(|i| i.body.clone())
    }

    pub async fn comments_for(&self, number: u64) -> Vec<IssueComment> {
        self.comments
            .lock()
            .await
            .iter()
            .filter(|(n, _)| *n == number)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub async fn fail_next_list(&self, error: ApiError) {
        self.list_failures.lock().await.push_back(error);
    }

    pub async fn fail_next_create(&self, error: ApiError) {
        self.create_failures.lock().await.push_back(error);
    }

    pub async fn fail_next_lock(&self, error: ApiError) {
        self.lock_failures.lock().await.push_back(error);
    }
}

#[async_trait]
impl IssueHost for MockHost {
    async fn list_issues(
        &self,
        labels: &[&str],
        _state: &str,
        per_page: u32,
    ) -> Result<Vec<Issue>, ApiError> {
        self.calls.list_issues.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_failures.lock().await.pop_front() {
            return Err(error);
        }
        let issues = self.issues.lock().await;
        Ok(issues
            .iter()
            .filter(|issue| {
                labels
                    .iter()
                    .all(|label| issue.labels.iter().any(|have| have == label))
            })
            .take(per_page as usize)
            .cloned()
            .collect())
    }

    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<Issue, ApiError> {
        self.calls.create_issue.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.create_failures.lock().await.pop_front() {
            return Err(error);
        }
        let issue = Issue {
            number: self.next_issue_number.fetch_add(1, Ordering::SeqCst),
            title: title.to_string(),
            body: Some(body.to_string()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            locked: false,
        };
        self.issues.lock().await.push(issue.clone());
        Ok(issue)
    }

    async fn update_issue_body(&self, number: u64, body: &str) -> Result<Issue, ApiError> {
        self.calls.update_issue.fetch_add(1, Ordering::SeqCst);
        let mut issues = self.issues.lock().await;
        match issues.iter_mut().find(|i| i.number == number) {
            Some(issue) => {
                issue.body = Some(body.to_string());
                Ok(issue.clone())
            }
            None => Err(ApiError::Status {
                status: 404,
                message: format!("issue #{} not found", number),
            }),
        }
    }

    async fn lock_issue(&self, number: u64, _reason: &str) -> Result<(), ApiError> {
        self.calls.lock_issue.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.lock_failures.lock().await.pop_front() {
            return Err(error);
        }
        let mut issues = self.issues.lock().await;
        if let Some(issue) = issues.iter_mut().find(|i| i.number == number) {
            issue.locked = true;
        }
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<IssueComment>, ApiError> {
        self.calls.list_comments.fetch_add(1, Ordering::SeqCst);
        Ok(self.comments_for(number).await)
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<IssueComment, ApiError> {
        self.calls.create_comment.fetch_add(1, Ordering::SeqCst);
        let comment = IssueComment {
            id: self.next_comment_id.fetch_add(1, Ordering::SeqCst),
            body: body.to_string(),
        };
        self.comments.lock().await.push((number, comment.clone()));
        Ok(comment)
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<IssueComment, ApiError> {
        self.calls.update_comment.fetch_add(1, Ordering::SeqCst);
        let mut comments = self.comments.lock().await;
        match comments.iter_mut().find(|(_, c)| c.id == comment_id) {
            Some((_, comment)) => {
                comment.body = body.to_string();
                Ok(comment.clone())
            }
            None => Err(ApiError::Status {
                status: 404,
                message: format!("comment {} not found", comment_id),
            }),
        }
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.calls.delete_comment.fetch_add(1, Ordering::SeqCst);
        self.comments.lock().await.retain(|(_, c)| c.id != comment_id);
        Ok(())
    }
}
