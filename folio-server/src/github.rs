use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use folio_core::error::ApiError;

const API_BASE: &str = "https://api.github.com";
const COMMENTS_PER_PAGE: usize = 100;

/// An issue as seen by the rest of the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub locked: bool,
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
}

/// The issue-tracker boundary.
///
/// Everything the record layer needs from the provider: label-filtered
/// listing, create/update/lock for issues, and comment CRUD for the
/// high-churn record kinds. Implementations do not retry; callers wrap
/// operations in the retry engine where resilience matters.
#[async_trait]
pub trait IssueHost: Send + Sync {
    async fn list_issues(
        &self,
        labels: &[&str],
        state: &str,
        per_page: u32,
    ) -> Result<Vec<Issue>, ApiError>;

    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<Issue, ApiError>;

    async fn update_issue_body(&self, number: u64, body: &str) -> Result<Issue, ApiError>;

    /// Lock an issue so drive-by commenters cannot tamper with the record.
    async fn lock_issue(&self, number: u64, reason: &str) -> Result<(), ApiError>;

    async fn list_comments(&self, number: u64) -> Result<Vec<IssueComment>, ApiError>;

    async fn create_comment(&self, number: u64, body: &str) -> Result<IssueComment, ApiError>;

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<IssueComment, ApiError>;

    async fn delete_comment(&self, comment_id: u64) -> Result<(), ApiError>;
}

#[derive(Debug, Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct UpdateIssueRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct LockIssueRequest<'a> {
    lock_reason: &'a str,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    #[serde(default)]
    locked: bool,
}

impl From<IssueResponse> for Issue {
    fn from(response: IssueResponse) -> Self {
        Issue {
            number: response.number,
            title: response.title,
            body: response.body,
            labels: response.labels.into_iter().map(|l| l.name).collect(),
            locked: response.locked,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
    #[serde(default)]
    body: String,
}

impl From<CommentResponse> for IssueComment {
    fn from(response: CommentResponse) -> Self {
        IssueComment {
            id: response.id,
            body: response.body,
        }
    }
}

/// GitHub REST client scoped to a single repository.
///
/// Authenticates with a bearer token; one client instance per
/// (owner, repo, token) configuration.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(token: String, owner: String, repo: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("folio-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            token,
            owner,
            repo,
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{}", API_BASE, self.owner, self.repo, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| ApiError::Network {
                message: format!("failed to send {} request: {}", what, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("GitHub API error on {}: {} - {}", what, status, message);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, ApiError> {
    response.json().await.map_err(|e| ApiError::Network {
        message: format!("failed to parse {} response: {}", what, e),
    })
}

#[async_trait]
impl IssueHost for GitHubClient {
    async fn list_issues(
        &self,
        labels: &[&str],
        state: &str,
        per_page: u32,
    ) -> Result<Vec<Issue>, ApiError> {
        let url = self.repo_url(&format!(
            "/issues?labels={}&state={}&per_page={}",
            labels.join(","),
            state,
            per_page
        ));

        let response = self.send(self.client.get(&url), "list issues").await?;
        let issues: Vec<IssueResponse> = parse_json(response, "list issues").await?;
        Ok(issues.into_iter().map(Issue::from).collect())
    }

    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<Issue, ApiError> {
        let url = self.repo_url("/issues");
        info!("Creating issue \"{}\" in {}/{}", title, self.owner, self.repo);

        let request = CreateIssueRequest {
            title,
            body,
            labels,
        };
        let response = self
            .send(self.client.post(&url).json(&request), "create issue")
            .await?;
        let issue: IssueResponse = parse_json(response, "create issue").await?;
        info!("Created issue #{}", issue.number);
        Ok(issue.into())
    }

    async fn update_issue_body(&self, number: u64, body: &str) -> Result<Issue, ApiError> {
        let url = self.repo_url(&format!("/issues/{}", number));
        let request = UpdateIssueRequest { body };
        let response = self
            .send(self.client.patch(&url).json(&request), "update issue")
            .await?;
        let issue: IssueResponse = parse_json(response, "update issue").await?;
        Ok(issue.into())
    }

    async fn lock_issue(&self, number: u64, reason: &str) -> Result<(), ApiError> {
        let url = self.repo_url(&format!("/issues/{}/lock", number));
        let request = LockIssueRequest {
            lock_reason: reason,
        };
        self.send(self.client.put(&url).json(&request), "lock issue")
            .await?;
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<IssueComment>, ApiError> {
        let mut all_comments = Vec::new();
        let mut page = 1;

        loop {
            let url = self.repo_url(&format!(
                "/issues/{}/comments?page={}&per_page={}",
                number, page, COMMENTS_PER_PAGE
            ));

            let response = self.send(self.client.get(&url), "list comments").await?;
            let comments: Vec<CommentResponse> = parse_json(response, "list comments").await?;
            let count = comments.len();
            all_comments.extend(comments.into_iter().map(IssueComment::from));

            // Fewer than a full page means we have reached the last one.
            if count < COMMENTS_PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all_comments)
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<IssueComment, ApiError> {
        let url = self.repo_url(&format!("/issues/{}/comments", number));
        let request = CommentRequest { body };
        let response = self
            .send(self.client.post(&url).json(&request), "create comment")
            .await?;
        let comment: CommentResponse = parse_json(response, "create comment").await?;
        Ok(comment.into())
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<IssueComment, ApiError> {
        let url = self.repo_url(&format!("/issues/comments/{}", comment_id));
        let request = CommentRequest { body };
        let response = self
            .send(self.client.patch(&url).json(&request), "update comment")
            .await?;
        let comment: CommentResponse = parse_json(response, "update comment").await?;
        Ok(comment.into())
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        let url = self.repo_url(&format!("/issues/comments/{}", comment_id));
        self.send(self.client.delete(&url), "delete comment").await?;
        Ok(())
    }
}
