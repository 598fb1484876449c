//! Issue tracker client.
//!
//! The indexer talks to a GitHub-style issues API for three things: opening
//! purge tickets for expiring versions, closing the ticket a run was started
//! from, and reporting failures as comments on that ticket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The API answered with a non-success status.
    #[error("{op} failed (HTTP {status}): {message}")]
    Api {
        op: &'static str,
        status: u16,
        message: String,
    },

    /// The request never produced an API response.
    #[error("tracker request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Operations the indexer needs from the issue tracker.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Open an issue and return its number.
    async fn create_issue(&self, title: &str, body: &str) -> TrackerResult<u64>;

    /// Close an issue.
    async fn close_issue(&self, number: u64) -> TrackerResult<()>;

    /// Add a comment to an issue.
    async fn comment(&self, number: u64, body: &str) -> TrackerResult<()>;
}

#[derive(Debug, Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateIssueResponse {
    number: u64,
}

#[derive(Debug, Serialize)]
struct UpdateIssueRequest<'a> {
    state: &'a str,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

/// Tracker backed by the GitHub issues API.
pub struct GitHubTracker {
    http: reqwest::Client,
    api_base: String,
    repository: String,
    token: String,
}

// The token stays out of Debug output.
impl std::fmt::Debug for GitHubTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubTracker")
            .field("api_base", &self.api_base)
            .field("repository", &self.repository)
            .finish()
    }
}

impl GitHubTracker {
    /// * `api_base` - API root, `https://api.github.com` for github.com
    /// * `repository` - `owner/repo` the issues live in
    /// * `token` - bearer token for the API
    pub fn new(
        api_base: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> TrackerResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        let http = reqwest::Client::builder()
            .user_agent(concat!("version-indexer/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
        })
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/issues", self.api_base, self.repository)
    }

    /// Turn a non-success response into an Api error carrying the body.
    async fn check(
        op: &'static str,
        response: reqwest::Response,
    ) -> TrackerResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TrackerError::Api {
            op,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Tracker for GitHubTracker {
    async fn create_issue(&self, title: &str, body: &str) -> TrackerResult<u64> {
        let response = self
            .http
            .post(self.issues_url())
            .bearer_auth(&self.token)
            .json(&CreateIssueRequest { title, body })
            .send()
            .await?;

        let created: CreateIssueResponse =
            Self::check("create issue", response).await?.json().await?;
        Ok(created.number)
    }

    async fn close_issue(&self, number: u64) -> TrackerResult<()> {
        let url = format!("{}/{}", self.issues_url(), number);
        let response = self
            .http
            .patch(url)
            .bearer_auth(&self.token)
            .json(&UpdateIssueRequest { state: "closed" })
            .send()
            .await?;

        Self::check("close issue", response).await?;
        Ok(())
    }

    async fn comment(&self, number: u64, body: &str) -> TrackerResult<()> {
        let url = format!("{}/{}/comments", self.issues_url(), number);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&CommentRequest { body })
            .send()
            .await?;

        Self::check("comment", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_for(server: &wiremock::MockServer) -> GitHubTracker {
        GitHubTracker::new(server.uri(), "acme/widgets", "test-token").expect("build tracker")
    }

    #[tokio::test]
    async fn create_issue_returns_the_number() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/repos/acme/widgets/issues"))
            .and(wiremock::matchers::header("authorization", "Bearer test-token"))
            .and(wiremock::matchers::body_json(serde_json::json!({
                "title": "purge demo 1.2.0",
                "body": "expired"
            })))
            .respond_with(
                wiremock::ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"number": 77})),
            )
            .mount(&server)
            .await;

        let number = tracker_for(&server)
            .create_issue("purge demo 1.2.0", "expired")
            .await
            .expect("create issue");
        assert_eq!(number, 77);
    }

    #[tokio::test]
    async fn close_issue_patches_the_state() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("PATCH"))
            .and(wiremock::matchers::path("/repos/acme/widgets/issues/12"))
            .and(wiremock::matchers::body_json(
                serde_json::json!({"state": "closed"}),
            ))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "number": 12,
                    "state": "closed"
                })),
            )
            .expect(1)
            .mount(&server)
            .await;

        tracker_for(&server).close_issue(12).await.expect("close issue");
    }

    #[tokio::test]
    async fn comment_posts_to_the_comments_endpoint() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path(
                "/repos/acme/widgets/issues/12/comments",
            ))
            .and(wiremock::matchers::body_json(
                serde_json::json!({"body": "remote call failed: boom"}),
            ))
            .respond_with(
                wiremock::ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": 900})),
            )
            .expect(1)
            .mount(&server)
            .await;

        tracker_for(&server)
            .comment(12, "remote call failed: boom")
            .await
            .expect("comment");
    }

    #[tokio::test]
    async fn non_success_status_surfaces_as_api_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/repos/acme/widgets/issues"))
            .respond_with(
                wiremock::ResponseTemplate::new(422).set_body_string("Validation Failed"),
            )
            .mount(&server)
            .await;

        let err = tracker_for(&server)
            .create_issue("t", "b")
            .await
            .expect_err("422 must fail");
        match err {
            TrackerError::Api { status, message, .. } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Validation Failed");
            }
            other => panic!("expected Api error, got: {other}"),
        }
    }

    #[tokio::test]
    async fn trailing_slash_in_api_base_is_trimmed() {
        let tracker = GitHubTracker::new("https://api.github.com/", "acme/widgets", "t")
            .expect("build tracker");
        assert_eq!(
            tracker.issues_url(),
            "https://api.github.com/repos/acme/widgets/issues"
        );
    }
}
