use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Reaction content codes accepted by the GitHub reactions API.
pub const REACTION_CONTENT: &[&str] = &[
    "+1", "-1", "laugh", "confused", "heart", "hooray", "rocket", "eyes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }
}

/// The mutation surface the dispatcher needs from the hosting platform.
///
/// Issues and pull requests share the issues endpoints for every operation
/// here, so one trait covers both. Each method is a single remote call with
/// no retries.
#[async_trait]
pub trait IssueOps: Send + Sync {
    async fn set_state(&self, number: u64, state: IssueState) -> Result<()>;
    async fn lock(&self, number: u64, reason: Option<&str>) -> Result<()>;
    async fn unlock(&self, number: u64) -> Result<()>;
    /// Returns the id of the created comment.
    async fn create_comment(&self, number: u64, body: &str) -> Result<u64>;
    async fn add_reaction(&self, comment_id: u64, content: &str) -> Result<()>;
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()>;
    async fn remove_label(&self, number: u64, name: &str) -> Result<()>;
    async fn set_pinned(&self, node_id: &str, pinned: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    repo_owner: String,
    repo_name: String,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Comment {
    id: u64,
}

#[derive(Debug, Serialize)]
struct UpdateIssueRequest {
    state: String,
}

#[derive(Debug, Serialize)]
struct LockRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest {
    labels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReactionRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

impl GitHubClient {
    pub fn new(token: &str, repository: &str) -> Result<Self> {
        let (repo_owner, repo_name) = repository
            .split_once('/')
            .with_context(|| format!("Invalid repository '{}', expected owner/name", repository))?;

        let client = Client::builder()
            .user_agent("label-bot")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(GitHubClient {
            client,
            token: token.to_string(),
            repo_owner: repo_owner.to_string(),
            repo_name: repo_name.to_string(),
        })
    }

    fn issue_url(&self, rest: &str) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/{}",
            self.repo_owner, self.repo_name, rest
        )
    }

    fn remove_label_url(&self, number: u64, name: &str) -> String {
        // Label names may contain '#', '?', '%' and similar; they must be
        // escaped before landing in the URL path.
        self.issue_url(&format!(
            "issues/{}/labels/{}",
            number,
            urlencoding::encode(name)
        ))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn check(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response
            .text()
            .await
            .context("Failed to read error response body")?;
        error!("GitHub API error {}: {} - {}", what, status, error_text);
        Err(anyhow!(
            "GitHub API error {}: {} - {}",
            what,
            status,
            error_text
        ))
    }

    /// Fetch a file from the repository via the contents API.
    ///
    /// A 404 is a normal outcome (the override document simply does not
    /// exist) and yields `Ok(None)`; any other failure is an error.
    pub async fn get_file_content(&self, path: &str) -> Result<Option<String>> {
        let url = self.issue_url(&format!("contents/{}", path));

        info!("Fetching file contents: {}", path);

        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .context("Failed to send file contents request")?;

        if response.status() == StatusCode::NOT_FOUND {
            info!("File {} not found, falling back to defaults", path);
            return Ok(None);
        }

        let response = Self::check(response, "fetching file").await?;

        let file_response: FileContentsResponse = response
            .json()
            .await
            .context("Failed to parse file contents response")?;

        let decoded = general_purpose::STANDARD
            .decode(file_response.content.replace('\n', ""))
            .context("Failed to decode base64 file content")?;
        let content = String::from_utf8(decoded).context("File content is not valid UTF-8")?;

        info!("Successfully fetched file contents ({} bytes)", content.len());
        Ok(Some(content))
    }
}

#[async_trait]
impl IssueOps for GitHubClient {
    async fn set_state(&self, number: u64, state: IssueState) -> Result<()> {
        let url = self.issue_url(&format!("issues/{}", number));

        info!("Setting issue #{} state to {}", number, state.as_str());

        let request_body = UpdateIssueRequest {
            state: state.as_str().to_string(),
        };
        let response = self
            .authed(self.client.patch(&url))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send issue update request")?;

        Self::check(response, "updating issue state").await?;
        Ok(())
    }

    async fn lock(&self, number: u64, reason: Option<&str>) -> Result<()> {
        let url = self.issue_url(&format!("issues/{}/lock", number));

        info!(
            "Locking issue #{} with reason {:?}",
            number,
            reason.unwrap_or("none")
        );

        let request_body = LockRequest {
            lock_reason: reason.map(|r| r.to_string()),
        };
        let response = self
            .authed(self.client.put(&url))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send lock request")?;

        Self::check(response, "locking issue").await?;
        Ok(())
    }

    async fn unlock(&self, number: u64) -> Result<()> {
        let url = self.issue_url(&format!("issues/{}/lock", number));

        info!("Unlocking issue #{}", number);

        let response = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .context("Failed to send unlock request")?;

        Self::check(response, "unlocking issue").await?;
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<u64> {
        let url = self.issue_url(&format!("issues/{}/comments", number));

        info!("Posting comment to issue #{}", number);

        let request_body = CreateCommentRequest {
            body: body.to_string(),
        };
        let response = self
            .authed(self.client.post(&url))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send comment request")?;

        let response = Self::check(response, "creating comment").await?;

        let comment: Comment = response
            .json()
            .await
            .context("Failed to parse comment response")?;
        info!("Successfully posted comment with ID: {}", comment.id);

        Ok(comment.id)
    }

    async fn add_reaction(&self, comment_id: u64, content: &str) -> Result<()> {
        let url = self.issue_url(&format!("issues/comments/{}/reactions", comment_id));

        info!("Adding reaction '{}' to comment {}", content, comment_id);

        let request_body = ReactionRequest {
            content: content.to_string(),
        };
        let response = self
            .authed(self.client.post(&url))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send reaction request")?;

        Self::check(response, "adding reaction").await?;
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        let url = self.issue_url(&format!("issues/{}/labels", number));

        info!("Adding labels {:?} to issue #{}", labels, number);

        let request_body = AddLabelsRequest {
            labels: labels.to_vec(),
        };
        let response = self
            .authed(self.client.post(&url))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send add labels request")?;

        Self::check(response, "adding labels").await?;
        Ok(())
    }

    async fn remove_label(&self, number: u64, name: &str) -> Result<()> {
        let url = self.remove_label_url(number, name);

        info!("Removing label '{}' from issue #{}", name, number);

        let response = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .context("Failed to send remove label request")?;

        Self::check(response, "removing label").await?;
        Ok(())
    }

    async fn set_pinned(&self, node_id: &str, pinned: bool) -> Result<()> {
        // Pinning has no REST endpoint; it goes through the GraphQL API.
        // https://developer.github.com/v4/input_object/pinissueinput/
        let mutation = if pinned {
            "mutation ($input: PinIssueInput!) { pinIssue(input: $input) { issue { number } } }"
        } else {
            "mutation ($input: UnpinIssueInput!) { unpinIssue(input: $input) { issue { number } } }"
        };

        info!("Setting pinned={} for issue node {}", pinned, node_id);

        let request_body = serde_json::json!({
            "query": mutation,
            "variables": { "input": { "issueId": node_id } },
        });
        let response = self
            .client
            .post("https://api.github.com/graphql")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.elektra-preview+json")
            .json(&request_body)
            .send()
            .await
            .context("Failed to send pin mutation request")?;

        let response = Self::check(response, "pinning issue").await?;

        // GraphQL reports failures in-band with a 200 status.
        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse pin mutation response")?;
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                error!("GraphQL errors pinning issue: {:?}", errors);
                return Err(anyhow!("GraphQL errors pinning issue: {:?}", errors));
            }
        }

        Ok(())
    }
}
