//! GitLab API client.
//!
//! Provides an HTTP client for GitLab API v4 with token authentication,
//! pagination headers and a fixed transport-level retry.

use crate::error::AppError;
use crate::services::pagination::{self, PaginatedResponse, PaginationInfo};
use crate::services::source::MergeRequestSource;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pause between transport retries.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Page size used when listing group projects.
const PROJECTS_PER_PAGE: u32 = 100;

/// GitLab API client configuration.
#[derive(Debug, Clone)]
pub struct GitLabClientConfig {
    /// Base URL of the GitLab instance (e.g., `https://gitlab.com`).
    pub base_url: String,

    /// Personal access token for authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Extra attempts after a timeout, connection failure or 5xx.
    pub max_retries: u32,
}

impl Default for GitLabClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    config: GitLabClientConfig,
}

/// GitLab group from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabGroup {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub full_path: Option<String>,
}

/// GitLab project from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabProject {
    pub id: i64,
    pub name: String,
    pub path_with_namespace: String,
    pub created_at: Option<String>,
}

/// GitLab user from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub id: i64,
    pub username: String,
}

/// GitLab merge request from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabMergeRequest {
    pub id: i64,
    pub iid: i64,
    pub project_id: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub web_url: String,
    pub created_at: String,
    pub updated_at: String,
    pub merged_at: Option<String>,
    pub author: GitLabUser,
}

/// GitLab note from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabNote {
    pub id: i64,
    pub created_at: String,
    /// Generated by GitLab itself (state changes, pushes, ...).
    pub system: bool,
}

/// A single approval with the time it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabApprovalEvent {
    pub created_at: String,
}

/// Response from the MR approvals endpoint.
#[derive(Debug, Clone, Deserialize)]
struct MergeRequestApprovals {
    #[serde(default)]
    approved_by: Vec<ApprovedBy>,
}

/// User who approved an MR.
#[derive(Debug, Clone, Deserialize)]
struct ApprovedBy {
    #[serde(default)]
    approved_at: Option<String>,
}

impl GitLabClient {
    /// Create a new GitLab client.
    pub fn new(config: GitLabClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&config.token)
            .map_err(|_| AppError::authentication("Invalid token format"))?;
        headers.insert("PRIVATE-TOKEN", token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the full URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Parse pagination headers from response.
    ///
    /// A missing `x-total-pages` (GitLab omits it above 10k rows) parses as 0.
    fn parse_pagination(response: &Response) -> PaginationInfo {
        let headers = response.headers();

        let get_header = |name: &str| -> Option<u32> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        };

        PaginationInfo {
            page: get_header("x-page").unwrap_or(1),
            per_page: get_header("x-per-page").unwrap_or(20),
            total_pages: get_header("x-total-pages").unwrap_or(0),
            total: get_header("x-total"),
        }
    }

    /// Send a request, retrying timeouts, connection failures and 5xx
    /// responses up to `max_retries` times with a fixed delay.
    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<Response, AppError> {
        let mut attempt = 0u32;

        loop {
            let req = request
                .try_clone()
                .ok_or_else(|| AppError::internal("Request cannot be retried"))?;

            match req.send().await {
                Ok(response)
                    if response.status().is_server_error() && attempt < self.config.max_retries =>
                {
                    log::warn!(
                        "GET {} returned {}, retrying ({}/{})",
                        endpoint,
                        response.status(),
                        attempt + 1,
                        self.config.max_retries
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.config.max_retries => {
                    log::warn!(
                        "GET {} failed: {}, retrying ({}/{})",
                        endpoint,
                        e,
                        attempt + 1,
                        self.config.max_retries
                    );
                }
                Err(e) => return Err(e.into()),
            }

            attempt += 1;
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::authentication(
                "GitLab token expired or revoked",
            ));
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let body_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                // GitLab returns errors as {"message": "..."} or {"error": "..."}
                v.get("message").or_else(|| v.get("error")).map(|m| match m.as_str() {
                    Some(s) => s.to_string(),
                    None => m.to_string(),
                })
            });

        let message = match (status, body_message) {
            (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
            (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
            (_, Some(msg)) => msg,
            _ => format!("Request failed ({}): {}", status_code, body),
        };

        Err(AppError::gitlab_api_full(message, status_code, endpoint))
    }

    /// Make a GET request for one page of a collection.
    async fn get_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<T>, AppError> {
        let request = self
            .client
            .get(self.api_url(endpoint))
            .query(query)
            .query(&[("page", page), ("per_page", per_page)]);

        let response = self.send(request, endpoint).await?;
        let pagination = Self::parse_pagination(&response);
        let data = self.handle_response::<Vec<T>>(response, endpoint).await?;

        Ok(PaginatedResponse { data, pagination })
    }

    /// Make a plain GET request.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let request = self.client.get(self.api_url(endpoint)).query(query);
        let response = self.send(request, endpoint).await?;
        self.handle_response(response, endpoint).await
    }
}

#[async_trait]
impl MergeRequestSource for GitLabClient {
    async fn list_groups(&self, search: &str) -> Result<Vec<GitLabGroup>, AppError> {
        self.get_json("/groups", &[("search", search.to_string())])
            .await
    }

    async fn list_group_projects(&self, group_id: i64) -> Result<Vec<GitLabProject>, AppError> {
        let endpoint = format!("/groups/{}/projects", group_id);
        let query = [
            ("include_subgroups", "true".to_string()),
            ("archived", "false".to_string()),
        ];
        let (endpoint, query) = (endpoint.as_str(), &query[..]);

        Ok(pagination::fetch_all_pages(endpoint, PROJECTS_PER_PAGE, move |page| {
            self.get_page(endpoint, query, page, PROJECTS_PER_PAGE)
        })
        .await)
    }

    async fn get_project(&self, id_or_path: &str) -> Result<GitLabProject, AppError> {
        let endpoint = format!("/projects/{}", urlencoding::encode(id_or_path));
        self.get_json(&endpoint, &[]).await
    }

    async fn list_merge_requests(
        &self,
        project_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<GitLabMergeRequest>, AppError> {
        let endpoint = format!("/projects/{}/merge_requests", project_id);
        let query = [
            ("state", "all".to_string()),
            ("order_by", "created_at".to_string()),
            ("sort", "asc".to_string()),
        ];
        self.get_page(&endpoint, &query, page, per_page).await
    }

    async fn list_notes(
        &self,
        project_id: i64,
        mr_iid: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<GitLabNote>, AppError> {
        let endpoint = format!("/projects/{}/merge_requests/{}/notes", project_id, mr_iid);
        let query = [
            ("order_by", "created_at".to_string()),
            ("sort", "asc".to_string()),
        ];
        self.get_page(&endpoint, &query, page, per_page).await
    }

    async fn list_approval_events(
        &self,
        project_id: i64,
        mr_iid: i64,
    ) -> Result<Vec<GitLabApprovalEvent>, AppError> {
        let endpoint = format!("/projects/{}/merge_requests/{}/approvals", project_id, mr_iid);

        match self.get_json::<MergeRequestApprovals>(&endpoint, &[]).await {
            Ok(approvals) => Ok(approval_events(approvals)),
            Err(AppError::GitLabApi {
                status_code: Some(404),
                ..
            }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Keep approvals that carry a timestamp.
fn approval_events(approvals: MergeRequestApprovals) -> Vec<GitLabApprovalEvent> {
    approvals
        .approved_by
        .into_iter()
        .filter_map(|a| a.approved_at)
        .map(|created_at| GitLabApprovalEvent { created_at })
        .collect()
}
