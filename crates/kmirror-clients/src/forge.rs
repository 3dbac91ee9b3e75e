//! Boundary to a Gitea-style forge: repositories, files, commits, diffs.
//!
//! Requests carry `Authorization: token <token>`. Route builders here are
//! shared by every implementation so the URL layout lives in one place.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

const API_PREFIX: &str = "/api/v1";

// ── Wire types ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub auto_init: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
    #[serde(default)]
    pub committer: Option<CommitAuthor>,
    #[serde(default)]
    pub html_url: String,
}

/// Body of a file-creation request. `content` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub content: String,
    pub message: String,
}

impl CreateFileRequest {
    #[must_use]
    pub fn new(content: &[u8], message: impl Into<String>) -> Self {
        Self {
            content: encode_file_content(content),
            message: message.into(),
        }
    }
}

/// Standard padded base64, as forge file endpoints expect.
#[must_use]
pub fn encode_file_content(content: &[u8]) -> String {
    STANDARD.encode(content)
}

/// Who a new repository belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOwner {
    /// The authenticated user.
    CurrentUser,
    Org(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

// ── Routes ──────────────────────────────────────────

pub mod routes {
    use super::{Page, RepoOwner, API_PREFIX};

    #[must_use]
    pub fn create_repo(owner: &RepoOwner) -> String {
        match owner {
            RepoOwner::CurrentUser => format!("{API_PREFIX}/user/repos"),
            RepoOwner::Org(org) => format!("{API_PREFIX}/orgs/{org}/repos"),
        }
    }

    #[must_use]
    pub fn repo(owner: &str, repo: &str) -> String {
        format!("{API_PREFIX}/repos/{owner}/{repo}")
    }

    #[must_use]
    pub fn user_repos(username: &str, page: Page) -> String {
        format!(
            "{API_PREFIX}/users/{username}/repos?page={}&limit={}",
            page.page, page.limit
        )
    }

    #[must_use]
    pub fn file(owner: &str, repo: &str, path: &str) -> String {
        format!(
            "{API_PREFIX}/repos/{owner}/{repo}/contents/{}",
            path.trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn commits(owner: &str, repo: &str, branch: &str, page: Page) -> String {
        format!(
            "{API_PREFIX}/repos/{owner}/{repo}/commits?sha={branch}&page={}&limit={}",
            page.page, page.limit
        )
    }

    #[must_use]
    pub fn compare(owner: &str, repo: &str, base: &str, head: &str) -> String {
        format!("{API_PREFIX}/repos/{owner}/{repo}/compare/{base}...{head}")
    }
}

/// Value of the `Authorization` header for `token`.
#[must_use]
pub fn authorization(token: &str) -> String {
    format!("token {token}")
}

// ── Boundary ────────────────────────────────────────

#[async_trait]
pub trait ForgeClient: Send + Sync {
    async fn create_repo(
        &self,
        owner: &RepoOwner,
        request: &CreateRepoRequest,
    ) -> ClientResult<Repository>;

    /// Returns [`crate::ClientError::NotFound`] for an unknown repository.
    async fn get_repo(&self, owner: &str, repo: &str) -> ClientResult<Repository>;

    async fn delete_repo(&self, owner: &str, repo: &str) -> ClientResult<()>;

    async fn list_repos(&self, username: &str, page: Page) -> ClientResult<Vec<Repository>>;

    async fn create_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        request: &CreateFileRequest,
    ) -> ClientResult<()>;

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        page: Page,
    ) -> ClientResult<Vec<Commit>>;

    /// Unified diff between two refs, as text.
    async fn get_diff(&self, owner: &str, repo: &str, base: &str, head: &str)
        -> ClientResult<String>;
}
