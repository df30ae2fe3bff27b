//! Blob host content API client
//!
//! Endpoints used (all scoped to one repository and branch):
//! ```text
//! GET    {api}/repos/{owner}/{repo}/contents/{path}?ref={branch}   object or directory listing
//! PUT    {api}/repos/{owner}/{repo}/contents/{path}                create/update (base64 body, sha)
//! DELETE {api}/repos/{owner}/{repo}/contents/{path}                delete (sha)
//! GET    {api}/repos/{owner}/{repo}/git/blobs/{sha}                content the host omits inline
//! GET    {api}/repos/{owner}/{repo}                                repository metadata
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use gvault_core::{EntryKind, ObjectSummary, RemoteObject, VaultError, VaultResult};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{check_size, normalize_path, ObjectStore, WriteCondition};

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Everything needed to reach one repository/branch, minus the credential.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub timeout: Duration,
    pub max_object_bytes: u64,
    pub user_agent: String,
}

/// [`ObjectStore`] backed by the host's content API.
pub struct ContentsClient {
    http: reqwest::Client,
    api_url: Url,
    owner: String,
    repo: String,
    branch: String,
    token: SecretString,
    max_object_bytes: u64,
}

impl std::fmt::Debug for ContentsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentsClient")
            .field("api_url", &self.api_url.as_str())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Dir(Vec<ContentEntry>),
    File(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: ContentEntry,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// Repository metadata, as far as gvault cares.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub permissions: Option<RepoPermissions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoPermissions {
    #[serde(default)]
    pub pull: bool,
    #[serde(default)]
    pub push: bool,
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// Map a non-success HTTP status to the error taxonomy.
///
/// `write` marks PUT/DELETE, where the host reports a stale or missing
/// `sha` as 409 or 422. Other 422s on writes are validation failures
/// (bad encoding, invalid path) and stay [`VaultError::Remote`].
pub(crate) fn classify_status(status: u16, path: &str, message: &str, write: bool) -> VaultError {
    match status {
        401 | 403 => VaultError::Authorization(format!("{path}: {message}")),
        404 => VaultError::NotFound(path.to_string()),
        409 => VaultError::conflict(path, message),
        422 if write && mentions_revision(message) => VaultError::conflict(path, message),
        408 | 429 | 500..=599 => VaultError::Transient(format!("{path}: HTTP {status}: {message}")),
        _ => VaultError::Remote {
            status,
            message: format!("{path}: {message}"),
        },
    }
}

fn mentions_revision(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("sha") || message.contains("does not match")
}

fn transport_error(what: &str, path: &str, e: reqwest::Error) -> VaultError {
    if e.is_timeout() {
        VaultError::Transient(format!("{what} {path}: request timed out"))
    } else {
        VaultError::Transient(format!("{what} {path}: {e}"))
    }
}

async fn error_from_response(resp: Response, path: &str, write: bool) -> VaultError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                body
            }
        });
    classify_status(status.as_u16(), path, &message, write)
}

fn decode_base64(path: &str, encoded: &str) -> VaultResult<Vec<u8>> {
    // The host wraps base64 payloads at 60 columns
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    B64.decode(compact.as_bytes())
        .map_err(|e| VaultError::Format(format!("{path}: invalid base64 content: {e}")))
}

fn entry_kind(kind: &str) -> Option<EntryKind> {
    match kind {
        "file" => Some(EntryKind::File),
        "dir" => Some(EntryKind::Dir),
        _ => None,
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

impl ContentsClient {
    pub fn new(settings: ClientSettings, token: SecretString) -> VaultResult<Self> {
        let api_url = Url::parse(&settings.api_url)
            .map_err(|e| VaultError::Config(format!("invalid api_url {}: {e}", settings.api_url)))?;
        if api_url.cannot_be_a_base() {
            return Err(VaultError::Config(format!(
                "api_url {} cannot be used as a base URL",
                settings.api_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| VaultError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url,
            owner: settings.owner,
            repo: settings.repo,
            branch: settings.branch,
            token,
            max_object_bytes: settings.max_object_bytes,
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// `{api}/repos/{owner}/{repo}` followed by `segments`, each percent-encoded.
    fn repo_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty();
            segs.extend(["repos", self.owner.as_str(), self.repo.as_str()]);
            segs.extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn contents_url(&self, path: &str) -> Url {
        let path = normalize_path(path);
        self.repo_url(std::iter::once("contents").chain(path.split('/')))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
    }

    /// GET the contents endpoint; `Ok(None)` on 404.
    async fn fetch_contents(&self, path: &str) -> VaultResult<Option<ContentsResponse>> {
        let url = self.contents_url(path);
        debug!(path, "GET contents");
        let resp = self
            .request(Method::GET, url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| transport_error("get", path, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from_response(resp, path, false).await);
        }
        let parsed = resp
            .json::<ContentsResponse>()
            .await
            .map_err(|e| VaultError::Format(format!("{path}: unexpected contents response: {e}")))?;
        Ok(Some(parsed))
    }

    /// Content the host left out of the contents response (large files).
    async fn fetch_blob(&self, path: &str, sha: &str) -> VaultResult<Vec<u8>> {
        let url = self.repo_url(["git", "blobs", sha]);
        debug!(path, sha, "GET blob");
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| transport_error("get blob", path, e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp, path, false).await);
        }
        let blob = resp
            .json::<BlobResponse>()
            .await
            .map_err(|e| VaultError::Format(format!("{path}: unexpected blob response: {e}")))?;
        match blob.encoding.as_str() {
            "base64" => decode_base64(path, &blob.content),
            "utf-8" => Ok(blob.content.into_bytes()),
            other => Err(VaultError::Format(format!(
                "{path}: unsupported blob encoding {other}"
            ))),
        }
    }

    /// Current revision of `path`, without decoding its content.
    async fn current_revision(&self, path: &str) -> VaultResult<Option<String>> {
        match self.fetch_contents(path).await? {
            None => Ok(None),
            Some(ContentsResponse::File(entry)) => Ok(Some(entry.sha)),
            Some(ContentsResponse::Dir(_)) => Err(VaultError::Format(format!(
                "{path} is a directory"
            ))),
        }
    }

    /// Repository metadata; confirms the token can see the repository.
    pub async fn repository(&self) -> VaultResult<RepoInfo> {
        let label = format!("{}/{}", self.owner, self.repo);
        let resp = self
            .request(Method::GET, self.repo_url(std::iter::empty()))
            .send()
            .await
            .map_err(|e| transport_error("get repository", &label, e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp, &label, false).await);
        }
        resp.json::<RepoInfo>()
            .await
            .map_err(|e| VaultError::Format(format!("{label}: unexpected repository response: {e}")))
    }
}

#[async_trait]
impl ObjectStore for ContentsClient {
    async fn get(&self, path: &str) -> VaultResult<Option<RemoteObject>> {
        let entry = match self.fetch_contents(path).await? {
            None => return Ok(None),
            Some(ContentsResponse::Dir(_)) => {
                return Err(VaultError::Format(format!("{path} is a directory")))
            }
            Some(ContentsResponse::File(entry)) => entry,
        };
        if entry.kind != "file" {
            return Err(VaultError::Format(format!(
                "{path} is a {}, not a file",
                entry.kind
            )));
        }

        let inline = entry.content.as_deref().unwrap_or("");
        let content = match entry.encoding.as_deref() {
            Some("base64") if !inline.is_empty() || entry.size == 0 => {
                decode_base64(path, inline)?
            }
            _ if entry.size == 0 => Vec::new(),
            _ => self.fetch_blob(path, &entry.sha).await?,
        };

        debug!(path, sha = %entry.sha, bytes = content.len(), "fetched object");
        Ok(Some(RemoteObject::new(entry.path, entry.sha, content)))
    }

    async fn revision(&self, path: &str) -> VaultResult<Option<String>> {
        self.current_revision(path).await
    }

    async fn put(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
        condition: WriteCondition,
    ) -> VaultResult<RemoteObject> {
        let path = normalize_path(path);
        check_size(path, content.len() as u64, self.max_object_bytes)?;

        let sha = match &condition {
            WriteCondition::Matches(token) => Some(token.clone()),
            WriteCondition::CreateNew => None,
            WriteCondition::Overwrite => self.current_revision(path).await?,
        };

        let body = PutBody {
            message,
            content: B64.encode(&content),
            branch: &self.branch,
            sha: sha.as_deref(),
        };

        debug!(path, bytes = content.len(), condition = ?condition, "PUT contents");
        let resp = self
            .request(Method::PUT, self.contents_url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("put", path, e))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, path, true).await);
        }
        let written = resp
            .json::<WriteResponse>()
            .await
            .map_err(|e| VaultError::Format(format!("{path}: unexpected write response: {e}")))?;

        info!(path, sha = %written.content.sha, bytes = content.len(), "object written");
        Ok(RemoteObject::new(written.content.path, written.content.sha, content))
    }

    async fn delete(&self, path: &str, message: &str, expected_revision: &str) -> VaultResult<()> {
        let path = normalize_path(path);
        let body = DeleteBody {
            message,
            sha: expected_revision,
            branch: &self.branch,
        };

        debug!(path, sha = expected_revision, "DELETE contents");
        let resp = self
            .request(Method::DELETE, self.contents_url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("delete", path, e))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, path, true).await);
        }
        info!(path, "object deleted");
        Ok(())
    }

    async fn list(&self, dir: &str) -> VaultResult<Vec<ObjectSummary>> {
        let entries = match self.fetch_contents(dir).await? {
            None => return Ok(Vec::new()),
            Some(ContentsResponse::Dir(entries)) => entries,
            Some(ContentsResponse::File(_)) => {
                return Err(VaultError::Format(format!("{dir} is a file, not a directory")))
            }
        };

        let summaries = entries
            .into_iter()
            .filter_map(|e| match entry_kind(&e.kind) {
                Some(kind) => Some(ObjectSummary {
                    name: e.name,
                    path: e.path,
                    size: e.size,
                    revision: e.sha,
                    kind,
                }),
                None => {
                    debug!(path = %e.path, kind = %e.kind, "skipping unsupported entry");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(dir, entries = summaries.len(), "listed directory");
        Ok(summaries)
    }

    fn max_object_bytes(&self) -> u64 {
        self.max_object_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> ContentsClient {
        ContentsClient::new(
            ClientSettings {
                api_url: api_url.into(),
                owner: "acme".into(),
                repo: "vault".into(),
                branch: "main".into(),
                timeout: Duration::from_secs(5),
                max_object_bytes: 1024,
                user_agent: "gvault-test".into(),
            },
            SecretString::from("token"),
        )
        .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            classify_status(403, "p", "forbidden", false),
            VaultError::Authorization(_)
        ));
        assert!(matches!(
            classify_status(401, "p", "bad credentials", true),
            VaultError::Authorization(_)
        ));
        assert!(matches!(
            classify_status(404, "p", "", true),
            VaultError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(409, "p", "sha mismatch", true),
            VaultError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(422, "p", "sha wasn't supplied", true),
            VaultError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(422, "p", "invalid", false),
            VaultError::Remote { status: 422, .. }
        ));
        assert!(matches!(
            classify_status(422, "p", "content is not valid Base64", true),
            VaultError::Remote { status: 422, .. }
        ));
        assert!(matches!(
            classify_status(422, "p", "files/a.txt does not match abc123", true),
            VaultError::Conflict { .. }
        ));
        assert!(classify_status(502, "p", "bad gateway", false).is_transient());
        assert!(classify_status(429, "p", "slow down", false).is_transient());
        assert!(matches!(
            classify_status(400, "p", "bad", true),
            VaultError::Remote { status: 400, .. }
        ));
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let c = client("https://api.github.com");
        assert_eq!(
            c.contents_url("files/1_my report.pdf").as_str(),
            "https://api.github.com/repos/acme/vault/contents/files/1_my%20report.pdf"
        );
    }

    #[test]
    fn test_contents_url_keeps_api_prefix() {
        let c = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            c.contents_url("/metadata.json").as_str(),
            "https://ghe.example.com/api/v3/repos/acme/vault/contents/metadata.json"
        );
    }

    #[test]
    fn test_base64_with_line_breaks() {
        let decoded = decode_base64("p", "aGVs\nbG8=\n").unwrap();
        assert_eq!(decoded, b"hello");
        assert!(matches!(
            decode_base64("p", "!!!"),
            Err(VaultError::Format(_))
        ));
    }

    #[test]
    fn test_invalid_api_url_rejected() {
        let result = ContentsClient::new(
            ClientSettings {
                api_url: "not a url".into(),
                owner: "o".into(),
                repo: "r".into(),
                branch: "main".into(),
                timeout: Duration::from_secs(1),
                max_object_bytes: 1,
                user_agent: "ua".into(),
            },
            SecretString::from("t"),
        );
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[test]
    fn test_debug_hides_token() {
        let dbg = format!("{:?}", client("https://api.github.com"));
        assert!(!dbg.contains("token"));
        assert!(dbg.contains("acme"));
    }
}
