//! REST listers for DBFS and Workspace
//!
//! Both namespaces are reached through the workspace REST API with a bearer
//! token:
//! - DBFS: `GET /api/2.0/dbfs/list` with a JSON body `{"path": ...}`
//! - Workspace: `GET /api/2.0/workspace/list?path=...`
//!
//! HTTP status codes are mapped onto [`ListError`] so the retry policy can
//! classify them; retries themselves happen one level up.

use crate::error::{ListError, ListResult};
use crate::listing::{DirectoryLister, ListEntry};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{trace, warn};

const DBFS_LIST_ENDPOINT: &str = "/api/2.0/dbfs/list";
const WORKSPACE_LIST_ENDPOINT: &str = "/api/2.0/workspace/list";

/// Error code returned in the body when a path does not exist
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// Shared HTTP client for one worker
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    /// Build a client for `workspace_url` with a per-request timeout
    pub fn new(workspace_url: &str, token: &str, timeout: Duration) -> ListResult<Self> {
        let base_url = normalize_base_url(workspace_url);
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("home-census/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ListError::Network {
                path: base_url.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
        })
    }

    /// Workspace base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

/// Ensure a scheme and strip trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Map a non-success HTTP status onto a listing error
pub fn classify_status(path: &str, status: u16, error_code: Option<&str>) -> ListError {
    let path = path.to_string();
    match status {
        404 => ListError::NotFound { path },
        400 if error_code == Some(RESOURCE_DOES_NOT_EXIST) => ListError::NotFound { path },
        401 => ListError::Unauthorized { path },
        403 => ListError::PermissionDenied { path },
        429 => ListError::RateLimited { path },
        500..=599 => ListError::Server { path, status },
        _ => ListError::Malformed {
            path,
            reason: match error_code {
                Some(code) => format!("HTTP {} ({})", status, code),
                None => format!("HTTP {}", status),
            },
        },
    }
}

fn transport_error(path: &str, error: reqwest::Error) -> ListError {
    if error.is_decode() {
        ListError::Malformed {
            path: path.into(),
            reason: error.to_string(),
        }
    } else {
        ListError::Network {
            path: path.into(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: Option<String>,
}

/// Turn a response into its decoded body or a classified error
fn decode<T: for<'de> Deserialize<'de>>(path: &str, response: Response) -> ListResult<T> {
    let status = response.status();
    if status == StatusCode::OK {
        return response.json::<T>().map_err(|e| transport_error(path, e));
    }

    let error_code = response
        .json::<ApiErrorBody>()
        .ok()
        .and_then(|body| body.error_code);
    Err(classify_status(path, status.as_u16(), error_code.as_deref()))
}

/// Probe a lister by listing `/`; only credential failures disqualify it
fn probe(lister: &mut dyn DirectoryLister) -> bool {
    match lister.list("/") {
        Ok(_) => true,
        Err(e) if e.is_auth_failure() => {
            warn!(strategy = lister.name(), error = %e, "Credentials rejected");
            false
        }
        Err(e @ ListError::Network { .. }) => {
            warn!(strategy = lister.name(), error = %e, "API unreachable");
            false
        }
        Err(_) => true,
    }
}

#[derive(Debug, Deserialize)]
struct DbfsListResponse {
    #[serde(default)]
    files: Vec<DbfsFileInfo>,
}

#[derive(Debug, Deserialize)]
struct DbfsFileInfo {
    path: String,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    file_size: u64,
}

/// DBFS listing through `/api/2.0/dbfs/list`
#[derive(Debug, Clone)]
pub struct DbfsRestLister {
    client: RestClient,
}

impl DbfsRestLister {
    /// Create a DBFS lister on top of `client`
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl DirectoryLister for DbfsRestLister {
    fn name(&self) -> &str {
        "dbfs-rest"
    }

    fn is_available(&mut self) -> bool {
        probe(self)
    }

    fn list(&mut self, path: &str) -> ListResult<Vec<ListEntry>> {
        trace!(path, "GET dbfs/list");
        let response = self
            .client
            .http
            .get(self.client.endpoint(DBFS_LIST_ENDPOINT))
            .bearer_auth(&self.client.token)
            .json(&serde_json::json!({ "path": path }))
            .send()
            .map_err(|e| transport_error(path, e))?;

        let body: DbfsListResponse = decode(path, response)?;
        Ok(body
            .files
            .into_iter()
            .map(|f| {
                if f.is_dir {
                    ListEntry::directory(f.path)
                } else {
                    ListEntry::file(f.path, Some(f.file_size))
                }
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct WorkspaceListResponse {
    #[serde(default)]
    objects: Vec<WorkspaceObject>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceObject {
    path: String,
    #[serde(default)]
    object_type: String,
}

impl WorkspaceObject {
    fn is_container(&self) -> bool {
        matches!(self.object_type.as_str(), "DIRECTORY" | "REPO")
    }
}

/// Workspace listing through `/api/2.0/workspace/list`
///
/// The protocol has no size field, so entries carry no size.
#[derive(Debug, Clone)]
pub struct WorkspaceRestLister {
    client: RestClient,
}

impl WorkspaceRestLister {
    /// Create a Workspace lister on top of `client`
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl DirectoryLister for WorkspaceRestLister {
    fn name(&self) -> &str {
        "workspace-rest"
    }

    fn is_available(&mut self) -> bool {
        probe(self)
    }

    fn list(&mut self, path: &str) -> ListResult<Vec<ListEntry>> {
        trace!(path, "GET workspace/list");
        let response = self
            .client
            .http
            .get(self.client.endpoint(WORKSPACE_LIST_ENDPOINT))
            .bearer_auth(&self.client.token)
            .query(&[("path", path)])
            .send()
            .map_err(|e| transport_error(path, e))?;

        let body: WorkspaceListResponse = decode(path, response)?;
        Ok(body
            .objects
            .into_iter()
            .map(|o| {
                if o.is_container() {
                    ListEntry::directory(o.path)
                } else {
                    ListEntry::file(o.path, None)
                }
            })
            .collect())
    }
}
