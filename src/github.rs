use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{OwnerLogin, RepositoryRecord};
use crate::error::ViewerError;

pub type ArchiveStream = Box<dyn Read + Send>;

/// Outcome buckets of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    Ok,
    NoData,
    Undefined,
}

impl ResponseCode {
    pub fn code(self) -> u16 {
        match self {
            ResponseCode::Ok => 200,
            ResponseCode::NoData => 429,
            ResponseCode::Undefined => 430,
        }
    }
}

pub struct ApiResponse<T> {
    pub code: ResponseCode,
    pub data: Option<T>,
}

impl<T> fmt::Debug for ApiResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("code", &self.code)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: ResponseCode::Ok,
            data: Some(data),
        }
    }

    pub fn no_data() -> Self {
        Self {
            code: ResponseCode::NoData,
            data: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            code: ResponseCode::Undefined,
            data: None,
        }
    }

    /// The payload, only when the call succeeded.
    pub fn into_data(self) -> Option<T> {
        match self.code {
            ResponseCode::Ok => self.data,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteOwner {
    pub login: String,
    pub avatar_url: String,
}

/// One entry of `GET /users/{login}/repos`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteRepository {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: i64,
    pub owner: RemoteOwner,
}

impl From<RemoteRepository> for RepositoryRecord {
    fn from(value: RemoteRepository) -> Self {
        Self {
            id: value.id,
            owner_login: value.owner.login,
            owner_avatar_url: value.owner.avatar_url,
            project_name: value.name,
            project_url: value.html_url,
            project_description: value.description.unwrap_or_default(),
            project_stars_count: value.stargazers_count,
            local_path: None,
        }
    }
}

pub trait GithubClient: Send + Sync {
    /// Lists a user's repositories. Only connection failures surface as
    /// errors; every other failure is folded into the response code.
    fn load_user_repositories(
        &self,
        login: &OwnerLogin,
    ) -> Result<ApiResponse<Vec<RemoteRepository>>, ViewerError>;

    fn download_repository(&self, owner: &str, project: &str) -> ApiResponse<ArchiveStream>;
}

#[derive(Clone)]
pub struct GithubHttpClient {
    client: Client,
    download_client: Client,
    base_url: String,
}

impl GithubHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ViewerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("github-viewer/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ViewerError::GithubHttp(err.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(timeout)
            .build()
            .map_err(|err| ViewerError::GithubHttp(err.to_string()))?;
        // Archives can be large; only bound the connection phase.
        let download_client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(None)
            .build()
            .map_err(|err| ViewerError::GithubHttp(err.to_string()))?;

        Ok(Self {
            client,
            download_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn repositories_url(&self, login: &OwnerLogin) -> String {
        format!("{}/users/{}/repos?per_page=100", self.base_url, login.as_str())
    }

    pub fn zipball_url(&self, owner: &str, project: &str) -> String {
        format!("{}/repos/{}/{}/zipball", self.base_url, owner, project)
    }
}

impl GithubClient for GithubHttpClient {
    fn load_user_repositories(
        &self,
        login: &OwnerLogin,
    ) -> Result<ApiResponse<Vec<RemoteRepository>>, ViewerError> {
        let url = self.repositories_url(login);
        debug!(%url, "listing repositories");
        let response = match self.client.get(&url).send() {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!(error = %err, "repository listing timed out");
                return Ok(ApiResponse::failed());
            }
            Err(err) if err.is_connect() => return Err(ViewerError::Unreachable(err.to_string())),
            Err(err) => {
                warn!(error = %err, "repository listing failed");
                return Ok(ApiResponse::failed());
            }
        };

        if response.status() != StatusCode::OK {
            debug!(status = response.status().as_u16(), "no repositories returned");
            return Ok(ApiResponse::no_data());
        }

        match response.json::<Vec<RemoteRepository>>() {
            Ok(repositories) => Ok(ApiResponse::ok(repositories)),
            Err(err) => {
                warn!(error = %err, "undecodable repository listing");
                Ok(ApiResponse::failed())
            }
        }
    }

    fn download_repository(&self, owner: &str, project: &str) -> ApiResponse<ArchiveStream> {
        let url = self.zipball_url(owner, project);
        debug!(%url, "requesting archive");
        match self.download_client.get(&url).send() {
            Ok(response) if response.status().is_success() => {
                ApiResponse::ok(Box::new(response) as ArchiveStream)
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "archive request rejected");
                ApiResponse::failed()
            }
            Err(err) => {
                warn!(error = %err, "archive request failed");
                ApiResponse::failed()
            }
        }
    }
}
