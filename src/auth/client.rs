use reqwest::{Client as ReqwestClient, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;
use crate::error::Error;

/// Base URL of the editor REST API when none is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api/";

/// Envelope `code` signalling success.
const SUCCESS_CODE: i64 = 200;

/// Response envelope shared by every editor API endpoint.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    message: Option<String>,
    data: Option<T>,
}

#[non_exhaustive]
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub nickname: String,
}

impl RegisterRequest {
    #[must_use]
    pub fn new<U: Into<String>, P: Into<String>, N: Into<String>>(
        username: U,
        password: P,
        nickname: N,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            nickname: nickname.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'request> {
    username: &'request str,
    password: &'request str,
}

/// Payload of a successful login.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// Signed-in user as persisted by [`crate::auth::SessionContext`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub avatar: Option<String>,
}

impl From<&LoginData> for User {
    fn from(data: &LoginData) -> Self {
        Self {
            id: data.user_id,
            username: data.username.clone(),
            nickname: data
                .nickname
                .clone()
                .filter(|nickname| !nickname.is_empty())
                .unwrap_or_else(|| data.username.clone()),
            avatar: data.avatar.clone(),
        }
    }
}

/// HTTP client for the editor's account endpoints.
#[derive(Clone, Debug)]
pub struct Client {
    /// The [`Url`] against which `client` is making requests, always ending in `/`
    host: Url,
    client: ReqwestClient,
}

impl Default for Client {
    fn default() -> Self {
        Client::new(DEFAULT_API_BASE).expect("Client with default endpoint should succeed")
    }
}

impl Client {
    pub fn new(host: &str) -> Result<Self> {
        let mut host = Url::parse(host)?;
        if !host.path().ends_with('/') {
            let path = format!("{}/", host.path());
            host.set_path(&path);
        }

        Ok(Self {
            host,
            client: ReqwestClient::new(),
        })
    }

    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Creates an account. Succeeds only when the API answers with code 200.
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let _: Option<serde_json::Value> = self.post("auth/register", request).await?;
        Ok(())
    }

    /// Exchanges credentials for a token and the user's profile.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginData> {
        let path = "auth/login";
        self.post(path, &LoginRequest { username, password })
            .await?
            .ok_or_else(|| Error::status(SUCCESS_CODE, path.to_owned(), "missing login data"))
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, body), fields(code))
    )]
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let url = self.host.join(path)?;
        let response = self
            .client
            .request(Method::POST, url)
            .json(body)
            .send()
            .await?;

        let envelope: ApiResponse<T> = response.json().await?;

        #[cfg(feature = "tracing")]
        tracing::Span::current().record("code", envelope.code);

        if envelope.code != SUCCESS_CODE {
            let message = envelope
                .message
                .unwrap_or_else(|| "request failed".to_owned());

            #[cfg(feature = "tracing")]
            tracing::warn!(code = envelope.code, %path, %message, "API request failed");

            return Err(Error::status(envelope.code, path.to_owned(), message));
        }

        Ok(envelope.data)
    }
}
