//! Revolt REST API client.
//!
//! Only the handful of endpoints the importer needs; requests are retried a
//! bounded number of times on rate limits and server errors.

pub mod types;

pub use types::{Category, Channel, ChannelType, Override, Permissions, Role, Server};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use reqwest::{Method, StatusCode};

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// The public Revolt API root.
pub const BASE_URL: &str = "https://api.revolt.chat";

/// How many times a single call is attempted before giving up.
const MAX_ATTEMPTS: u32 = 6;

pub type Result<T> = std::result::Result<T, Error>;

/// A thin client over the Revolt REST API.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl Client {
    /// Creates a client authenticating with a bot token.
    pub fn new(token: String) -> Result<Client> {
        Client::with_base_url(token, BASE_URL)
    }

    /// Creates a client against a custom API root, for self-hosted instances.
    pub fn with_base_url(token: String, base_url: &str) -> Result<Client> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("transplant/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Client {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fetches a server by id.
    pub async fn fetch_server(&self, server_id: &str) -> Result<Server> {
        self.get(&format!("/servers/{}", server_id)).await
    }

    /// Fetches a single channel by id.
    pub async fn fetch_channel(&self, channel_id: &str) -> Result<Channel> {
        self.get(&format!("/channels/{}", channel_id)).await
    }

    /// Resolves all of a server's channels.
    ///
    /// Revolt has no bulk channel listing, so each id on the server object is
    /// fetched individually. Failures on single channels are logged and
    /// skipped; the rest of the scan continues.
    pub async fn fetch_channels(&self, server: &Server) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(server.channels.len());

        for id in &server.channels {
            match self.fetch_channel(id).await {
                Ok(channel) => channels.push(channel),
                Err(err) => warn!("could not fetch channel {}: {}", id, err),
            }
        }

        channels
    }

    /// Creates a channel on a server.
    pub async fn create_channel(
        &self,
        server_id: &str,
        kind: ChannelType,
        name: &str,
        description: Option<&str>,
        nsfw: bool,
    ) -> Result<Channel> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
            name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
            nsfw: bool,
        }

        let kind = match kind {
            ChannelType::VoiceChannel => "Voice",
            _ => "Text",
        };

        self.post(
            &format!("/servers/{}/channels", server_id),
            &Body {
                kind,
                name,
                description,
                nsfw,
            },
        )
        .await
    }

    /// Deletes (closes) a channel.
    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/channels/{}", channel_id), None)
            .await
            .map(|_| ())
    }

    /// Creates a role on a server, returning its new id.
    pub async fn create_role(&self, server_id: &str, name: &str, rank: i64) -> Result<NewRole> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            rank: i64,
        }

        self.post(&format!("/servers/{}/roles", server_id), &Body { name, rank })
            .await
    }

    /// Edits a role's colour and hoist flag.
    pub async fn edit_role(
        &self,
        server_id: &str,
        role_id: &str,
        colour: Option<&str>,
        hoist: bool,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            colour: Option<&'a str>,
            hoist: bool,
        }

        self.request_json(
            Method::PATCH,
            &format!("/servers/{}/roles/{}", server_id, role_id),
            &Body { colour, hoist },
        )
        .await
        .map(|_| ())
    }

    /// Sets a role's server-level permissions.
    pub async fn set_role_permissions(
        &self,
        server_id: &str,
        role_id: &str,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<()> {
        self.request_json(
            Method::PUT,
            &format!("/servers/{}/permissions/{}", server_id, role_id),
            &PermissionsBody::pair(allow, deny),
        )
        .await
        .map(|_| ())
    }

    /// Sets the server's default (everyone) permissions.
    pub async fn set_default_permissions(&self, server_id: &str, allow: Permissions) -> Result<()> {
        #[derive(Serialize)]
        struct Body {
            permissions: u64,
        }

        self.request_json(
            Method::PUT,
            &format!("/servers/{}/permissions/default", server_id),
            &Body {
                permissions: allow.bits(),
            },
        )
        .await
        .map(|_| ())
    }

    /// Sets a role's permission override on a channel.
    pub async fn set_channel_role_permissions(
        &self,
        channel_id: &str,
        role_id: &str,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<()> {
        self.request_json(
            Method::PUT,
            &format!("/channels/{}/permissions/{}", channel_id, role_id),
            &PermissionsBody::pair(allow, deny),
        )
        .await
        .map(|_| ())
    }

    /// Sets the default (everyone) permission override on a channel.
    pub async fn set_channel_default_permissions(
        &self,
        channel_id: &str,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<()> {
        self.request_json(
            Method::PUT,
            &format!("/channels/{}/permissions/default", channel_id),
            &PermissionsBody::pair(allow, deny),
        )
        .await
        .map(|_| ())
    }

    /// Replaces the server's category list.
    pub async fn edit_categories(&self, server_id: &str, categories: &[Category]) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            categories: &'a [Category],
        }

        self.request_json(
            Method::PATCH,
            &format!("/servers/{}", server_id),
            &Body { categories },
        )
        .await
        .map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path, None).await?;

        response.json().await.map_err(Error::Http)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.request_json(Method::POST, path, body).await?;

        response.json().await.map_err(Error::Http)
    }

    async fn request_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let body = serde_json::to_string(body).map_err(Error::Encode)?;

        self.request(method, path, Some(body)).await
    }

    /// Sends a request, retrying on rate limits and server errors.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..MAX_ATTEMPTS {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header("x-bot-token", &self.token);

            if let Some(body) = &body {
                request = request
                    .header("Content-Type", "application/json")
                    .body(body.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                    warn!("{} {} failed ({}), retrying", method, path, err);
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                    continue;
                }
                Err(err) => return Err(Error::Http(err)),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after(response).await;
                warn!("rate limited on {} {}, waiting {:?}", method, path, retry_after);
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if status.is_server_error() && attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                continue;
            }

            if status.is_client_error() || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();

                return Err(Error::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }

        Err(Error::RetriesExhausted)
    }
}

/// Reads the `retry_after` hint out of a 429 body.
async fn retry_after(response: reqwest::Response) -> Duration {
    #[derive(Deserialize)]
    struct RateLimit {
        retry_after: f64,
    }

    let secs = response
        .json::<RateLimit>()
        .await
        .map(|r| r.retry_after)
        .unwrap_or(1.0);

    Duration::from_secs_f64(secs.max(0.25))
}

#[derive(Serialize)]
struct PermissionsBody {
    permissions: AllowDeny,
}

#[derive(Serialize)]
struct AllowDeny {
    allow: u64,
    deny: u64,
}

impl PermissionsBody {
    fn pair(allow: Permissions, deny: Permissions) -> PermissionsBody {
        PermissionsBody {
            permissions: AllowDeny {
                allow: allow.bits(),
                deny: deny.bits(),
            },
        }
    }
}

/// The response to a role creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub id: String,
    pub role: Role,
}

/// An error from the Revolt API.
#[derive(Debug)]
pub enum Error {
    /// A transport-level failure.
    Http(reqwest::Error),
    /// A request body failed to encode.
    Encode(serde_json::Error),
    /// A non-success response from the API.
    Api { status: u16, body: String },
    /// The call kept rate limiting past the attempt budget.
    RetriesExhausted,
}

impl Error {
    /// Whether the API rejected a channel creation for hitting the server's
    /// channel cap.
    pub fn is_too_many_channels(&self) -> bool {
        matches!(self, Error::Api { body, .. } if body.contains("TooManyChannels"))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Http(err) => Display::fmt(err, f),
            Error::Encode(err) => Display::fmt(err, f),
            Error::Api { status, body } => write!(f, "api error {}: {}", status, body),
            Error::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            Error::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error::Http(err)
    }
}
