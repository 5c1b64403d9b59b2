//! Client for the OnLinex REST API: accounts, rooms and AI conversations.
//!
//! Every call that needs a session takes the [`SessionCredential`] and sends
//! it as an `Authorization` header. A 401 on such a call means the session
//! is gone and surfaces as [`ApiError::Unauthorized`].

pub mod error;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionCredential;

pub use error::ApiError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct TemporaryGrant {
    pub username: Option<String>,
    pub expires_at: Option<String>,
    pub credential: SessionCredential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub code: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub capacity: u32,
    pub language: String,
    pub is_public: bool,
}

impl CreateRoomRequest {
    /// Same defaults the backend applies: two seats, English, public.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 2,
            language: "en".into(),
            is_public: true,
        }
    }
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    password: &'a str,
    confirm_password: &'a str,
}

#[derive(Serialize)]
struct TemporaryBody<'a> {
    temp_username: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        let detail = self.detail.and_then(|detail| match detail {
            Value::Null => None,
            Value::String(text) => Some(text),
            other => Some(other.to_string()),
        });
        detail.or(self.message)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TemporaryTokenBody {
    #[serde(default)]
    temp_username: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RoomBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationBody {
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Clone, Copy)]
enum Access {
    Anonymous,
    Session,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ApiError::NotConfigured);
        }
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder, credential: &SessionCredential) -> RequestBuilder {
        request.header(AUTHORIZATION, credential.authorization_header())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<SessionCredential, ApiError> {
        let response = self
            .http
            .post(self.url("login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let body: TokenBody = read(response, Access::Anonymous, "could not log in").await?;
        tracing::info!(target: "onlinex::api", username, "logged in");
        token_credential(body)
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<SessionCredential, ApiError> {
        let response = self
            .http
            .post(self.url("register"))
            .json(&RegisterBody {
                username,
                password,
                confirm_password,
            })
            .send()
            .await?;
        let body: TokenBody = read(response, Access::Anonymous, "could not register").await?;
        tracing::info!(target: "onlinex::api", username, "registered");
        token_credential(body)
    }

    /// Create a throwaway user; the backend expires it after a few hours.
    pub async fn temporary_access(&self, temp_username: &str) -> Result<TemporaryGrant, ApiError> {
        let response = self
            .http
            .post(self.url("login/temporal/"))
            .json(&TemporaryBody { temp_username })
            .send()
            .await?;
        let body: TemporaryTokenBody = read(
            response,
            Access::Anonymous,
            "could not create a temporary user",
        )
        .await?;
        let token = present(body.token).ok_or(ApiError::MissingField("token"))?;
        let credential = SessionCredential::new(token, body.token_type.unwrap_or_default())?;
        tracing::info!(target: "onlinex::api", temp_username, "temporary access granted");
        Ok(TemporaryGrant {
            username: body.temp_username,
            expires_at: body.expires_at,
            credential,
        })
    }

    pub async fn create_room(
        &self,
        credential: &SessionCredential,
        request: &CreateRoomRequest,
    ) -> Result<RoomSummary, ApiError> {
        let response = self
            .authorized(self.http.post(self.url("rooms")), credential)
            .json(request)
            .send()
            .await?;
        let body: RoomBody = read(response, Access::Session, "could not create the room").await?;
        let code = present(body.code).ok_or(ApiError::MissingField("code"))?;
        tracing::info!(target: "onlinex::api", code = %code, "room created");
        Ok(RoomSummary {
            code,
            name: body.name,
        })
    }

    /// Register membership in a room. Returns the server's confirmation text.
    pub async fn join_room(
        &self,
        credential: &SessionCredential,
        room_code: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .authorized(self.http.get(self.url("rooms/join")), credential)
            .query(&[("room_code", room_code)])
            .send()
            .await?;
        let body: MessageBody = read(response, Access::Session, "could not join the room").await?;
        tracing::info!(target: "onlinex::api", room_code, "joined room");
        Ok(present(body.message).unwrap_or_else(|| format!("joined room {room_code}")))
    }

    pub async fn leave_room(
        &self,
        credential: &SessionCredential,
        room_code: &str,
    ) -> Result<String, ApiError> {
        let path = format!("rooms/{room_code}/leave");
        let response = self
            .authorized(self.http.post(self.url(&path)), credential)
            .send()
            .await?;
        let body: MessageBody = read(response, Access::Session, "could not leave the room").await?;
        tracing::info!(target: "onlinex::api", room_code, "left room");
        Ok(present(body.message).unwrap_or_else(|| format!("left room {room_code}")))
    }

    /// Start, or resume, the caller's conversation with `agent_name`.
    pub async fn start_conversation(
        &self,
        credential: &SessionCredential,
        agent_name: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .authorized(self.http.post(self.url("conversations")), credential)
            .query(&[("agent_name", agent_name)])
            .send()
            .await?;
        let body: ConversationBody = read(
            response,
            Access::Session,
            "could not start the conversation",
        )
        .await?;
        let conversation_id =
            present(body.conversation_id).ok_or(ApiError::MissingField("conversation_id"))?;
        tracing::info!(
            target: "onlinex::api",
            agent_name,
            conversation_id = %conversation_id,
            "conversation ready"
        );
        Ok(conversation_id)
    }
}

fn token_credential(body: TokenBody) -> Result<SessionCredential, ApiError> {
    let token = present(body.access_token).ok_or(ApiError::MissingField("access_token"))?;
    Ok(SessionCredential::new(token, body.token_type.unwrap_or_default())?)
}

/// Map a response to `T`, or to the error the backend described.
///
/// Bodies that are not JSON decode as `T::default()`, leaving the caller to
/// report the field it needed.
async fn read<T>(response: Response, access: Access, fallback: &str) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    let status = response.status();
    let bytes = response.bytes().await?;

    if status == StatusCode::UNAUTHORIZED && matches!(access, Access::Session) {
        tracing::warn!(target: "onlinex::api", "session rejected by api");
        return Err(ApiError::Unauthorized);
    }

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| fallback.to_string());
        tracing::debug!(target: "onlinex::api", %status, message = %message, "api call rejected");
        return Err(ApiError::Rejected { status, message });
    }

    Ok(serde_json::from_slice(&bytes).unwrap_or_default())
}
