use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::config::ApiSettings;
use crate::error::{Result, ScreepsError};
use crate::http::{perform_screeps_request, shared_http_client, ScreepsRequest, ScreepsResponse};
use crate::objects::GameObject;

const ROOM_TERRAIN_ENDPOINT: &str = "/api/game/room-terrain";
const ROOM_OBJECTS_ENDPOINT: &str = "/api/game/room-objects";
const ROOM_STATUS_ENDPOINT: &str = "/api/game/room-status";
const WORLD_SIZE_ENDPOINT: &str = "/api/game/world-size";
const SIGNIN_ENDPOINT: &str = "/api/auth/signin";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TerrainEntry {
    pub terrain: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TerrainResponse {
    #[serde(default)]
    pub terrain: Vec<TerrainEntry>,
}

impl TerrainResponse {
    pub fn encoded(&self) -> Option<&str> {
        self.terrain.first().map(|entry| entry.terrain.as_str())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ObjectsResponse {
    #[serde(default)]
    pub objects: Option<Vec<GameObject>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoomStatusResponse {
    #[serde(default)]
    pub ok: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct WorldSizeResponse {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize, Default)]
struct SigninResponse {
    #[serde(default)]
    ok: Option<i64>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// The game server endpoints the downloader consumes.
#[async_trait]
pub trait MapApi: Send + Sync {
    async fn room_terrain(&self, shard: &str, room: &str) -> Result<TerrainResponse>;
    async fn room_objects(&self, shard: &str, room: &str) -> Result<ObjectsResponse>;
    async fn room_status(&self, shard: &str, room: &str) -> Result<RoomStatusResponse>;
    async fn world_size(&self, shard: &str) -> Result<WorldSizeResponse>;
}

pub struct ScreepsApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    username: Option<String>,
}

impl ScreepsApi {
    pub fn new(
        base_url: String,
        token: Option<String>,
        username: Option<String>,
    ) -> Result<Self> {
        Ok(Self { client: shared_http_client()?.clone(), base_url, token, username })
    }

    /// Builds a client from settings, signing in first when only a password is available.
    pub async fn connect(settings: &ApiSettings) -> Result<Self> {
        let mut api = Self::new(
            settings.base_url.clone(),
            settings.token.clone(),
            settings.username.clone(),
        )?;
        if api.token.is_none() {
            if let (Some(username), Some(password)) =
                (settings.username.as_deref(), settings.password.as_deref())
            {
                api.token = Some(api.signin(username, password).await?);
                info!(username, "Signed in");
            }
        }
        Ok(api)
    }

    async fn signin(&self, username: &str, password: &str) -> Result<String> {
        let request = ScreepsRequest::post(
            &self.base_url,
            SIGNIN_ENDPOINT,
            json!({ "email": username, "password": password }),
        );
        let response = perform_screeps_request(&self.client, request).await?;
        signin_token(response)
    }

    fn room_query(shard: &str, room: &str) -> HashMap<String, Value> {
        HashMap::from([
            ("room".to_string(), Value::String(room.to_string())),
            ("shard".to_string(), Value::String(shard.to_string())),
        ])
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: HashMap<String, Value>,
    ) -> Result<T> {
        let request = ScreepsRequest::get(&self.base_url, endpoint)
            .with_query(query)
            .with_auth(self.token.as_deref(), self.username.as_deref());
        let response = perform_screeps_request(&self.client, request).await?;
        decode_response(response)
    }
}

/// Successful bodies and bodies carrying a server `error` field are decoded;
/// any other non-2xx response is an API error.
fn decode_response<T: DeserializeOwned>(response: ScreepsResponse) -> Result<T> {
    if !response.ok && response.payload_error().is_none() {
        return Err(ScreepsError::Api {
            status: response.status,
            message: response.data.to_string(),
        });
    }
    serde_json::from_value(response.data)
        .map_err(|error| ScreepsError::Parse(format!("{}: {}", response.url, error)))
}

/// Sign-in succeeds only with `ok: 1` and a non-blank token. Anything else,
/// including a body that is not JSON, is an auth failure.
fn signin_token(response: ScreepsResponse) -> Result<String> {
    let signin: SigninResponse = serde_json::from_value(response.data).unwrap_or_default();
    match (signin.ok, signin.token) {
        (Some(1), Some(token)) if !token.trim().is_empty() => Ok(token),
        _ => Err(ScreepsError::Auth(
            signin
                .error
                .unwrap_or_else(|| format!("signin returned status {}", response.status)),
        )),
    }
}

#[async_trait]
impl MapApi for ScreepsApi {
    async fn room_terrain(&self, shard: &str, room: &str) -> Result<TerrainResponse> {
        let mut query = Self::room_query(shard, room);
        query.insert("encoded".to_string(), json!(1));
        self.get_json(ROOM_TERRAIN_ENDPOINT, query).await
    }

    async fn room_objects(&self, shard: &str, room: &str) -> Result<ObjectsResponse> {
        self.get_json(ROOM_OBJECTS_ENDPOINT, Self::room_query(shard, room)).await
    }

    async fn room_status(&self, shard: &str, room: &str) -> Result<RoomStatusResponse> {
        self.get_json(ROOM_STATUS_ENDPOINT, Self::room_query(shard, room)).await
    }

    async fn world_size(&self, shard: &str) -> Result<WorldSizeResponse> {
        let query = HashMap::from([("shard".to_string(), Value::String(shard.to_string()))]);
        self.get_json(WORLD_SIZE_ENDPOINT, query).await
    }
}
