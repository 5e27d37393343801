//! [`ProtocolClient`] over the Matrix client-server HTTP API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mxbot_core::{
    ClientError, ClientResult, CreateRoomOptions, Credentials, ProfileInfo, ProtocolClient,
    RoomSection, RoomSnapshot, SyncBatch, SyncEvent, SyncOptions,
};
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, trace};
use urlencoding::encode;

use crate::rooms::RoomTable;
use crate::sync::SyncResponse;

const CLIENT_API: &str = "/_matrix/client/v3";
const MEDIA_API: &str = "/_matrix/media/v3";

/// Extra time granted on top of the long-poll timeout before a sync request
/// counts as failed.
const SYNC_GRACE: Duration = Duration::from_secs(30);

fn transport_error(err: reqwest::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

#[derive(Deserialize)]
struct MatrixErrorBody {
    errcode: String,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct UserIdResponse {
    user_id: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    user_id: String,
    access_token: String,
}

#[derive(Deserialize)]
struct EventIdResponse {
    event_id: String,
}

#[derive(Deserialize)]
struct RoomIdResponse {
    room_id: String,
}

#[derive(Deserialize)]
struct JoinedRoomsResponse {
    joined_rooms: Vec<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    content_uri: String,
}

/// HTTP Matrix client.
///
/// Holds the session (access token, user id), the sync cursor, and the live
/// room table. All state sits behind `parking_lot` locks that are never held
/// across an await.
pub struct HttpClient {
    http: Client,
    homeserver: String,
    access_token: RwLock<Option<String>>,
    user_id: RwLock<Option<String>>,
    since: RwLock<Option<String>>,
    rooms: RwLock<RoomTable>,
}

impl HttpClient {
    /// Creates a client for `homeserver` (scheme included, no trailing slash needed).
    pub fn new(homeserver: impl Into<String>, request_timeout: Duration) -> ClientResult<Self> {
        let http = ClientBuilder::new()
            .timeout(request_timeout)
            .build()
            .map_err(transport_error)?;
        let homeserver = homeserver.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            homeserver,
            access_token: RwLock::new(None),
            user_id: RwLock::new(None),
            since: RwLock::new(None),
            rooms: RwLock::new(RoomTable::new()),
        })
    }

    pub fn homeserver(&self) -> &str {
        &self.homeserver
    }

    /// The sync cursor of the last successful sync.
    pub fn since(&self) -> Option<String> {
        self.since.read().clone()
    }

    fn url(&self, api: &str, path: &str) -> String {
        format!("{}{api}{path}", self.homeserver)
    }

    fn request(&self, method: Method, url: &str) -> ClientResult<RequestBuilder> {
        let token = self.access_token.read().clone().ok_or(ClientError::NotLoggedIn)?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<MatrixErrorBody>(&body) {
                return Err(ClientError::api(error.errcode, error.error));
            }
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<T> {
        let url = self.url(CLIENT_API, path);
        trace!(method = %method, url = %url, "Matrix request");
        let mut request = self.request(method, &url)?;
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(transport_error)?;
        Self::read_json(response).await
    }

    fn room_path(room_id: &str, rest: &str) -> String {
        format!("/rooms/{}{rest}", encode(room_id))
    }

    fn events_from(&self, response: &SyncResponse) -> Vec<SyncEvent> {
        let rooms = &response.rooms;
        let mut events = Vec::new();
        for (room_id, room) in &rooms.join {
            events.extend(
                room.timeline
                    .events
                    .iter()
                    .map(|e| SyncEvent::new(room_id.clone(), RoomSection::Joined, e.clone())),
            );
        }
        for (room_id, room) in &rooms.invite {
            events.extend(
                room.invite_state
                    .events
                    .iter()
                    .map(|e| SyncEvent::new(room_id.clone(), RoomSection::Invited, e.clone())),
            );
        }
        for (room_id, room) in &rooms.leave {
            events.extend(
                room.timeline
                    .events
                    .iter()
                    .map(|e| SyncEvent::new(room_id.clone(), RoomSection::Left, e.clone())),
            );
        }
        events
    }
}

#[async_trait]
impl ProtocolClient for HttpClient {
    fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    async fn login(&self, credentials: &Credentials) -> ClientResult<String> {
        match credentials {
            Credentials::AccessToken(token) => {
                *self.access_token.write() = Some(token.clone());
                self.whoami().await
            }
            Credentials::Password {
                user,
                password,
                device_name,
            } => {
                let body = json!({
                    "type": "m.login.password",
                    "identifier": { "type": "m.id.user", "user": user },
                    "password": password,
                    "initial_device_display_name": device_name,
                });
                let url = self.url(CLIENT_API, "/login");
                let response = self
                    .http
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let login: LoginResponse = Self::read_json(response).await?;
                info!(user_id = %login.user_id, "Logged in with password");
                *self.access_token.write() = Some(login.access_token);
                *self.user_id.write() = Some(login.user_id.clone());
                Ok(login.user_id)
            }
        }
    }

    async fn whoami(&self) -> ClientResult<String> {
        let whoami: UserIdResponse = self
            .send_json(Method::GET, "/account/whoami", None)
            .await?;
        *self.user_id.write() = Some(whoami.user_id.clone());
        Ok(whoami.user_id)
    }

    async fn sync(&self, options: SyncOptions) -> ClientResult<SyncBatch> {
        let mut query = vec![format!("full_state={}", options.full_state)];
        if let Some(timeout) = options.timeout {
            query.push(format!("timeout={}", timeout.as_millis()));
        }
        if let Some(since) = self.since() {
            query.push(format!("since={}", encode(&since)));
        }
        let url = format!("{}?{}", self.url(CLIENT_API, "/sync"), query.join("&"));

        let mut request = self.request(Method::GET, &url)?;
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout + SYNC_GRACE);
        }
        let response = request.send().await.map_err(transport_error)?;
        let response: SyncResponse = Self::read_json(response).await?;

        self.rooms.write().apply(&response.rooms);
        *self.since.write() = Some(response.next_batch.clone());

        let events = self.events_from(&response);
        debug!(
            next_batch = %response.next_batch,
            events = events.len(),
            "Sync completed"
        );
        Ok(SyncBatch {
            next_batch: response.next_batch,
            events,
        })
    }

    async fn room_send(&self, room_id: &str, event_type: &str, content: Value) -> ClientResult<String> {
        let txn_id = uuid::Uuid::new_v4().to_string();
        let path = Self::room_path(
            room_id,
            &format!("/send/{}/{}", encode(event_type), encode(&txn_id)),
        );
        let response: EventIdResponse = self.send_json(Method::PUT, &path, Some(content)).await?;
        Ok(response.event_id)
    }

    async fn room_get_event(&self, room_id: &str, event_id: &str) -> ClientResult<Value> {
        let path = Self::room_path(room_id, &format!("/event/{}", encode(event_id)));
        self.send_json(Method::GET, &path, None).await
    }

    async fn get_profile(&self, user_id: &str) -> ClientResult<ProfileInfo> {
        let path = format!("/profile/{}", encode(user_id));
        self.send_json(Method::GET, &path, None).await
    }

    async fn join(&self, room: &str) -> ClientResult<String> {
        let path = format!("/join/{}", encode(room));
        let response: RoomIdResponse = self.send_json(Method::POST, &path, Some(json!({}))).await?;
        info!(room_id = %response.room_id, "Joined room");
        Ok(response.room_id)
    }

    async fn room_leave(&self, room_id: &str) -> ClientResult<()> {
        let path = Self::room_path(room_id, "/leave");
        let _: Value = self.send_json(Method::POST, &path, Some(json!({}))).await?;
        self.rooms.write().remove(room_id);
        Ok(())
    }

    async fn room_forget(&self, room_id: &str) -> ClientResult<()> {
        let path = Self::room_path(room_id, "/forget");
        let _: Value = self.send_json(Method::POST, &path, Some(json!({}))).await?;
        self.rooms.write().remove(room_id);
        Ok(())
    }

    async fn room_invite(&self, room_id: &str, user_id: &str) -> ClientResult<()> {
        let path = Self::room_path(room_id, "/invite");
        let _: Value = self
            .send_json(Method::POST, &path, Some(json!({ "user_id": user_id })))
            .await?;
        Ok(())
    }

    async fn room_create(&self, options: CreateRoomOptions) -> ClientResult<String> {
        let body = serde_json::to_value(&options)?;
        let response: RoomIdResponse = self.send_json(Method::POST, "/createRoom", Some(body)).await?;
        Ok(response.room_id)
    }

    async fn joined_rooms(&self) -> ClientResult<Vec<String>> {
        let response: JoinedRoomsResponse = self.send_json(Method::GET, "/joined_rooms", None).await?;
        Ok(response.joined_rooms)
    }

    async fn upload(&self, data: Vec<u8>, content_type: &str, filename: &str) -> ClientResult<String> {
        let url = format!(
            "{}?filename={}",
            self.url(MEDIA_API, "/upload"),
            encode(filename)
        );
        let response = self
            .request(Method::POST, &url)?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(transport_error)?;
        let upload: UploadResponse = Self::read_json(response).await?;
        Ok(upload.content_uri)
    }

    fn room(&self, room_id: &str) -> Option<Arc<RoomSnapshot>> {
        self.rooms.read().get(room_id)
    }

    fn rooms(&self) -> Vec<Arc<RoomSnapshot>> {
        self.rooms.read().snapshots()
    }

    fn knows_room(&self, room_id: &str) -> bool {
        self.rooms.read().knows(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new("https://matrix.example.org/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn homeserver_loses_trailing_slash() {
        let client = client();
        assert_eq!(client.homeserver(), "https://matrix.example.org");
        assert_eq!(
            client.url(CLIENT_API, "/sync"),
            "https://matrix.example.org/_matrix/client/v3/sync"
        );
    }

    #[test]
    fn room_paths_are_encoded() {
        assert_eq!(
            HttpClient::room_path("!abc:example.org", "/leave"),
            "/rooms/%21abc%3Aexample.org/leave"
        );
    }

    #[test]
    fn requests_need_a_session() {
        let client = client();
        assert!(matches!(
            client.request(Method::GET, "https://x"),
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[test]
    fn sync_events_keep_their_section() {
        let response: SyncResponse = serde_json::from_value(json!({
            "next_batch": "s9",
            "rooms": {
                "join": { "!j:x": { "timeline": { "events": [{ "type": "m.room.message" }] } } },
                "invite": { "!i:x": { "invite_state": { "events": [{ "type": "m.room.member" }] } } },
                "leave": { "!l:x": { "timeline": { "events": [{ "type": "m.room.member" }] } } }
            }
        }))
        .unwrap();

        let events = client().events_from(&response);
        assert_eq!(events.len(), 3);
        let section_of = |room: &str| events.iter().find(|e| e.room_id == room).map(|e| e.section);
        assert_eq!(section_of("!j:x"), Some(RoomSection::Joined));
        assert_eq!(section_of("!i:x"), Some(RoomSection::Invited));
        assert_eq!(section_of("!l:x"), Some(RoomSection::Left));
    }

    #[test]
    fn empty_table_knows_nothing() {
        let client = client();
        assert!(client.room("!r:x").is_none());
        assert!(client.rooms().is_empty());
        assert!(!client.knows_room("!r:x"));
        assert!(client.user_id().is_none());
    }
}
