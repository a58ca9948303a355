//! Admin and photographer read endpoints, authenticated with a bearer token.
//!
//! Staff photo listings use the same descriptor shape as match results, so a
//! [`StaffClient`] can feed the download orchestrator directly.

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use snapfind_core::{parse_photo_list, ApiBase, ApiError, EventId, PhotoDescriptor, PhotoSource};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::response::{self, NotFound};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Photographer,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Photographer => "photographer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "photographer" => Ok(Role::Photographer),
            other => Err(format!("unknown role {other:?} (expected admin or photographer)")),
        }
    }
}

/// One row of an event listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,
}

/// Accept dates as strings or as the array form some serializers emit.
fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

pub struct StaffClient {
    client: reqwest::Client,
    base: ApiBase,
    role: Role,
    token: Option<String>,
}

impl StaffClient {
    pub fn new(
        base: ApiBase,
        role: Role,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            role,
            token,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Events visible to this account.
    pub async fn events(&self) -> Result<Vec<EventSummary>, ApiError> {
        let url = self.base.endpoint(&format!("{}/events", self.role.prefix()));
        let resp = response::send(self.authed(self.client.get(&url)), NotFound::ServerError).await?;
        let body = response::body_bytes(resp).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("event list: {e}")))
    }

    /// Every photo uploaded to `event`.
    pub async fn event_photos(&self, event: &EventId) -> Result<Vec<PhotoDescriptor>, ApiError> {
        let url = self
            .base
            .endpoint(&format!("{}/events/{event}/photos", self.role.prefix()));
        let resp = response::send(self.authed(self.client.get(&url)), NotFound::ServerError).await?;
        let body = response::body_bytes(resp).await?;
        let photos = parse_photo_list(&body)?;
        tracing::info!(%event, role = %self.role, photos = photos.len(), "event photos listed");
        Ok(photos)
    }

    /// Ask the server to re-run face indexing for `event`. Admin only; returns
    /// the server's summary line.
    pub async fn reindex(&self, event: &EventId) -> Result<String, ApiError> {
        let url = self.base.endpoint(&format!("admin/events/{event}/reindex"));
        let resp =
            response::send(self.authed(self.client.post(&url)), NotFound::ServerError).await?;
        let text = response::body_text(resp).await?;
        tracing::info!(%event, result = %text.trim(), "reindex requested");
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl PhotoSource for StaffClient {
    fn base(&self) -> &ApiBase {
        &self.base
    }

    async fn fetch_photo(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let resp = response::send(self.authed(self.client.get(url)), NotFound::ServerError).await?;
        response::body_bytes(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::tests::serve_once;

    fn staff(base: ApiBase, role: Role) -> StaffClient {
        StaffClient::new(base, role, Some("t0ken".into()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_event_summary_accepts_array_dates() {
        let body = r#"[{"id":3,"name":"Spring Gala","date":[2026,5,1],"location":"Hall A","adminId":9,"status":"ACTIVE","createdAt":"2026-04-30T08:00:00"}]"#;
        let events: Vec<EventSummary> = serde_json::from_str(body).unwrap();
        assert_eq!(events[0].date.as_deref(), Some("[2026,5,1]"));
        assert_eq!(events[0].created_at.as_deref(), Some("2026-04-30T08:00:00"));
        assert_eq!(events[0].status.as_deref(), Some("ACTIVE"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("photographer".parse::<Role>(), Ok(Role::Photographer));
        assert!("guest".parse::<Role>().is_err());
    }

    #[tokio::test]
    async fn test_events_sends_bearer_token() {
        let (base, server) = serve_once(
            "200 OK",
            "application/json",
            r#"[{"id":1,"name":"Wedding","date":"2026-06-12","location":null,"status":"ACTIVE"}]"#,
        )
        .await;
        let events = staff(base, Role::Photographer).events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Wedding");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/photographer/events "));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer t0ken"));
    }

    #[tokio::test]
    async fn test_event_photos_validated() {
        let (base, _server) = serve_once(
            "200 OK",
            "application/json",
            r#"[{"id":5,"eventId":3,"downloadUrl":"/api/photo/download/5","uploadedBy":"ana","indexed":false}]"#,
        )
        .await;
        let photos = staff(base, Role::Admin)
            .event_photos(&"3".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(photos[0].event_id, Some(3));
        assert_eq!(photos[0].uploaded_by.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_reindex_returns_text() {
        let (base, server) = serve_once(
            "200 OK",
            "text/plain",
            "Re-indexed 12 photos for event 3",
        )
        .await;
        let text = staff(base, Role::Admin)
            .reindex(&"3".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(text, "Re-indexed 12 photos for event 3");
        assert!(server
            .await
            .unwrap()
            .starts_with("POST /api/admin/events/3/reindex "));
    }

    #[tokio::test]
    async fn test_forbidden_is_server_error() {
        let (base, _server) = serve_once("403 Forbidden", "application/json", "").await;
        let err = staff(base, Role::Admin).events().await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 403,
                message: None
            }
        );
    }
}
