use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ApiError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid event id: {0:?}")]
    EventId(String),
    #[error("invalid API base URL: {0}")]
    BaseUrl(String),
    #[error("invalid facing {0:?} (expected \"front\" or \"back\")")]
    Facing(String),
}

/// Photo identifier as sent by the server: integer or opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhotoId {
    Int(i64),
    Text(String),
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoId::Int(n) => write!(f, "{n}"),
            PhotoId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PhotoId {
    fn from(n: i64) -> Self {
        PhotoId::Int(n)
    }
}

impl From<&str> for PhotoId {
    fn from(s: &str) -> Self {
        PhotoId::Text(s.to_string())
    }
}

impl FromStr for PhotoId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(n) => PhotoId::Int(n),
            Err(_) => PhotoId::Text(s.trim().to_string()),
        })
    }
}

impl PhotoId {
    /// Whether `label` is this id's display form. `"0042"` names
    /// `Text("0042")`, never `Int(42)`.
    pub fn matches_label(&self, label: &str) -> bool {
        match self {
            PhotoId::Int(n) => label.trim() == n.to_string(),
            PhotoId::Text(s) => label.trim() == s,
        }
    }
}

/// Result of [`lookup_labels`]: ids found in listing order of the labels,
/// and the labels nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelLookup {
    pub found: Vec<PhotoId>,
    pub unknown: Vec<String>,
}

/// Resolve user-typed photo labels against `photos` by display form.
/// Repeated labels resolve once.
pub fn lookup_labels<S: AsRef<str>>(photos: &[PhotoDescriptor], labels: &[S]) -> LabelLookup {
    let mut lookup = LabelLookup::default();
    let mut seen = HashSet::new();
    for label in labels {
        let label = label.as_ref().trim();
        if label.is_empty() || !seen.insert(label) {
            continue;
        }
        match photos.iter().find(|p| p.id.matches_label(label)) {
            Some(photo) => lookup.found.push(photo.id.clone()),
            None => lookup.unknown.push(label.to_string()),
        }
    }
    lookup
}

/// One matched or listed event photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDescriptor {
    pub id: PhotoId,
    /// Absolute URL, or a path relative to the API origin.
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl PhotoDescriptor {
    pub fn new(id: impl Into<PhotoId>, download_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            download_url: download_url.into(),
            event_id: None,
            uploaded_by: None,
            indexed: None,
            created_at: None,
        }
    }

    /// Build a descriptor from one JSON entry, rejecting entries without a
    /// usable `id` or `downloadUrl`.
    fn from_json(entry: Value) -> Result<Self, String> {
        let Value::Object(mut fields) = entry else {
            return Err("entry is not an object".into());
        };

        let id = match fields.remove("id") {
            Some(Value::Number(n)) => n
                .as_i64()
                .map(PhotoId::Int)
                .ok_or_else(|| format!("id {n} is not an integer"))?,
            Some(Value::String(s)) if !s.trim().is_empty() => PhotoId::Text(s),
            Some(Value::Null) | None => return Err("missing id".into()),
            Some(other) => return Err(format!("unsupported id {other}")),
        };

        let download_url = match fields.remove("downloadUrl") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::String(_)) => return Err(format!("photo {id}: empty downloadUrl")),
            _ => return Err(format!("photo {id}: missing downloadUrl")),
        };

        // Jackson may serialize timestamps as arrays; keep whatever arrived as text.
        let created_at = match fields.remove("createdAt") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            id,
            download_url,
            event_id: fields.get("eventId").and_then(Value::as_i64),
            uploaded_by: fields
                .get("uploadedBy")
                .and_then(Value::as_str)
                .map(str::to_string),
            indexed: fields.get("indexed").and_then(Value::as_bool),
            created_at,
        })
    }
}

/// Decode a photo list response body.
///
/// The body must be a JSON array; every entry must carry an `id` and a
/// non-empty `downloadUrl`, and ids must be unique. An empty array is valid.
pub fn parse_photo_list(body: &[u8]) -> Result<Vec<PhotoDescriptor>, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidResponse(format!("body is not JSON: {e}")))?;
    let Value::Array(entries) = value else {
        return Err(ApiError::InvalidResponse(
            "expected a JSON array of photos".into(),
        ));
    };

    let mut seen = HashSet::with_capacity(entries.len());
    let mut photos = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let photo = PhotoDescriptor::from_json(entry)
            .map_err(|reason| ApiError::InvalidResponse(format!("entry {index}: {reason}")))?;
        if !seen.insert(photo.id.clone()) {
            return Err(ApiError::InvalidResponse(format!(
                "duplicate photo id {}",
                photo.id
            )));
        }
        photos.push(photo);
    }
    Ok(photos)
}

/// Event identifier as it appears in the guest URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EventId(String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EventId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(ParseError::EventId(s.to_string()))
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event metadata from the guest event endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventInfo {
    pub id: EventId,
    /// Display text: the event `name` when the body is JSON, else the body itself.
    pub summary: String,
}

impl EventInfo {
    /// The endpoint answers with plain text on some deployments and JSON on others.
    pub fn from_body(id: EventId, body: &str) -> Self {
        let summary = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(fields)) => fields
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.trim().to_string()),
            Ok(Value::String(s)) => s,
            _ => body.trim().to_string(),
        };
        Self { id, summary }
    }
}

/// Which lens the camera session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    Front,
    Back,
}

impl Facing {
    pub fn flipped(self) -> Self {
        match self {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Facing::Front => "front",
            Facing::Back => "back",
        })
    }
}

impl FromStr for Facing {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(Facing::Front),
            "back" | "environment" => Ok(Facing::Back),
            _ => Err(ParseError::Facing(s.to_string())),
        }
    }
}

/// A single encoded still image grabbed from a camera session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn jpeg(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            mime: "image/jpeg",
            width,
            height,
        }
    }

    /// File name sent alongside the multipart upload.
    pub fn file_name(&self) -> &'static str {
        match self.mime {
            "image/png" => "face.png",
            _ => "face.jpg",
        }
    }
}

/// API base URL (e.g. `https://photos.example.com/api`).
///
/// Relative photo URLs resolve against the *origin*: the base with a trailing
/// `/api` segment removed, because the server already prefixes its download
/// paths with its context path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    base: String,
}

impl ApiBase {
    pub fn parse(url: &str) -> Result<Self, ParseError> {
        let base = url.trim().trim_end_matches('/');
        let lower = base.to_ascii_lowercase();
        let rest = lower
            .strip_prefix("https://")
            .or_else(|| lower.strip_prefix("http://"))
            .ok_or_else(|| ParseError::BaseUrl(format!("{url}: scheme must be http or https")))?;
        if host_of(rest).is_empty() {
            return Err(ParseError::BaseUrl(format!("{url}: missing host")));
        }
        Ok(Self {
            base: base.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Base with the trailing `/api` context path removed.
    pub fn origin(&self) -> &str {
        self.base.strip_suffix("/api").unwrap_or(&self.base)
    }

    /// Absolute URL for an API path such as `/guest/events/42`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Resolve a photo `downloadUrl` against the API origin.
    pub fn resolve(&self, download_url: &str) -> String {
        let lower = download_url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            download_url.to_string()
        } else if download_url.starts_with("//") {
            // Scheme-relative: another host, same scheme as the API.
            let scheme = if self.base.starts_with("https://") { "https" } else { "http" };
            format!("{scheme}:{download_url}")
        } else {
            format!("{}/{}", self.origin(), download_url.trim_start_matches('/'))
        }
    }

    /// Whether the origin counts as a secure context: HTTPS, or plain HTTP to
    /// a loopback host.
    pub fn is_secure(&self) -> bool {
        let lower = self.base.to_ascii_lowercase();
        if lower.starts_with("https://") {
            return true;
        }
        match lower.strip_prefix("http://") {
            Some(rest) => is_loopback_host(host_of(rest)),
            None => false,
        }
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

fn host_of(authority_and_path: &str) -> &str {
    let authority = authority_and_path
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or("");
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    if let Some(bracketed) = authority.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or("");
    }
    authority.split(':').next().unwrap_or("")
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_photo_list_mixed_ids() {
        let body = br#"[
            {"id": 1, "downloadUrl": "/api/photo/download/a", "eventId": 42, "indexed": true},
            {"id": "b7", "downloadUrl": "https://cdn.example.com/b7.jpg", "uploadedBy": "ana"}
        ]"#;
        let photos = parse_photo_list(body).unwrap();
        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].id, PhotoId::Int(1));
        assert_eq!(photos[0].event_id, Some(42));
        assert_eq!(photos[0].indexed, Some(true));
        assert_eq!(photos[1].id, PhotoId::Text("b7".into()));
        assert_eq!(photos[1].uploaded_by.as_deref(), Some("ana"));
    }

    #[test]
    fn test_parse_photo_list_empty_is_valid() {
        assert!(parse_photo_list(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_photo_list_rejects_missing_url() {
        let err = parse_photo_list(br#"[{"id": 3}]"#).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(msg) if msg.contains("downloadUrl")));
    }

    #[test]
    fn test_parse_photo_list_rejects_missing_id() {
        let err = parse_photo_list(br#"[{"downloadUrl": "/x.jpg"}]"#).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(msg) if msg.contains("missing id")));
    }

    #[test]
    fn test_parse_photo_list_rejects_duplicates() {
        let body = br#"[{"id": 1, "downloadUrl": "/a"}, {"id": 1, "downloadUrl": "/b"}]"#;
        assert!(matches!(
            parse_photo_list(body),
            Err(ApiError::InvalidResponse(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_parse_photo_list_rejects_non_array() {
        assert!(parse_photo_list(br#"{"photos": []}"#).is_err());
        assert!(parse_photo_list(b"<html>oops</html>").is_err());
    }

    #[test]
    fn test_created_at_array_kept_as_text() {
        let body = br#"[{"id": 1, "downloadUrl": "/a", "createdAt": [2024, 5, 1]}]"#;
        let photos = parse_photo_list(body).unwrap();
        assert_eq!(photos[0].created_at.as_deref(), Some("[2024,5,1]"));
    }

    #[test]
    fn test_resolve_relative_against_origin() {
        let base = ApiBase::parse("https://photos.example.com/api/").unwrap();
        assert_eq!(base.origin(), "https://photos.example.com");
        assert_eq!(
            base.resolve("/api/photo/download/abc"),
            "https://photos.example.com/api/photo/download/abc"
        );
        assert_eq!(
            base.resolve("https://cdn.example.com/x.jpg"),
            "https://cdn.example.com/x.jpg"
        );
    }

    #[test]
    fn test_resolve_scheme_relative_url() {
        let secure = ApiBase::parse("https://photos.example.com/api").unwrap();
        assert_eq!(
            secure.resolve("//cdn.example.com/x.jpg"),
            "https://cdn.example.com/x.jpg"
        );
        let local = ApiBase::parse("http://localhost:8080/api").unwrap();
        assert_eq!(local.resolve("//cdn.example.com/x.jpg"), "http://cdn.example.com/x.jpg");
    }

    #[test]
    fn test_lookup_labels_keeps_text_ids() {
        let photos = vec![
            PhotoDescriptor::new("0042", "/api/photo/download/0042"),
            PhotoDescriptor::new("7", "/api/photo/download/7"),
            PhotoDescriptor::new(42, "/api/photo/download/42"),
        ];
        let lookup = lookup_labels(&photos, &["0042", "7", "42"]);
        assert_eq!(
            lookup.found,
            vec![
                PhotoId::Text("0042".into()),
                PhotoId::Text("7".into()),
                PhotoId::Int(42),
            ]
        );
        assert!(lookup.unknown.is_empty());
        assert!(!PhotoId::Int(42).matches_label("0042"));
    }

    #[test]
    fn test_lookup_labels_dedupes_and_reports_unknown() {
        let photos = vec![PhotoDescriptor::new(1, "/api/photo/download/1")];
        let lookup = lookup_labels(&photos, &["1", " 1", "9", "9"]);
        assert_eq!(lookup.found, vec![PhotoId::Int(1)]);
        assert_eq!(lookup.unknown, vec!["9".to_string()]);
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let base = ApiBase::parse("http://localhost:8080/api").unwrap();
        assert_eq!(
            base.endpoint("/guest/events/42"),
            "http://localhost:8080/api/guest/events/42"
        );
    }

    #[test]
    fn test_secure_origins() {
        assert!(ApiBase::parse("https://a.example.com/api").unwrap().is_secure());
        assert!(ApiBase::parse("http://localhost:8080/api").unwrap().is_secure());
        assert!(ApiBase::parse("http://127.0.0.1/api").unwrap().is_secure());
        assert!(ApiBase::parse("http://[::1]:8080/api").unwrap().is_secure());
        assert!(!ApiBase::parse("http://192.168.1.3:8080/api").unwrap().is_secure());
        assert!(!ApiBase::parse("http://photos.example.com").unwrap().is_secure());
    }

    #[test]
    fn test_base_url_requires_scheme_and_host() {
        assert!(ApiBase::parse("ftp://x").is_err());
        assert!(ApiBase::parse("https://").is_err());
        assert!(ApiBase::parse("photos.example.com").is_err());
    }

    #[test]
    fn test_event_id_validation() {
        assert_eq!("42".parse::<EventId>().unwrap().as_str(), "42");
        assert!("".parse::<EventId>().is_err());
        assert!("42/../admin".parse::<EventId>().is_err());
    }

    #[test]
    fn test_event_info_text_and_json() {
        let id: EventId = "7".parse().unwrap();
        let text = EventInfo::from_body(id.clone(), "Event 7 is ready for guest face scanning\n");
        assert_eq!(text.summary, "Event 7 is ready for guest face scanning");
        let json = EventInfo::from_body(id, r#"{"id": 7, "name": "Wedding"}"#);
        assert_eq!(json.summary, "Wedding");
    }

    #[test]
    fn test_facing_parse_and_flip() {
        assert_eq!("user".parse::<Facing>().unwrap(), Facing::Front);
        assert_eq!("Back".parse::<Facing>().unwrap(), Facing::Back);
        assert!("side".parse::<Facing>().is_err());
        assert_eq!(Facing::Front.flipped(), Facing::Back);
    }

    #[test]
    fn test_photo_id_from_str() {
        assert_eq!("12".parse::<PhotoId>().unwrap(), PhotoId::Int(12));
        assert_eq!("ab".parse::<PhotoId>().unwrap(), PhotoId::Text("ab".into()));
    }
}
