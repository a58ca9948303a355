//! Guest endpoints: event lookup, face match, photo download.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use snapfind_core::{
    parse_photo_list, ApiBase, ApiError, EncodedImage, EventId, EventInfo, GuestApi,
    PhotoDescriptor, PhotoSource,
};
use std::time::Duration;

use crate::response::{self, NotFound};

/// Multipart field the match endpoint reads the image from.
pub const IMAGE_FIELD: &str = "file";

pub struct GuestClient {
    client: reqwest::Client,
    base: ApiBase,
}

impl GuestClient {
    pub fn new(base: ApiBase, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }
}

#[async_trait]
impl PhotoSource for GuestClient {
    fn base(&self) -> &ApiBase {
        &self.base
    }

    async fn fetch_photo(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let resp = response::send(self.client.get(url), NotFound::ServerError).await?;
        response::body_bytes(resp).await
    }
}

#[async_trait]
impl GuestApi for GuestClient {
    async fn event_info(&self, event: &EventId) -> Result<EventInfo, ApiError> {
        let url = self.base.endpoint(&format!("guest/events/{event}"));
        tracing::debug!(%url, "fetching event");

        let resp = response::send(self.client.get(&url), NotFound::EventExpired).await?;
        let body = response::body_text(resp).await?;
        Ok(EventInfo::from_body(event.clone(), &body))
    }

    async fn match_face(
        &self,
        event: &EventId,
        image: &EncodedImage,
    ) -> Result<Vec<PhotoDescriptor>, ApiError> {
        let url = self.base.endpoint(&format!("guest/events/{event}/match-face"));

        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name())
            .mime_str(image.mime)
            .map_err(response::network)?;
        let form = Form::new()
            .text("event_id", event.to_string())
            .part(IMAGE_FIELD, part);

        tracing::info!(%event, bytes = image.bytes.len(), "submitting face for matching");
        let request = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form);
        let resp = response::send(request, NotFound::EventExpired).await?;
        let body = response::body_bytes(resp).await?;
        parse_photo_list(&body)
    }
}
