//! In-memory capability fakes for unit tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, CameraError, StorageError};
use crate::platform::{CameraBackend, GuestApi, PhotoSource, PhotoStore, VideoStream};
use crate::types::{ApiBase, EncodedImage, EventId, EventInfo, Facing, PhotoDescriptor, PhotoId};

pub fn photo(id: i64) -> PhotoDescriptor {
    PhotoDescriptor::new(id, format!("/api/photo/download/{id}"))
}

#[derive(Debug, Default)]
pub struct CameraLog {
    pub opened: usize,
    pub released: usize,
    pub grabs: usize,
    pub facings: Vec<Facing>,
}

pub struct FakeCamera {
    log: Arc<Mutex<CameraLog>>,
    open_error: Option<CameraError>,
    not_ready_grabs: usize,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            open_error: None,
            not_ready_grabs: 0,
        }
    }

    pub fn failing(err: CameraError) -> Self {
        Self {
            open_error: Some(err),
            ..Self::new()
        }
    }

    /// The first `n` grabs of each stream report `NotReady`.
    pub fn warming_up(n: usize) -> Self {
        Self {
            not_ready_grabs: n,
            ..Self::new()
        }
    }

    pub fn log(&self) -> Arc<Mutex<CameraLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl CameraBackend for FakeCamera {
    type Stream = FakeStream;

    async fn open(&mut self, facing: Facing) -> Result<FakeStream, CameraError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        let mut log = self.log.lock().unwrap();
        log.opened += 1;
        log.facings.push(facing);
        Ok(FakeStream {
            log: Arc::clone(&self.log),
            live: true,
            not_ready_left: self.not_ready_grabs,
        })
    }
}

pub struct FakeStream {
    log: Arc<Mutex<CameraLog>>,
    live: bool,
    not_ready_left: usize,
}

#[async_trait]
impl VideoStream for FakeStream {
    async fn grab(&mut self, _jpeg_quality: u8) -> Result<EncodedImage, CameraError> {
        self.log.lock().unwrap().grabs += 1;
        if self.not_ready_left > 0 {
            self.not_ready_left -= 1;
            return Err(CameraError::NotReady);
        }
        Ok(EncodedImage::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 2, 2))
    }

    fn release(&mut self) -> usize {
        if !self.live {
            return 0;
        }
        self.live = false;
        self.log.lock().unwrap().released += 1;
        1
    }
}

#[derive(Debug, Default, Clone)]
pub struct ApiCalls {
    pub event_info: usize,
    pub match_face: Vec<EventId>,
    pub fetched: Vec<String>,
}

pub struct FakeApi {
    base: ApiBase,
    event: Result<String, ApiError>,
    matches: Result<Vec<PhotoDescriptor>, ApiError>,
    failing_urls: HashSet<String>,
    calls: Mutex<ApiCalls>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            base: ApiBase::parse("https://photos.example.com/api").unwrap(),
            event: Ok("Event is ready for guest face scanning".into()),
            matches: Ok(Vec::new()),
            failing_urls: HashSet::new(),
            calls: Mutex::default(),
        }
    }

    pub fn with_event(mut self, event: Result<String, ApiError>) -> Self {
        self.event = event;
        self
    }

    pub fn with_matches(mut self, matches: Result<Vec<PhotoDescriptor>, ApiError>) -> Self {
        self.matches = matches;
        self
    }

    /// Fetches of URLs ending with `suffix` fail with a network error.
    pub fn failing_url(mut self, suffix: &str) -> Self {
        self.failing_urls.insert(suffix.to_string());
        self
    }

    pub fn calls(&self) -> ApiCalls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoSource for FakeApi {
    fn base(&self) -> &ApiBase {
        &self.base
    }

    async fn fetch_photo(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.calls.lock().unwrap().fetched.push(url.to_string());
        if self.failing_urls.iter().any(|s| url.ends_with(s.as_str())) {
            return Err(ApiError::Network("connection reset".into()));
        }
        Ok(url.as_bytes().to_vec())
    }
}

#[async_trait]
impl GuestApi for FakeApi {
    async fn event_info(&self, event: &EventId) -> Result<EventInfo, ApiError> {
        self.calls.lock().unwrap().event_info += 1;
        self.event
            .clone()
            .map(|body| EventInfo::from_body(event.clone(), &body))
    }

    async fn match_face(
        &self,
        event: &EventId,
        _image: &EncodedImage,
    ) -> Result<Vec<PhotoDescriptor>, ApiError> {
        self.calls.lock().unwrap().match_face.push(event.clone());
        self.matches.clone()
    }
}

pub struct FakeStore {
    allowed: bool,
    failing_writes: HashSet<PhotoId>,
    pub saved: Vec<PhotoId>,
    pub permission_checks: usize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            allowed: true,
            failing_writes: HashSet::new(),
            saved: Vec::new(),
            permission_checks: 0,
        }
    }

    pub fn denied() -> Self {
        Self {
            allowed: false,
            ..Self::new()
        }
    }

    pub fn failing_write(mut self, id: PhotoId) -> Self {
        self.failing_writes.insert(id);
        self
    }
}

#[async_trait]
impl PhotoStore for FakeStore {
    async fn ensure_write_access(&mut self) -> Result<(), StorageError> {
        self.permission_checks += 1;
        if self.allowed {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied("album access refused".into()))
        }
    }

    async fn save(&mut self, photo: &PhotoDescriptor, _bytes: &[u8]) -> Result<String, StorageError> {
        if self.failing_writes.contains(&photo.id) {
            return Err(StorageError::Write("disk full".into()));
        }
        self.saved.push(photo.id.clone());
        Ok(format!("album/photo_{}.jpg", photo.id))
    }
}
