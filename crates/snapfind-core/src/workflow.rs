//! Capture workflow controller.
//!
//! One controller drives one guest session for one event:
//!
//! ```text
//! Idle ──start──▶ CameraActive ──capture──▶ Capturing ──match ok──▶ Reviewing ⇄ Selecting
//!  ▲                   ▲                        │                       │
//!  │                   └──────match failed──────┘                       │
//!  └─────────────────────────────scan again─────────────────────────────┘
//! ```
//!
//! Event expiry sends every state back to `Idle` permanently. All mutation goes
//! through `&mut self`, so transitions are serialized without locks; responses
//! that outlive a reset or teardown are recognised by their epoch and dropped.

use serde::Serialize;
use std::fmt;

use crate::camera::CameraSessionManager;
use crate::download::{DownloadOrchestrator, DownloadOutcome, DownloadSummary};
use crate::error::{ApiError, CameraError, WorkflowError};
use crate::platform::{CameraBackend, GuestApi, PhotoStore};
use crate::selection::{SelectionChange, SelectionSet};
use crate::types::{EncodedImage, EventId, EventInfo, Facing, PhotoDescriptor, PhotoId};

/// Client policy knobs.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Start the camera as soon as event metadata loads, to front-load the
    /// permission prompt.
    pub auto_start_camera: bool,
    /// Restart the camera on "scan again".
    pub restart_camera_on_reset: bool,
    pub facing: Facing,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_start_camera: true,
            restart_camera_on_reset: false,
            facing: Facing::Front,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    CameraActive,
    Capturing,
    Reviewing,
    /// Reviewing with a non-empty selection.
    Selecting,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowState::Idle => "idle",
            WorkflowState::CameraActive => "the camera is active",
            WorkflowState::Capturing => "a capture is in flight",
            WorkflowState::Reviewing => "reviewing results",
            WorkflowState::Selecting => "selecting photos",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Unknown,
    Ready(EventInfo),
    /// Permanent: the event endpoint answered 404.
    Expired,
    Unreachable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// The single user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
    pub dismissible: bool,
}

/// Which controls are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Affordances {
    pub start_camera: bool,
    pub stop_camera: bool,
    pub capture: bool,
    pub switch_facing: bool,
    pub download_selected: bool,
    pub download_all: bool,
    pub scan_again: bool,
    /// Header shows the selection count and bulk action instead of the result count.
    pub selection_mode: bool,
}

/// Which photos a batch download covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    Selected,
    All,
}

/// A frame on its way to the match endpoint.
pub struct MatchTicket {
    epoch: u64,
    event: EventId,
    image: EncodedImage,
}

impl MatchTicket {
    pub fn event(&self) -> &EventId {
        &self.event
    }

    pub fn image(&self) -> &EncodedImage {
        &self.image
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    CameraActive,
    Capturing,
    Reviewing,
}

pub struct Controller<C: CameraBackend, A: GuestApi, S: PhotoStore> {
    event: EventId,
    config: WorkflowConfig,
    camera: CameraSessionManager<C>,
    api: A,
    store: S,
    phase: Phase,
    /// `None` until a match has completed; `Some(empty)` is a real outcome.
    results: Option<Vec<PhotoDescriptor>>,
    selection: SelectionSet,
    event_status: EventStatus,
    camera_blocked: bool,
    notice: Option<Notice>,
    epoch: u64,
    torn_down: bool,
}

impl<C: CameraBackend, A: GuestApi, S: PhotoStore> Controller<C, A, S> {
    pub fn new(
        event: EventId,
        config: WorkflowConfig,
        mut camera: CameraSessionManager<C>,
        api: A,
        store: S,
    ) -> Self {
        camera.set_facing(config.facing);
        Self {
            event,
            config,
            camera,
            api,
            store,
            phase: Phase::Idle,
            results: None,
            selection: SelectionSet::new(),
            event_status: EventStatus::Unknown,
            camera_blocked: false,
            notice: None,
            epoch: 0,
            torn_down: false,
        }
    }

    // ---- observation ----

    pub fn state(&self) -> WorkflowState {
        match self.phase {
            Phase::Idle => WorkflowState::Idle,
            Phase::CameraActive => WorkflowState::CameraActive,
            Phase::Capturing => WorkflowState::Capturing,
            Phase::Reviewing if self.selection.is_selection_mode() => WorkflowState::Selecting,
            Phase::Reviewing => WorkflowState::Reviewing,
        }
    }

    pub fn event(&self) -> &EventId {
        &self.event
    }

    pub fn event_status(&self) -> &EventStatus {
        &self.event_status
    }

    /// `None` before any match completed.
    pub fn results(&self) -> Option<&[PhotoDescriptor]> {
        self.results.as_deref()
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Selected photos in result order.
    pub fn selected_photos(&self) -> Vec<PhotoDescriptor> {
        self.results
            .iter()
            .flatten()
            .filter(|p| self.selection.contains(&p.id))
            .cloned()
            .collect()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Dismiss the current notice if it is dismissible.
    pub fn dismiss_notice(&mut self) -> bool {
        if self.notice.as_ref().is_some_and(|n| n.dismissible) {
            self.notice = None;
            return true;
        }
        false
    }

    pub fn facing(&self) -> Facing {
        self.camera.facing()
    }

    pub fn camera(&self) -> &CameraSessionManager<C> {
        &self.camera
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn affordances(&self) -> Affordances {
        let startable = !self.torn_down
            && !self.camera_blocked
            && self.event_status != EventStatus::Expired;
        let reviewing = self.phase == Phase::Reviewing;
        let has_results = self.results.as_ref().is_some_and(|r| !r.is_empty());

        Affordances {
            start_camera: startable && self.phase == Phase::Idle,
            stop_camera: self.phase == Phase::CameraActive,
            capture: startable && self.phase == Phase::CameraActive,
            switch_facing: startable && matches!(self.phase, Phase::Idle | Phase::CameraActive),
            download_selected: reviewing && !self.selection.is_empty(),
            download_all: reviewing && has_results,
            scan_again: reviewing && !self.torn_down,
            selection_mode: reviewing && self.selection.is_selection_mode(),
        }
    }

    // ---- event ----

    /// Fetch event metadata. A 404 expires the event permanently; on success
    /// the camera starts when `auto_start_camera` is set.
    pub async fn load_event(&mut self) -> Result<(), WorkflowError> {
        self.ensure_live()?;
        if self.event_status == EventStatus::Expired {
            return Err(WorkflowError::EventExpired);
        }

        match self.api.event_info(&self.event).await {
            Ok(info) => {
                tracing::info!(event = %self.event, summary = %info.summary, "event loaded");
                self.event_status = EventStatus::Ready(info);
                if self.config.auto_start_camera && self.phase == Phase::Idle {
                    // Start failures are already reported through the notice.
                    if let Err(e) = self.start_camera().await {
                        tracing::debug!(error = %e, "automatic camera start failed");
                    }
                }
                Ok(())
            }
            Err(ApiError::EventExpired) => {
                self.expire();
                Err(WorkflowError::EventExpired)
            }
            Err(e) => {
                tracing::warn!(event = %self.event, error = %e, "event load failed");
                self.event_status = EventStatus::Unreachable(e.to_string());
                self.post(
                    Severity::Error,
                    "Unable to load event information. It may have expired.",
                    true,
                );
                Err(e.into())
            }
        }
    }

    // ---- camera ----

    pub async fn start_camera(&mut self) -> Result<(), WorkflowError> {
        self.ensure_live()?;
        match self.phase {
            Phase::Idle => {}
            Phase::CameraActive => return Ok(()),
            _ => return Err(self.invalid("start the camera")),
        }
        if self.event_status == EventStatus::Expired {
            return Err(WorkflowError::EventExpired);
        }
        if self.camera_blocked {
            return Err(WorkflowError::InsecureContext);
        }

        match self.camera.start(self.camera.facing()).await {
            Ok(_) => {
                self.phase = Phase::CameraActive;
                self.post(
                    Severity::Info,
                    "Camera started. Capture your face when ready.",
                    true,
                );
                Ok(())
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                if err == WorkflowError::InsecureContext {
                    self.camera_blocked = true;
                }
                self.post(Severity::Error, err.user_message(), !err.is_permanent());
                Err(err)
            }
        }
    }

    /// Release the camera. During a capture the in-flight match is not
    /// cancelled; its outcome still lands.
    pub fn stop_camera(&mut self) -> bool {
        let released = self.camera.stop();
        if self.phase == Phase::CameraActive {
            self.phase = Phase::Idle;
            self.post(Severity::Info, "Camera stopped.", true);
        }
        released
    }

    /// Flip between front and back lens. An active camera is restarted on the
    /// new lens; refused while a capture is in flight.
    pub async fn switch_facing(&mut self) -> Result<Facing, WorkflowError> {
        self.ensure_live()?;
        if !matches!(self.phase, Phase::Idle | Phase::CameraActive) {
            return Err(self.invalid("switch camera"));
        }

        let facing = self.camera.facing().flipped();
        self.camera.set_facing(facing);
        tracing::debug!(%facing, "camera facing switched");

        if self.phase == Phase::CameraActive {
            self.camera.stop();
            self.phase = Phase::Idle;
            self.start_camera().await?;
        }
        Ok(facing)
    }

    // ---- capture & match ----

    /// Grab a frame and enter `Capturing`. The returned ticket must be handed
    /// back through [`finish_match`](Self::finish_match).
    ///
    /// A camera that has not produced a full frame yet leaves the controller in
    /// `CameraActive` and returns `CaptureNotReady` without posting a notice.
    pub async fn begin_capture(&mut self) -> Result<MatchTicket, WorkflowError> {
        self.ensure_live()?;
        if self.event_status == EventStatus::Expired {
            return Err(WorkflowError::EventExpired);
        }
        if self.phase != Phase::CameraActive {
            return Err(self.invalid("capture"));
        }

        self.phase = Phase::Capturing;
        match self.camera.capture_frame().await {
            Ok(image) => {
                self.post(Severity::Info, "Analyzing your face... Please wait.", false);
                Ok(MatchTicket {
                    epoch: self.epoch,
                    event: self.event.clone(),
                    image,
                })
            }
            Err(CameraError::NotReady) => {
                tracing::debug!(event = %self.event, "video not ready yet; capture ignored");
                self.phase = self.live_camera_phase();
                Err(WorkflowError::CaptureNotReady)
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                tracing::warn!(error = %err, "frame capture failed");
                self.phase = self.live_camera_phase();
                self.post(Severity::Error, err.user_message(), true);
                Err(err)
            }
        }
    }

    /// Apply a match response. Responses whose ticket predates a reset,
    /// expiry or teardown are discarded without touching state.
    pub fn finish_match(
        &mut self,
        ticket: MatchTicket,
        result: Result<Vec<PhotoDescriptor>, ApiError>,
    ) -> Result<usize, WorkflowError> {
        if self.torn_down || ticket.epoch != self.epoch || self.phase != Phase::Capturing {
            tracing::warn!(
                ticket_epoch = ticket.epoch,
                epoch = self.epoch,
                "discarding stale match response"
            );
            return Err(WorkflowError::StaleResponse);
        }

        match result {
            Ok(photos) => {
                let count = photos.len();
                self.camera.stop();
                self.selection.clear();
                self.results = Some(photos);
                self.phase = Phase::Reviewing;
                tracing::info!(event = %self.event, photos = count, "match complete");
                if count == 0 {
                    self.post(
                        Severity::Warning,
                        "No matching photos found. Please try again with a clearer face image.",
                        true,
                    );
                } else {
                    self.post(
                        Severity::Success,
                        format!("Found {count} photos matching your face!"),
                        true,
                    );
                }
                Ok(count)
            }
            Err(ApiError::EventExpired) => {
                self.expire();
                Err(WorkflowError::EventExpired)
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                tracing::warn!(event = %self.event, error = %err, "match failed");
                self.phase = self.live_camera_phase();
                self.post(Severity::Error, err.user_message(), true);
                Err(err)
            }
        }
    }

    /// Capture a frame and match it. Returns the number of matched photos.
    pub async fn capture(&mut self) -> Result<usize, WorkflowError> {
        let ticket = self.begin_capture().await?;
        let result = self.api.match_face(&ticket.event, &ticket.image).await;
        self.finish_match(ticket, result)
    }

    // ---- review ----

    pub fn toggle_selection(&mut self, id: &PhotoId) -> Result<SelectionChange, WorkflowError> {
        if self.phase != Phase::Reviewing {
            return Err(self.invalid("select photos"));
        }
        if !self.results.iter().flatten().any(|p| &p.id == id) {
            return Err(WorkflowError::UnknownPhoto(id.clone()));
        }
        let change = self.selection.toggle(id);
        tracing::debug!(photo = %id, ?change, selected = self.selection.len(), "selection changed");
        Ok(change)
    }

    pub fn clear_selection(&mut self) -> bool {
        self.selection.clear()
    }

    /// Discard the results and selection and return to `Idle`.
    pub async fn scan_again(&mut self) -> Result<(), WorkflowError> {
        self.ensure_live()?;
        if self.phase != Phase::Reviewing {
            return Err(self.invalid("scan again"));
        }
        self.reset_to_idle();
        self.notice = None;
        if self.config.restart_camera_on_reset {
            self.start_camera().await?;
        }
        Ok(())
    }

    // ---- downloads ----

    pub async fn download_photo(&mut self, id: &PhotoId) -> Result<DownloadOutcome, WorkflowError> {
        self.ensure_live()?;
        if self.phase != Phase::Reviewing {
            return Err(self.invalid("download"));
        }
        let photo = self
            .results
            .iter()
            .flatten()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownPhoto(id.clone()))?;

        let outcome = DownloadOrchestrator::new(&self.api, &mut self.store)
            .download_one(&photo)
            .await;
        if outcome.succeeded {
            self.post(Severity::Success, "Photo saved.", true);
        } else {
            self.post(Severity::Error, "Failed to download photo.", true);
        }
        Ok(outcome)
    }

    pub async fn download_selected(&mut self) -> Result<DownloadSummary, WorkflowError> {
        self.download_batch(BatchScope::Selected, |_, _, _| {}).await
    }

    pub async fn download_all(&mut self) -> Result<DownloadSummary, WorkflowError> {
        self.download_batch(BatchScope::All, |_, _, _| {}).await
    }

    /// Download a batch sequentially and post one summary notice.
    ///
    /// A fully successful selected batch clears the selection; after a partial
    /// failure the selection is kept so the guest can retry.
    pub async fn download_batch<F>(
        &mut self,
        scope: BatchScope,
        on_progress: F,
    ) -> Result<DownloadSummary, WorkflowError>
    where
        F: FnMut(usize, usize, &DownloadOutcome),
    {
        self.ensure_live()?;
        if self.phase != Phase::Reviewing {
            return Err(self.invalid("download"));
        }

        let photos = match scope {
            BatchScope::Selected => {
                if self.selection.is_empty() {
                    let err = WorkflowError::NothingSelected;
                    self.post(Severity::Warning, err.user_message(), true);
                    return Err(err);
                }
                self.selected_photos()
            }
            BatchScope::All => match self.results.clone().unwrap_or_default() {
                photos if photos.is_empty() => {
                    let err = WorkflowError::NoResults;
                    self.post(Severity::Warning, err.user_message(), true);
                    return Err(err);
                }
                photos => photos,
            },
        };

        let result = DownloadOrchestrator::new(&self.api, &mut self.store)
            .download_many_with_progress(&photos, on_progress)
            .await;

        match result {
            Ok(outcomes) => {
                let summary = DownloadSummary::new(outcomes);
                if summary.is_complete() {
                    self.post(Severity::Success, summary.message(), true);
                    if scope == BatchScope::Selected {
                        self.selection.clear();
                    }
                } else {
                    self.post(Severity::Error, summary.message(), true);
                }
                Ok(summary)
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                self.post(Severity::Error, err.user_message(), true);
                Err(err)
            }
        }
    }

    // ---- lifecycle ----

    /// Mark the event expired: release the camera, drop results, disable start.
    pub fn expire(&mut self) {
        tracing::warn!(event = %self.event, "event expired");
        self.reset_to_idle();
        self.event_status = EventStatus::Expired;
        self.post(
            Severity::Error,
            WorkflowError::EventExpired.user_message(),
            false,
        );
    }

    /// Release everything. Later responses and calls are rejected.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.camera.stop();
        self.phase = Phase::Idle;
        self.epoch += 1;
        self.torn_down = true;
        tracing::debug!(event = %self.event, "workflow torn down");
    }

    fn reset_to_idle(&mut self) {
        self.camera.stop();
        self.results = None;
        self.selection.clear();
        self.phase = Phase::Idle;
        self.epoch += 1;
    }

    fn live_camera_phase(&self) -> Phase {
        if self.camera.is_active() {
            Phase::CameraActive
        } else {
            Phase::Idle
        }
    }

    fn ensure_live(&self) -> Result<(), WorkflowError> {
        if self.torn_down {
            Err(WorkflowError::TornDown)
        } else {
            Ok(())
        }
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            from: self.state(),
            action,
        }
    }

    fn post(&mut self, severity: Severity, text: impl Into<String>, dismissible: bool) {
        self.notice = Some(Notice {
            severity,
            text: text.into(),
            dismissible,
        });
    }
}

impl<C: CameraBackend, A: GuestApi, S: PhotoStore> Drop for Controller<C, A, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
