use thiserror::Error;

use crate::types::PhotoId;
use crate::workflow::WorkflowState;

/// Failures reported by a camera backend or the session manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera blocked: insecure context")]
    InsecureContext,
    #[error("camera has not produced a full frame yet")]
    NotReady,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Failures talking to the photo service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },
    #[error("event not found or expired")]
    EventExpired,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Failures writing photos to local storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage permission denied: {0}")]
    PermissionDenied(String),
    #[error("write failed: {0}")]
    Write(String),
}

/// Which resource a permission refusal applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Camera,
    Storage,
}

/// Errors surfaced by the capture workflow controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("permission denied ({resource:?}): {detail}")]
    PermissionDenied { resource: Resource, detail: String },
    #[error("camera blocked by insecure context")]
    InsecureContext,
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("capture not ready")]
    CaptureNotReady,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error {status}: {}", .message.as_deref().unwrap_or("no message"))]
    ServerError { status: u16, message: Option<String> },
    #[error("event expired")]
    EventExpired,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("saved {saved} of {total} photos")]
    PartialBulkFailure { saved: usize, total: usize },
    #[error("storage write failed: {0}")]
    StorageWrite(String),
    #[error("no photos selected")]
    NothingSelected,
    #[error("no matched photos")]
    NoResults,
    #[error("photo {0} is not in the current results")]
    UnknownPhoto(PhotoId),
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: WorkflowState,
        action: &'static str,
    },
    #[error("stale match response discarded")]
    StaleResponse,
    #[error("workflow torn down")]
    TornDown,
}

impl WorkflowError {
    /// Errors that permanently disable the camera start control.
    pub fn is_permanent(&self) -> bool {
        matches!(self, WorkflowError::EventExpired | WorkflowError::InsecureContext)
    }

    /// Text shown to the guest.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::PermissionDenied {
                resource: Resource::Camera,
                ..
            } => "Unable to access camera. Please check permissions.".into(),
            WorkflowError::PermissionDenied {
                resource: Resource::Storage,
                ..
            } => "Permission required. Please grant access to the photo album.".into(),
            WorkflowError::InsecureContext => "Camera access is blocked on an insecure \
                connection. Use HTTPS (or localhost), or explicitly allow this origin \
                with allow_insecure_origin."
                .into(),
            WorkflowError::CameraUnavailable(_) => {
                "Unable to access camera. Please check that a camera is connected.".into()
            }
            WorkflowError::CaptureNotReady => {
                "Camera is still starting. Try again in a moment.".into()
            }
            WorkflowError::CaptureFailed(_) => "Failed to capture face. Please try again.".into(),
            WorkflowError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".into()
            }
            WorkflowError::ServerError { status, message } => match message {
                Some(msg) => format!("Failed to match face ({status}): {msg}"),
                None => format!("Failed to match face ({status}). Please try again."),
            },
            WorkflowError::EventExpired => {
                "This event has expired. Data is automatically deleted after 24 hours.".into()
            }
            WorkflowError::InvalidResponse(_) => {
                "The server sent an unexpected response. Please try again.".into()
            }
            WorkflowError::PartialBulkFailure { saved, total } => {
                format!("Saved {saved} of {total} photos.")
            }
            WorkflowError::StorageWrite(_) => "Failed to save photos.".into(),
            WorkflowError::NothingSelected => {
                "Please select at least one photo to download.".into()
            }
            WorkflowError::NoResults => "There are no photos to download.".into(),
            WorkflowError::UnknownPhoto(id) => format!("Photo {id} is not in the results."),
            WorkflowError::InvalidTransition { from, action } => {
                format!("Cannot {action} while {from}.")
            }
            WorkflowError::StaleResponse => "That search is no longer active.".into(),
            WorkflowError::TornDown => "This session has been closed.".into(),
        }
    }
}

impl From<CameraError> for WorkflowError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::Unavailable(detail) => WorkflowError::CameraUnavailable(detail),
            CameraError::PermissionDenied(detail) => WorkflowError::PermissionDenied {
                resource: Resource::Camera,
                detail,
            },
            CameraError::InsecureContext => WorkflowError::InsecureContext,
            CameraError::NotReady => WorkflowError::CaptureNotReady,
            CameraError::CaptureFailed(detail) => WorkflowError::CaptureFailed(detail),
        }
    }
}

impl From<ApiError> for WorkflowError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(detail) => WorkflowError::Network(detail),
            ApiError::Server { status, message } => WorkflowError::ServerError { status, message },
            ApiError::EventExpired => WorkflowError::EventExpired,
            ApiError::InvalidResponse(detail) => WorkflowError::InvalidResponse(detail),
        }
    }
}

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PermissionDenied(detail) => WorkflowError::PermissionDenied {
                resource: Resource::Storage,
                detail,
            },
            StorageError::Write(detail) => WorkflowError::StorageWrite(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_context_message_differs_from_permission() {
        let insecure = WorkflowError::from(CameraError::InsecureContext);
        let denied = WorkflowError::from(CameraError::PermissionDenied("no".into()));
        assert_eq!(insecure, WorkflowError::InsecureContext);
        assert_ne!(insecure.user_message(), denied.user_message());
        assert!(insecure.user_message().contains("HTTPS"));
    }

    #[test]
    fn test_permanent_errors() {
        assert!(WorkflowError::EventExpired.is_permanent());
        assert!(WorkflowError::InsecureContext.is_permanent());
        assert!(!WorkflowError::Network("reset".into()).is_permanent());
        assert!(!WorkflowError::CaptureNotReady.is_permanent());
    }

    #[test]
    fn test_server_error_carries_status_and_message() {
        let err = WorkflowError::from(ApiError::Server {
            status: 500,
            message: Some("internal".into()),
        });
        assert_eq!(
            err,
            WorkflowError::ServerError {
                status: 500,
                message: Some("internal".into())
            }
        );
        assert_eq!(err.user_message(), "Failed to match face (500): internal");
    }

    #[test]
    fn test_storage_permission_maps_to_permission_denied() {
        let err = WorkflowError::from(StorageError::PermissionDenied("read-only".into()));
        assert!(matches!(
            err,
            WorkflowError::PermissionDenied {
                resource: Resource::Storage,
                ..
            }
        ));
    }
}
