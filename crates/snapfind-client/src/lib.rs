//! snapfind-client: HTTP adapter for the photo service.
//!
//! [`GuestClient`] implements the guest capability used by the capture
//! workflow; [`StaffClient`] covers the admin and photographer listings.
//! Statuses map onto [`snapfind_core::ApiError`]: a `404` from an
//! event-scoped guest endpoint means the event expired.

pub mod guest;
mod response;
pub mod staff;

pub use guest::GuestClient;
pub use response::server_message;
pub use staff::{EventSummary, Role, StaffClient};
