//! The three live views layered over the feed.
//!
//! Each board owns one reconciled collection (or, for the session detail,
//! a small set of them), seeds it from a REST snapshot and merges dispatched
//! envelopes through the shared [`crate::reconcile::LiveList`] rules. Boards
//! are plain state holders: the owning task reads its subscription stream
//! and calls `apply`, and rendering stays out of scope.

pub mod detail;
pub mod employees;
pub mod sessions;

pub use detail::SessionDetail;
pub use employees::EmployeeRoster;
pub use sessions::{SessionBoard, SessionFilter};
