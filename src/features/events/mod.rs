//! # Events Feature
//!
//! Community events, their persistence seam, and the create/remove/clear flows
//! that keep the reminder scheduler in step with the store.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod lifecycle;
pub mod model;
pub mod store;

pub use lifecycle::EventLifecycle;
pub use model::{Event, NewEvent};
pub use store::{EventStore, StatusUpdate};
