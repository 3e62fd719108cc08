//! Data models
//!
//! Shared between salon-server and clients. Catalog entities (chairs,
//! working hours, offerings) are owned by the server and replicated to
//! clients via sync signals; chat entities are projections of server
//! storage.

pub mod chair;
pub mod chat;
pub mod offering;
pub mod participant;
pub mod working_hours;

// Re-exports
pub use chair::*;
pub use chat::*;
pub use offering::*;
pub use participant::*;
pub use working_hours::*;
