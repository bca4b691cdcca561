//! Data models for the meetup backend.
//!
//! Field names serialize in camelCase to match the JSON the web client exchanges.

mod meeting;
mod tag;
mod topic;
mod vote;

pub use meeting::*;
pub use tag::*;
pub use topic::*;
pub use vote::*;
