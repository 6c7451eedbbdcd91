//! Embedded key-value persistence for Conversation/Turn/Example/Feedback/
//! Annotation, column-family-per-entity.

pub mod db;
pub mod keys;

pub use db::Storage;
