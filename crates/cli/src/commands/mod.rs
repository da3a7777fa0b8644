pub mod discover;
pub mod targets;
pub mod validate;
