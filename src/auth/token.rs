//! Token material persisted per instance and handed out by token sources.

pub mod record;
pub mod secret;
