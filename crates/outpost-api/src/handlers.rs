//! Request handlers

pub mod email_events;
pub mod emails;
pub mod health;
