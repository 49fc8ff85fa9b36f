//! Shared wire format and DTO definitions for the `SkillNet` client.

pub mod auth;
pub mod codec;
pub mod conversation;
pub mod gig;
pub mod message;
pub mod room;
