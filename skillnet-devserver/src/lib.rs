//! `SkillNet` development server library.
//!
//! An in-memory implementation of the `SkillNet` API: auth with JWT
//! tokens, conversations and chat history, the chat WebSocket, and the
//! gig/swap surface. Everything lives in process memory and is lost on
//! restart. Exposed as a library so tests can embed a server on an
//! OS-assigned port.

pub mod auth;
pub mod config;
pub mod rooms;
pub mod server;
pub mod store;
