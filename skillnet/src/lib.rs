//! `SkillNet` — client library for the skill-exchange marketplace.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod gigs;
pub mod rest;
pub mod track;
