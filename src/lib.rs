//! Quill - terminal coding assistant
//!
//! This library provides the agentic turn loop, the streaming decoder for the
//! OpenAI Responses wire format, OAuth token lifecycle management and the
//! built-in coding tools.

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
