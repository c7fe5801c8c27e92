#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[cfg(feature = "auth")]
pub mod auth;
pub mod error;
pub mod journal;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable read by the demo for the WebSocket target.
pub const WS_URL_VAR: &str = "CODOC_WS_URL";
