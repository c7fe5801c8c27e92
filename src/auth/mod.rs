//! Account collaborator for the editor API.
//!
//! **Feature flag:** `auth` (required to use this module)
//!
//! The WebSocket engine does not depend on this module; it only consumes the authenticated URL
//! that [`SessionContext::editor_url`] builds.
//!
//! - [`Client`]: register and log in against `POST {base}/auth/register` and
//!   `POST {base}/auth/login`
//! - [`SessionContext`]: the signed-in user and token, with explicit load/save against a
//!   [`SessionStore`]
//! - [`store`]: key-value persistence, file backed or in memory
//!
//! # Example
//!
//! ```rust,no_run
//! use codoc_session::auth::{Client, SessionContext, store::FileStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::default();
//!     let mut session = SessionContext::load(FileStore::open_default()?);
//!
//!     if !session.is_logged_in() && !session.login(&client, "alice", "secret").await {
//!         anyhow::bail!("login failed: {:?}", session.last_error());
//!     }
//!
//!     let url = session.editor_url("ws://localhost:8080", "42")?;
//!     println!("{url}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod context;
pub mod store;

pub use client::{Client, LoginData, RegisterRequest, User};
pub use context::SessionContext;
/// Secret string type that redacts the token in debug output.
pub use secrecy::{ExposeSecret, SecretString};
pub use store::SessionStore;
