//! Bí Cảnh Network Library
//!
//! TCP request/response transport for the coordination service.
//!
//! # Architecture
//!
//! - **Server**: Runs next to the database, authenticates callers by API key
//! - **Client**: Used by the chat bot and admin tooling
//! - **Protocol**: Length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(addr, handler).await?;
//!
//! let mut client = Client::connect(server.addr(), &api_key).await?;
//! let meeting = client.latest_confirmed_meeting().await?;
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{Request, Response};
pub use server::{Handler, Server};

/// Default port for the service
pub const DEFAULT_PORT: u16 = 7340;
