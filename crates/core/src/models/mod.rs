//! Data models for Bí Cảnh

mod vocabulary;
mod member;
mod score;
mod meeting;
mod join_request;

pub use vocabulary::*;
pub use member::*;
pub use score::*;
pub use meeting::*;
pub use join_request::*;
