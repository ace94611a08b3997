//! # OCT Web
//!
//! HTTP层:路由、认证、处理器与错误映射。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{AuthService, AuthUser, TokenIssuer};
pub use error::{ApiError, ApiResult};
pub use server::{AppState, WebServer};
