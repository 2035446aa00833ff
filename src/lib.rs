pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod models;
pub mod session;
pub mod workflow;

pub use api::{ApiClient, ApiError, ClientConfig, ErrorCode, RetryPolicy};
pub use auth::{AuthBoundary, Navigator};
pub use models::{Request, RequestPayload, Session, User};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
pub use workflow::Decision;
