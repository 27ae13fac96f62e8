pub mod auth;
pub mod error;
pub mod rooms;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use rooms::RoomRegistry;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
