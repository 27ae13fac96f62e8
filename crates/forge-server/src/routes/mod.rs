//! REST + WebSocket route handlers, one module per API surface.

pub mod chat;
pub mod knowledge;
pub mod organizations;
pub mod proposals;
pub mod users;

pub(crate) fn default_limit() -> u32 {
    100
}
