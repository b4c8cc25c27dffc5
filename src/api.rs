//! HTTP bindings to the charging backend
//!
//! - `client`: authenticated JSON transport and read-only lookups
//! - `ports`: [`PortLock`](crate::ports::PortLock) over `PATCH /ports/{id}/status`
//! - `sessions`: [`SessionStore`](crate::store::SessionStore) over `/sessions`

pub mod client;
pub mod ports;
pub mod sessions;

pub use client::BackendClient;
pub use ports::HttpPortLock;
pub use sessions::HttpSessionStore;
