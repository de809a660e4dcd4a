pub mod crypto;
pub mod error;
pub mod handlers;
pub mod server;
pub mod service;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub notes: service::NoteService,
}

pub use error::{Error, Result};
pub use server::{router, run, ServerConfig};
