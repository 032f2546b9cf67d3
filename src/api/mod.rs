// API module
//
// This module contains the HTTP surface of a node, used by clients and by peers

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::AppState;
pub use routes::configure_routes;
