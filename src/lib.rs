// Infrastructure layer (shared components)
pub mod config;
pub mod error;

// Domain layer (business logic)
pub mod dispatch;
pub mod notification;
pub mod registry;
pub mod transport;

// Application layer
pub mod api;
pub mod ingest;
pub mod server;
pub mod tasks;
