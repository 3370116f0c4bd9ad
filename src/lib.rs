pub mod app;
pub mod attribution;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod newsletter;
pub mod rate_limit;
pub mod repository;
pub mod state;

pub use app::build_router;
