pub mod backups;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod tracking;

pub use routes::create_router;
