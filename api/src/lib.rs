pub mod cache;
pub mod error;
pub mod history;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;

pub use cache::{CacheHit, Cached, Freshness, ResponseCache};
pub use error::ApiError;
pub use history::{compute_24h_change, record_snapshot_if_due, SnapshotHistory, SnapshotPolicy, SnapshotStore};
pub use models::*;
pub use repositories::*;
pub use routes::router;
pub use state::AppState;
