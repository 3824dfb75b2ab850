//! Service facade, background loops and the tokio spawner.

pub mod api;
pub mod background;
pub mod tokio_spawner;

pub use api::{JobStatusResponse, QueueService, QueueStats, SubmissionRequest, SubmitResponse};
pub use background::{start_background, BackgroundHandle};
pub use tokio_spawner::TokioSpawner;
