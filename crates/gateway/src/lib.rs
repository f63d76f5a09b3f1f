pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retention;
pub mod routes;
pub mod state;
pub mod store;

pub use config::{Config, get_configuration};
pub use error::ApiError;
pub use pipeline::{PipelineError, PredictionPipeline, PredictionResponse, Upload};
pub use retention::{RetentionPolicy, RetentionSweeper, SweepReport};
pub use routes::{RouterSettings, create_router};
pub use state::AppState;
pub use store::{ArtifactId, ArtifactStore, ImageExtension, LookupError, StorageError};
