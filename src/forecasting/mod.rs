//! The Forecasting Coordinator: task templates, the artifact-store
//! collaborator, and the post-processing pipeline raw predictions run through
//! before reaching a report.

pub mod artifact_store;
pub mod coordinator;
pub mod post_processing;

pub use artifact_store::{ArtifactStore, InMemoryArtifactStore, SharedArtifactStore};
pub use coordinator::{default_task_templates, ForecastingCoordinator, SharedForecastingCoordinator, TaskTemplate};
pub use post_processing::NDIST_TARGETS;
