//! Domain model (IDs, observations, series, deviation, artifacts, states).
//!
//! domain はどの層にも依存しません。I/O も非同期処理も持たない純粋な型だけを置きます。

pub mod artifact;
pub mod deviation;
pub mod errors;
pub mod ids;
pub mod observation;
pub mod series;
pub mod state;

pub use artifact::{Artifact, ArtifactError, ArtifactMetadata, SourceParams};
pub use deviation::{DeviationPoint, DeviationResult, DeviationSummary, SUMMARY_TOLERANCE};
pub use errors::ReasonCode;
pub use ids::{ParseTargetIdError, RunId, TargetId};
pub use observation::{Provenance, RawObservationFile, Sample};
pub use series::{NormalizedSeries, SeriesError, SeriesPoint, TimeWindow};
pub use state::ProcessStage;
