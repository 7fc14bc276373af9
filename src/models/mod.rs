pub mod job_spec;
pub mod outcome;
pub mod units;

pub use job_spec::{
    CoverDimensions, JobKind, JobSpec, PreviewOptions, PrintOptions, RenderParams, Viewport,
};
pub use outcome::{ColorSpace, PaginationStatus, RenderOutcome, RenderedArtifact};
pub use units::Length;
