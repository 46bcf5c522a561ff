pub mod apply_result;
pub mod artifact;
pub mod job_target;
pub mod profile;
pub mod resume;
pub mod task;

pub use apply_result::{ApplyResult, ApplyStatus, RequiredInput};
pub use artifact::{Artifact, ArtifactKind, ArtifactRecord};
pub use job_target::{JobTarget, JobTargetStatus, SiteType};
pub use profile::{Profile, WorkAuthorization};
pub use resume::Resume;
pub use task::{Task, TaskResultPayload, TaskStatus};
