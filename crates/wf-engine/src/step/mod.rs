pub mod context;
pub mod registry;

pub use context::StepContext;
pub use registry::{Attachment, AttachmentBuffer, StepRegistry, WorkflowStep};
