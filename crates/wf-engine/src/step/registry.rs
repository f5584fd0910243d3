// registry.rs
// Rust has no decorator and no runtime attribute injection, so a class's
// set of "step methods" (the original implementation's `@Workflow.step`)
// becomes an explicit, compile-time table: `WorkflowStep` objects named and
// collected into a `StepRegistry` by the workflow definition itself. The
// `workflow_steps!` macro below is the idiomatic-Rust analogue of the
// decorator: it still reads as "here is my list of steps", just spelled as
// a table instead of annotations scattered across method definitions.
use crate::errors::Result;
use crate::step::context::StepContext;
use indexmap::IndexMap;
use std::sync::Arc;
use uuid::Uuid;
use wf_domain::WorkflowId;

/// One step body. Step methods take no arguments and return nothing directly
/// useful to the caller — all communication happens through the context's
/// bags, `next()`, and attachments (spec: "step methods take no arguments").
pub trait WorkflowStep: Send + Sync {
  fn name(&self) -> &'static str;
  fn run(&self, ctx: &StepContext) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
  Calculation(Uuid),
  SubWorkflow(WorkflowId),
}

/// Buffers attachments keyed by the step name that issued them, in call
/// order, until the invoker flushes them to the store (spec property P2:
/// attachment writes never land out of the order they were issued in).
#[derive(Default)]
pub struct AttachmentBuffer {
  by_caller: IndexMap<String, Vec<Attachment>>,
}

impl AttachmentBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, caller: &str, item: Attachment) {
    self.by_caller.entry(caller.to_string()).or_default().push(item);
  }

  /// Drains every caller's attachments, in the order each caller's entries
  /// were first pushed.
  pub fn drain_all(&mut self) -> Vec<Attachment> {
    std::mem::take(&mut self.by_caller).into_values().flatten().collect()
  }
}

/// The ordered table of a workflow class's step methods.
#[derive(Clone, Default)]
pub struct StepRegistry {
  steps: IndexMap<&'static str, Arc<dyn WorkflowStep>>,
}

impl StepRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, step: Arc<dyn WorkflowStep>) -> &mut Self {
    self.steps.insert(step.name(), step);
    self
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn WorkflowStep>> {
    self.steps.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.steps.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.steps.keys().copied()
  }
}

/// Declares a zero-sized `WorkflowStep` implementation from a closure body,
/// the Rust-idiomatic stand-in for the original's `@Workflow.step` method
/// decorator.
#[macro_export]
macro_rules! workflow_step {
  ($struct_name:ident, $step_name:literal, $body:expr) => {
    pub struct $struct_name;

    impl $crate::step::registry::WorkflowStep for $struct_name {
      fn name(&self) -> &'static str {
        $step_name
      }

      fn run(&self, ctx: &$crate::step::context::StepContext) -> $crate::errors::Result<()> {
        let f: fn(&$crate::step::context::StepContext) -> $crate::errors::Result<()> = $body;
        f(ctx)
      }
    }
  };
}
