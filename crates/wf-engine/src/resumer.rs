// resumer.rs
// The original implementation resumes a workflow by dynamically importing
// `module` and looking up `module_class` at runtime. Rust has no dynamic
// import: the redesign is an explicit, compile-time registry that the
// application populates at startup (`WorkflowRegistry::register`), the same
// shape `ChemicalWorkflowFactory` used to map a class name to a concrete
// constructor — just generalized to arbitrary workflow classes instead of
// one hard-coded chemistry pipeline.
use crate::errors::{Result, WorkflowError};
use crate::step::StepRegistry;
use std::collections::HashMap;
use wf_domain::{EngineError, WorkflowRecord};

/// A registered workflow class: its step table plus the initial bag content
/// a fresh instance of it should seed.
pub trait WorkflowDefinition: Send + Sync {
  fn steps(&self) -> StepRegistry;
}

type Constructor = fn() -> Box<dyn WorkflowDefinition>;

/// Maps `module_class` names to constructors, standing in for the original's
/// `importlib`-based class lookup. Only classes registered under
/// `reserved_prefix` (the spec's `DisallowedWorkflowLocation` guard) may be
/// resumed.
#[derive(Default)]
pub struct WorkflowRegistry {
  reserved_prefix: String,
  ctors: HashMap<String, Constructor>,
}

impl WorkflowRegistry {
  pub fn new(reserved_prefix: impl Into<String>) -> Self {
    Self { reserved_prefix: reserved_prefix.into(), ctors: HashMap::new() }
  }

  pub fn register(&mut self, module_class: impl Into<String>, ctor: Constructor) -> &mut Self {
    self.ctors.insert(module_class.into(), ctor);
    self
  }

  pub fn reserved_prefix(&self) -> &str {
    &self.reserved_prefix
  }

  /// Resolves a persisted workflow record back to its step table. Mirrors
  /// `ChemicalWorkflowFactory::load`'s checks: the module must be in the
  /// reserved namespace, and the class must actually be registered.
  pub fn resolve(&self, record: &WorkflowRecord) -> Result<Box<dyn WorkflowDefinition>> {
    if !record.module.starts_with(&self.reserved_prefix) {
      return Err(WorkflowError::Engine(EngineError::DisallowedWorkflowLocation(record.module.clone())));
    }
    self.ctors
        .get(&record.module_class)
        .map(|ctor| ctor())
        .ok_or_else(|| WorkflowError::Engine(EngineError::NotExistent(record.module_class.clone())))
  }
}

/// Registers a workflow type with a `WorkflowRegistry` by its type name —
/// the compile-time stand-in for the original's one-line dynamic import.
/// `register_workflow!(registry, "workflows::demo::DemoWorkflow", demo_workflow)`.
#[macro_export]
macro_rules! register_workflow {
  ($registry:expr, $module_class:expr, $ctor:expr) => {
    $registry.register($module_class, $ctor)
  };
}
