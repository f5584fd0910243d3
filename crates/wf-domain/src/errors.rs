// errors.rs
// Taxonomy of engine-level failures (spec "ERROR HANDLING DESIGN").
// Construction errors are never caught by the engine; step/next errors
// propagate to the caller; the step invoker is the only place that turns
// an arbitrary body failure into a status transition instead of a `Result`.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
  /// The persisted fingerprint no longer matches `hash(script_path)`.
  #[error("fingerprint mismatch for {script_path}: expected {expected}, found {found}")]
  IntegrityViolation { script_path: String, expected: String, found: String },

  /// A UUID and additional constructor arguments were both supplied.
  #[error("cannot pass a uuid together with additional constructor arguments")]
  BadConstructorUsage,

  /// A workflow was constructed from somewhere other than its own constructor.
  #[error("workflow construction attempted outside its own constructor")]
  IllegalWorkflowConstruction,

  /// The resumer was asked to load a class outside the reserved namespace.
  #[error("workflow module `{0}` is not in the reserved workflows namespace")]
  DisallowedWorkflowLocation(String),

  /// Re-entry into a step whose `next_call` already points past it.
  #[error("step `{0}` has already been initialized")]
  StepAlreadyInitialized(String),

  /// A step method was called with positional arguments.
  #[error("step methods take no arguments; use parameters/attributes instead")]
  InvalidStepCall,

  /// `next()` was given a method not marked as a step.
  #[error("`{0}` is not a registered step")]
  NotAStep(String),

  /// A lookup was attempted against the reserved exit sentinel name.
  #[error("`__exit__` is a reserved name and cannot be queried as a step")]
  ReservedNameMisuse,

  /// `next()` was called from a method that is not itself a registered step.
  #[error("caller `{0}` is not a known step of this workflow")]
  UnknownCaller(String),

  /// `next()` was given no continuation.
  #[error("next() requires a non-null continuation")]
  NullNext,

  /// A repository-folder mutation was attempted after commit.
  #[error("repository folder is immutable after commit")]
  ImmutableAfterCommit,

  /// A lookup by UUID/PK found nothing.
  #[error("no entry found for {0}")]
  NotExistent(String),

  /// An invariant that should never be violated was violated.
  #[error("internal inconsistency: {0}")]
  InternalInconsistency(String),

  /// Wraps the persistence layer's own error taxonomy.
  #[error("store error: {0}")]
  Store(String),

  #[error("io error: {0}")]
  Io(String),

  #[error("{0}")]
  Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
