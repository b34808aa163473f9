//! Error types and status mapping.
//!
//! Errors fall into three families with different retry semantics:
//! - rejections (bad name, existing data stream, no template): retrying the
//!   same request is safe and will fail the same way
//! - ambiguous outcomes (commit timeout): the task may still apply, so a
//!   blind retry can double-submit
//! - internal defects (structural invariant, panicking task)
//!
//! The identifiers returned by [`StreamError::kind`] are stable strings.

use thiserror::Error;

/// Common error conditions for data stream and cluster state operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A data stream with this name already exists.
    #[error("data_stream [{name}] already exists")]
    AlreadyExists { name: String },

    /// The name violates naming rules (characters, case, reserved prefix).
    #[error("{kind} [{name}] {reason}")]
    InvalidName {
        kind: String,
        name: String,
        reason: String,
    },

    /// No usable template could be resolved for the data stream.
    #[error("{reason}")]
    TemplateResolution { name: String, reason: String },

    /// The synthesized backing index already exists.
    ///
    /// Distinct from [`StreamError::AlreadyExists`] so that automatic
    /// creation on the write path does not treat it as a benign race and
    /// silently drop the write.
    #[error("data stream [{data_stream}] could not be created because backing index [{index}] already exists")]
    AutoCreationConflict { data_stream: String, index: String },

    /// An index with this name already exists.
    #[error("index [{index}] already exists")]
    IndexAlreadyExists { index: String },

    /// A referenced index does not exist.
    #[error("no such index [{index}]")]
    IndexNotFound { index: String },

    /// The index creation service produced an index that breaks its contract.
    #[error("structural invariant violated for index [{index}]: {message}")]
    StructuralInvariant { index: String, message: String },

    /// The task did not complete within the commit timeout.
    ///
    /// The outcome is ambiguous: the task stays queued and may still apply.
    #[error("failed to process cluster event ({source_task}) within {timeout_ms}ms")]
    CommitTimeout { source_task: String, timeout_ms: u64 },

    /// The backing index did not reach the required active shard count in time.
    #[error("timed out after {timeout_ms}ms waiting for active shards of [{index}]")]
    ReadinessTimeout { index: String, timeout_ms: u64 },

    /// A collaborator failure, annotated with the data stream being created.
    #[error("failed to create data stream [{name}]: {source}")]
    DataStream {
        name: String,
        #[source]
        source: Box<StreamError>,
    },

    /// A cluster state task panicked while executing.
    #[error("cluster state task [{source_task}] failed unexpectedly: {message}")]
    TaskFailed { source_task: String, message: String },

    /// The task queue worker is no longer running.
    #[error("cluster state task queue is closed")]
    QueueClosed,

    /// Invalid request.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result type using StreamError.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// Create an InvalidName error for a data stream.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            kind: "data_stream".to_string(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a TemplateResolution error.
    pub fn template_resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemplateResolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap this error with the name of the data stream being created.
    ///
    /// Errors that already name the data stream are returned unchanged.
    pub fn for_data_stream(self, name: &str) -> Self {
        match self {
            Self::DataStream { .. }
            | Self::AlreadyExists { .. }
            | Self::InvalidName { .. }
            | Self::TemplateResolution { .. }
            | Self::AutoCreationConflict { .. } => self,
            other => Self::DataStream {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Strip data stream context and return the underlying error.
    pub fn root(&self) -> &StreamError {
        match self {
            Self::DataStream { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a hard rejection of the request.
    ///
    /// Rejections never changed cluster state, so resubmitting is safe.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.root(),
            Self::AlreadyExists { .. }
                | Self::InvalidName { .. }
                | Self::TemplateResolution { .. }
                | Self::AutoCreationConflict { .. }
                | Self::IndexAlreadyExists { .. }
                | Self::IndexNotFound { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Check if the outcome of the operation is unknown.
    ///
    /// Retrying an ambiguous failure may submit the same change twice.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.root(), Self::CommitTimeout { .. })
    }

    /// Check if this error indicates a defect rather than a bad request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self.root(),
            Self::StructuralInvariant { .. } | Self::TaskFailed { .. } | Self::Internal { .. }
        )
    }

    /// Stable identifier for this error condition.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Self::AlreadyExists { .. } => "resource_already_exists_exception",
            Self::InvalidName { .. } => "invalid_index_name_exception",
            Self::TemplateResolution { .. } => "illegal_argument_exception",
            Self::AutoCreationConflict { .. } => "status_exception",
            Self::IndexAlreadyExists { .. } => "resource_already_exists_exception",
            Self::IndexNotFound { .. } => "index_not_found_exception",
            Self::StructuralInvariant { .. } => "illegal_state_exception",
            Self::CommitTimeout { .. } => "process_cluster_event_timeout_exception",
            Self::ReadinessTimeout { .. } => "active_shards_timeout_exception",
            Self::TaskFailed { .. } => "task_failed_exception",
            Self::QueueClosed => "queue_closed_exception",
            Self::InvalidRequest { .. } => "illegal_argument_exception",
            Self::Internal { .. } => "internal_exception",
            Self::DataStream { .. } => unreachable!("root() strips data stream context"),
        }
    }

    /// Map this error to a response status.
    pub fn status(&self) -> Status {
        match self.root() {
            Self::AlreadyExists { .. }
            | Self::InvalidName { .. }
            | Self::TemplateResolution { .. }
            | Self::AutoCreationConflict { .. }
            | Self::IndexAlreadyExists { .. }
            | Self::InvalidRequest { .. } => Status::BadRequest,
            Self::IndexNotFound { .. } => Status::NotFound,
            Self::CommitTimeout { .. } | Self::QueueClosed => Status::ServiceUnavailable,
            Self::ReadinessTimeout { .. } => Status::GatewayTimeout,
            Self::StructuralInvariant { .. } | Self::TaskFailed { .. } | Self::Internal { .. } => {
                Status::InternalServerError
            }
            Self::DataStream { .. } => unreachable!("root() strips data stream context"),
        }
    }
}

/// Response status classes for surfaced errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    BadRequest = 400,
    NotFound = 404,
    InternalServerError = 500,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
}

impl Status {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        self as u16
    }
}
