use atom_rhi::RhiError;

use crate::{
    attachment::AttachmentType,
    id::{AttachmentId, ScopeId},
};

#[derive(Debug, thiserror::Error)]
pub enum FrameGraphError {
    #[error("scope `{0}` is already registered")]
    DuplicateScopeId(ScopeId),

    #[error("scope `{0}` is not registered")]
    UnknownScope(ScopeId),

    #[error("attachment `{0}` already exists in this frame")]
    DuplicateAttachment(AttachmentId),

    #[error("attachment `{0}` has not been created or imported in this frame")]
    UnknownAttachment(AttachmentId),

    #[error("attachment `{id}` is a {actual} attachment, used as {expected}")]
    AttachmentTypeMismatch {
        id: AttachmentId,
        expected: AttachmentType,
        actual: AttachmentType,
    },

    #[error("invalid descriptor for attachment `{id}`: {reason}")]
    InvalidDescriptor { id: AttachmentId, reason: String },

    #[error("scope `{scope}` cannot use attachment `{attachment}`: {reason}")]
    InvalidUsage {
        scope: ScopeId,
        attachment: AttachmentId,
        reason: String,
    },

    #[error("dependency cycle between scopes {0:?}")]
    DependencyCycle(Vec<ScopeId>),

    #[error("failed to allocate transient attachments {attachments:?}")]
    TransientAllocation {
        attachments: Vec<AttachmentId>,
        #[source]
        source: RhiError,
    },

    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("failed to build worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to parse frame scheduler config")]
    Config(#[from] serde_json::Error),
}

pub type FrameGraphResult<T> = Result<T, FrameGraphError>;
