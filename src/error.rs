//! Renderer error type

use thiserror::Error;

use crate::backend::BackendError;
use crate::scene::{MaterialId, NodeId};

/// Errors raised by resources and the renderer
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Invalid dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: &'static str,
    },
    #[error("Invalid cube face index {0}")]
    InvalidFace(u32),
    #[error("Mip level {level} out of range ({available} levels allocated)")]
    InvalidMipLevel { level: u32, available: u32 },
    #[error("Texel data has {actual} bytes, expected {expected}")]
    InvalidDataLength { expected: usize, actual: usize },
    #[error("Face size {actual}x{actual} does not match allocated size {expected}x{expected}")]
    FaceMismatch { expected: u32, actual: u32 },
    #[error("Texel format does not match the allocated format")]
    FormatMismatch,
    #[error("Texture storage has not been allocated")]
    Uninitialized,
    #[error("Attachment index {index} out of range ({count} attachments)")]
    InvalidAttachmentIndex { index: u32, count: u32 },
    #[error("Render targets support 1 to 8 color attachments, got {0}")]
    InvalidAttachmentCount(u32),
    #[error("Shader '{shader}' writes {expected} color outputs but the target has {actual} attachments")]
    AttachmentMismatch {
        shader: String,
        expected: u32,
        actual: u32,
    },
    #[error("Unknown scene node {0:?}")]
    UnknownNode(NodeId),
    #[error("Unknown material {0:?}")]
    UnknownMaterial(MaterialId),
    #[error("Shader '{0}' cannot be used for a full-screen pass")]
    NotFullscreen(String),
    #[error("Invalid shader description: {0}")]
    InvalidShader(String),
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    SceneCycle { parent: NodeId, child: NodeId },
}

pub type RenderResult<T> = Result<T, RenderError>;
