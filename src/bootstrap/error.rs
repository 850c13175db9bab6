use super::BootstrapPhase;
use crate::gles::GlesVersion;
use crate::vr::{Version, ViewConfigurationType, sys};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("invalid bootstrap configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to enumerate instance extensions: {0:?}")]
    ExtensionEnumeration(sys::Result),
    #[error("OpenXR runtime does not support required extensions: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),
    #[error("XrInstance creation failed: {0:?}")]
    InstanceCreation(sys::Result),
    #[error("failed to get XrSystemId: {0:?}")]
    SystemQuery(sys::Result),
    #[error("failed to detect OpenXR runtime version requirements: {0:?}")]
    GraphicsRequirements(sys::Result),
    #[error("OpenGL ES version {current} not supported by OpenXR runtime (requires {required})")]
    GraphicsVersionUnsupported {
        required: Version,
        current: GlesVersion,
    },
    #[error("failed to create XR session: {0:?}")]
    SessionCreation(sys::Result),
    #[error("failed to create local reference space: {0:?}")]
    ReferenceSpaceCreation(sys::Result),
    #[error("failed to enumerate configuration views: {0:?}")]
    ViewEnumeration(sys::Result),
    #[error("runtime reported no views for {0:?}")]
    NoViews(ViewConfigurationType),
    #[error("failed to create swapchain: {0:?}")]
    SwapchainCreation(sys::Result),
    #[error("failed to enumerate images on swapchain: {0:?}")]
    SwapchainImageEnumeration(sys::Result),
    #[error("failed to start session: {0:?}")]
    SessionBegin(sys::Result),
    #[error("failed to end session: {0:?}")]
    SessionEnd(sys::Result),
    #[error("{operation} requires phase {expected:?}, bootstrap is {actual:?}")]
    InvalidPhase {
        operation: &'static str,
        expected: BootstrapPhase,
        actual: BootstrapPhase,
    },
}

impl BootstrapError {
    /// Runtime result code behind the failure, if the runtime produced one.
    pub fn code(&self) -> Option<sys::Result> {
        match self {
            BootstrapError::ExtensionEnumeration(code)
            | BootstrapError::InstanceCreation(code)
            | BootstrapError::SystemQuery(code)
            | BootstrapError::GraphicsRequirements(code)
            | BootstrapError::SessionCreation(code)
            | BootstrapError::ReferenceSpaceCreation(code)
            | BootstrapError::ViewEnumeration(code)
            | BootstrapError::SwapchainCreation(code)
            | BootstrapError::SwapchainImageEnumeration(code)
            | BootstrapError::SessionBegin(code)
            | BootstrapError::SessionEnd(code) => Some(*code),
            BootstrapError::InvalidConfig(_)
            | BootstrapError::MissingExtensions(_)
            | BootstrapError::GraphicsVersionUnsupported { .. }
            | BootstrapError::NoViews(_)
            | BootstrapError::InvalidPhase { .. } => None,
        }
    }
}
