use crate::vr::{
    InstanceHandle, SessionHandle, SpaceHandle, SwapchainHandle, SystemId, ViewConfigurationType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapPhase {
    Uninitialized,
    InstanceCreated,
    SessionInitialized,
    SessionActive,
}

/// Stereo swapchain the host renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub swapchain: SwapchainHandle,
    pub width: u32,
    pub height: u32,
    /// GL texture names in the order the runtime enumerated them.
    pub swapchain_textures: Vec<u32>,
    pub swapchain_texture_count: u32,
    pub n_views: u32,
}

/// Handles owned by one bootstrapper. Session-scoped fields are only
/// populated while `has_session` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrState {
    pub(crate) instance: Option<InstanceHandle>,
    pub(crate) system_id: Option<SystemId>,
    pub(crate) session: Option<SessionHandle>,
    pub(crate) local_reference_space: Option<SpaceHandle>,
    pub(crate) render_target: Option<RenderTarget>,
    pub(crate) configuration_type: ViewConfigurationType,
    pub(crate) has_session: bool,
}

impl XrState {
    pub(crate) fn new(configuration_type: ViewConfigurationType) -> Self {
        Self {
            instance: None,
            system_id: None,
            session: None,
            local_reference_space: None,
            render_target: None,
            configuration_type,
            has_session: false,
        }
    }

    pub fn instance(&self) -> Option<InstanceHandle> {
        self.instance
    }

    pub fn system_id(&self) -> Option<SystemId> {
        self.system_id
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session
    }

    pub fn local_reference_space(&self) -> Option<SpaceHandle> {
        self.local_reference_space
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.render_target.as_ref()
    }

    pub fn configuration_type(&self) -> ViewConfigurationType {
        self.configuration_type
    }

    pub fn has_session(&self) -> bool {
        self.has_session
    }
}
