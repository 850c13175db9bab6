//! Drives an [`XrRuntime`] through instance, session, reference space and
//! swapchain creation for a host-owned GLES context, and back down again.

mod error;
mod guard;
mod state;

pub use error::BootstrapError;
pub use state::{BootstrapPhase, RenderTarget, XrState};

use self::guard::{ResourceGuard, release};
use crate::config::{BootstrapConfig, ConfigError};
use crate::gles::GlesContext;
use crate::platform::PlatformContext;
use crate::vr::{
    AndroidCreateInfo, GraphicsBinding, InstanceCreateInfo, InstanceHandle,
    ReferenceSpaceCreateInfo, SessionCreateInfo, SystemId, XrRuntime, enumerate_two_call,
    expected_view_count,
};

fn fail(err: BootstrapError) -> BootstrapError {
    log::error!("[xr] {err}");
    err
}

/// Owns one OpenXR instance and at most one GLES-bound session on it.
///
/// Every operation checks the current [`BootstrapPhase`] first and rejects
/// out-of-order calls without touching the runtime. Dropping the
/// bootstrapper performs [`shutdown`](Self::shutdown).
pub struct XrBootstrap<R: XrRuntime> {
    runtime: R,
    config: BootstrapConfig,
    state: XrState,
    phase: BootstrapPhase,
}

impl<R: XrRuntime> XrBootstrap<R> {
    pub fn new(runtime: R, config: BootstrapConfig) -> Self {
        let state = XrState::new(config.view_configuration);
        Self {
            runtime,
            config,
            state,
            phase: BootstrapPhase::Uninitialized,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn state(&self) -> &XrState {
        &self.state
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn has_session(&self) -> bool {
        self.state.has_session
    }

    pub fn system_id(&self) -> Option<SystemId> {
        self.state.system_id
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.state.render_target.as_ref()
    }

    fn expect_phase(
        &self,
        operation: &'static str,
        expected: BootstrapPhase,
    ) -> Result<(), BootstrapError> {
        if self.phase == expected {
            return Ok(());
        }
        Err(fail(BootstrapError::InvalidPhase {
            operation,
            expected,
            actual: self.phase,
        }))
    }

    fn instance_and_system(
        &self,
        operation: &'static str,
    ) -> Result<(InstanceHandle, SystemId), BootstrapError> {
        match (self.state.instance, self.state.system_id) {
            (Some(instance), Some(system)) => Ok((instance, system)),
            _ => Err(fail(BootstrapError::InvalidPhase {
                operation,
                expected: BootstrapPhase::InstanceCreated,
                actual: self.phase,
            })),
        }
    }

    /// Connects to the runtime: loader, instance and HMD system.
    pub fn initialize(&mut self, platform: &PlatformContext) -> Result<(), BootstrapError> {
        self.expect_phase("initialize", BootstrapPhase::Uninitialized)?;
        self.config.validate().map_err(|err| {
            let reason = match err {
                ConfigError::Invalid(reason) => reason,
                other => other.to_string(),
            };
            fail(BootstrapError::InvalidConfig(reason))
        })?;
        let runtime = &self.runtime;
        let config = &self.config;

        if let Err(code) = runtime.initialize_loader(platform) {
            log::debug!("[xr] loader initialization skipped: {code:?}");
        }

        let required = config.required_extensions();
        let available = runtime
            .enumerate_instance_extensions()
            .map_err(|code| fail(BootstrapError::ExtensionEnumeration(code)))?;
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !available.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(fail(BootstrapError::MissingExtensions(missing)));
        }

        let create_info = InstanceCreateInfo {
            application_name: config.application_name.clone(),
            application_version: config.application_version,
            engine_name: config.engine_name.clone(),
            engine_version: config.engine_version,
            api_version: config.api_version,
            enabled_extensions: required,
            android: Some(AndroidCreateInfo::from(platform)),
        };
        let instance = runtime
            .create_instance(&create_info)
            .map_err(|code| fail(BootstrapError::InstanceCreation(code)))?;
        let instance = ResourceGuard::new(runtime, instance);

        let system_id = runtime
            .system(instance.handle(), config.form_factor)
            .map_err(|code| fail(BootstrapError::SystemQuery(code)))?;

        log::info!(
            "[xr] connected to {} ({}), system {system_id}",
            runtime.label(),
            instance.handle()
        );
        self.state.instance = Some(instance.into_inner());
        self.state.system_id = Some(system_id);
        self.phase = BootstrapPhase::InstanceCreated;
        Ok(())
    }

    /// Creates the GLES-bound session, its reference space and the stereo
    /// swapchain. On failure everything created here is destroyed again.
    pub fn init_session(&mut self, gles: &mut dyn GlesContext) -> Result<(), BootstrapError> {
        self.expect_phase("init_session", BootstrapPhase::InstanceCreated)?;
        let (instance, system) = self.instance_and_system("init_session")?;
        let runtime = &self.runtime;
        let config = &self.config;

        let requirements = runtime
            .opengles_graphics_requirements(instance, system)
            .map_err(|code| fail(BootstrapError::GraphicsRequirements(code)))?;
        let current = gles.version();
        if requirements.min_api_version_supported > current.to_xr_version() {
            gles.destroy();
            return Err(fail(BootstrapError::GraphicsVersionUnsupported {
                required: requirements.min_api_version_supported,
                current,
            }));
        }

        let session_info = SessionCreateInfo {
            system_id: system,
            binding: GraphicsBinding::OpenGlEsAndroid(gles.handles()),
        };
        let session = runtime
            .create_session(instance, &session_info)
            .map_err(|code| fail(BootstrapError::SessionCreation(code)))?;
        let session = ResourceGuard::new(runtime, session);

        let space = runtime
            .create_reference_space(
                session.handle(),
                &ReferenceSpaceCreateInfo::identity(config.reference_space),
            )
            .map_err(|code| fail(BootstrapError::ReferenceSpaceCreation(code)))?;
        let space = ResourceGuard::new(runtime, space);

        let configuration_type = config.view_configuration;
        let views = enumerate_two_call(|buffer| {
            runtime.enumerate_view_configuration_views(instance, system, configuration_type, buffer)
        })
        .map_err(|code| fail(BootstrapError::ViewEnumeration(code)))?;
        let Some(first_view) = views.first() else {
            return Err(fail(BootstrapError::NoViews(configuration_type)));
        };
        if let Some(expected) =
            expected_view_count(configuration_type).filter(|&expected| expected != views.len())
        {
            log::warn!(
                "[xr] {configuration_type:?} reported {} views, expected {expected}",
                views.len()
            );
        }
        let width = first_view.recommended_image_rect_width;
        let height = first_view.recommended_image_rect_height;

        let swapchain = runtime
            .create_swapchain(session.handle(), &config.swapchain.create_info(width, height))
            .map_err(|code| fail(BootstrapError::SwapchainCreation(code)))?;
        let swapchain = ResourceGuard::new(runtime, swapchain);

        let images = enumerate_two_call(|buffer| {
            runtime.enumerate_swapchain_images(swapchain.handle(), buffer)
        })
        .map_err(|code| fail(BootstrapError::SwapchainImageEnumeration(code)))?;
        let swapchain_textures: Vec<u32> = images.iter().map(|image| image.image).collect();
        for texture in &swapchain_textures {
            log::info!("[xr] swapchain texture: {texture}");
        }

        let render_target = RenderTarget {
            swapchain: swapchain.into_inner(),
            width,
            height,
            swapchain_texture_count: swapchain_textures.len() as u32,
            swapchain_textures,
            n_views: views.len() as u32,
        };
        self.state.local_reference_space = Some(space.into_inner());
        self.state.session = Some(session.into_inner());
        self.state.render_target = Some(render_target);
        self.state.configuration_type = configuration_type;
        self.state.has_session = true;
        self.phase = BootstrapPhase::SessionInitialized;
        Ok(())
    }

    /// Begins the session with the view configuration chosen at
    /// [`init_session`](Self::init_session).
    pub fn start_session(&mut self) -> Result<(), BootstrapError> {
        self.expect_phase("start_session", BootstrapPhase::SessionInitialized)?;
        let Some(session) = self.state.session else {
            return Err(fail(BootstrapError::InvalidPhase {
                operation: "start_session",
                expected: BootstrapPhase::SessionInitialized,
                actual: self.phase,
            }));
        };

        self.runtime
            .begin_session(session, self.state.configuration_type)
            .map_err(|code| fail(BootstrapError::SessionBegin(code)))?;
        self.state.has_session = true;
        self.phase = BootstrapPhase::SessionActive;
        Ok(())
    }

    /// Tells the runtime the session is over. Handles stay alive until
    /// [`free_session`](Self::free_session).
    pub fn end_session(&mut self) -> Result<(), BootstrapError> {
        self.expect_phase("end_session", BootstrapPhase::SessionActive)?;
        let Some(session) = self.state.session else {
            return Err(fail(BootstrapError::InvalidPhase {
                operation: "end_session",
                expected: BootstrapPhase::SessionActive,
                actual: self.phase,
            }));
        };

        self.runtime
            .end_session(session)
            .map_err(|code| fail(BootstrapError::SessionEnd(code)))?;
        self.phase = BootstrapPhase::SessionInitialized;
        Ok(())
    }

    /// Destroys the swapchain, reference space and session and drops the
    /// texture list. Calling it again is a no-op.
    pub fn free_session(&mut self) {
        let runtime = &self.runtime;
        if let Some(render_target) = self.state.render_target.take() {
            release(runtime, render_target.swapchain);
        }
        if let Some(space) = self.state.local_reference_space.take() {
            release(runtime, space);
        }
        if let Some(session) = self.state.session.take() {
            release(runtime, session);
        }
        self.state.has_session = false;
        if matches!(
            self.phase,
            BootstrapPhase::SessionInitialized | BootstrapPhase::SessionActive
        ) {
            self.phase = BootstrapPhase::InstanceCreated;
        }
    }

    /// Frees the session if there is one, then destroys the instance.
    pub fn shutdown(&mut self) {
        if self.state.has_session {
            self.free_session();
        }
        if let Some(instance) = self.state.instance.take() {
            release(&self.runtime, instance);
            log::info!("[xr] instance {instance} released");
        }
        self.state.system_id = None;
        self.phase = BootstrapPhase::Uninitialized;
    }
}

impl<R: XrRuntime> Drop for XrBootstrap<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::{EglHandles, GlesVersion, HostGlesContext};
    use crate::vr::{
        CallKind, RuntimeCall, SimulatedRuntime, Version, ViewConfigurationType, sys,
    };
    use std::ffi::c_void;

    fn gles(major: u16, minor: u16) -> HostGlesContext {
        HostGlesContext::new(
            EglHandles::new(
                0x1 as *mut c_void,
                0x2 as *mut c_void,
                0x3 as *mut c_void,
            ),
            GlesVersion::new(major, minor),
        )
    }

    fn initialized(runtime: &SimulatedRuntime) -> XrBootstrap<SimulatedRuntime> {
        let mut bootstrap = XrBootstrap::new(runtime.clone(), BootstrapConfig::default());
        bootstrap
            .initialize(&PlatformContext::detached())
            .expect("initialize should succeed");
        bootstrap
    }

    #[test]
    fn initialize_enables_gles_and_android_extensions() {
        let runtime = SimulatedRuntime::new();
        let bootstrap = initialized(&runtime);

        assert_eq!(bootstrap.phase(), BootstrapPhase::InstanceCreated);
        let created = runtime
            .calls()
            .into_iter()
            .find_map(|call| match call {
                RuntimeCall::CreateInstance(info) => Some(info),
                _ => None,
            })
            .expect("instance should be created");
        assert_eq!(created.application_name, "HelloXR");
        assert_eq!(
            created.enabled_extensions,
            vec![
                "XR_KHR_opengl_es_enable".to_string(),
                "XR_KHR_android_create_instance".to_string(),
            ]
        );
        assert!(created.android.is_some());
    }

    #[test]
    fn loader_failure_is_not_fatal() {
        let runtime = SimulatedRuntime::new().with_loader_available(false);
        let bootstrap = initialized(&runtime);
        assert_eq!(bootstrap.phase(), BootstrapPhase::InstanceCreated);
        assert_eq!(runtime.count(CallKind::InitializeLoader), 1);
    }

    #[test]
    fn system_query_failure_releases_instance() {
        let runtime = SimulatedRuntime::new()
            .fail_on(CallKind::GetSystem, sys::Result::ERROR_FORM_FACTOR_UNAVAILABLE);
        let mut bootstrap = XrBootstrap::new(runtime.clone(), BootstrapConfig::default());

        let err = bootstrap
            .initialize(&PlatformContext::detached())
            .unwrap_err();

        assert_eq!(
            err,
            BootstrapError::SystemQuery(sys::Result::ERROR_FORM_FACTOR_UNAVAILABLE)
        );
        assert_eq!(bootstrap.phase(), BootstrapPhase::Uninitialized);
        assert_eq!(runtime.live_instances(), 0);
        assert_eq!(runtime.count(CallKind::DestroyInstance), 1);
    }

    #[test]
    fn missing_extension_stops_before_instance_creation() {
        let runtime = SimulatedRuntime::new().without_extension("XR_KHR_opengl_es_enable");
        let mut bootstrap = XrBootstrap::new(runtime.clone(), BootstrapConfig::default());

        let err = bootstrap
            .initialize(&PlatformContext::detached())
            .unwrap_err();

        assert_eq!(
            err,
            BootstrapError::MissingExtensions(vec!["XR_KHR_opengl_es_enable".to_string()])
        );
        assert_eq!(runtime.count(CallKind::CreateInstance), 0);
    }

    #[test]
    fn requirements_query_failure_keeps_gles_alive() {
        let runtime = SimulatedRuntime::new()
            .fail_on(CallKind::GraphicsRequirements, sys::Result::ERROR_RUNTIME_FAILURE);
        let mut bootstrap = initialized(&runtime);
        let mut context = gles(3, 2);

        let err = bootstrap.init_session(&mut context).unwrap_err();

        assert_eq!(
            err,
            BootstrapError::GraphicsRequirements(sys::Result::ERROR_RUNTIME_FAILURE)
        );
        assert!(!context.is_destroyed());
        assert_eq!(bootstrap.phase(), BootstrapPhase::InstanceCreated);
    }

    #[test]
    fn session_creation_failure_is_reported() {
        let runtime = SimulatedRuntime::new()
            .fail_on(CallKind::CreateSession, sys::Result::ERROR_INITIALIZATION_FAILED);
        let mut bootstrap = initialized(&runtime);

        let err = bootstrap.init_session(&mut gles(3, 2)).unwrap_err();

        assert_eq!(
            err,
            BootstrapError::SessionCreation(sys::Result::ERROR_INITIALIZATION_FAILED)
        );
        assert!(!bootstrap.has_session());
        assert_eq!(runtime.count(CallKind::CreateReferenceSpace), 0);
    }

    #[test]
    fn newer_gles_than_required_is_accepted() {
        let runtime = SimulatedRuntime::new()
            .with_gles_requirements(Version::new(3, 0, 0), Version::new(3, 2, 0));
        let mut bootstrap = initialized(&runtime);

        bootstrap
            .init_session(&mut gles(3, 1))
            .expect("GLES 3.1 satisfies a 3.0 minimum");
        assert_eq!(bootstrap.phase(), BootstrapPhase::SessionInitialized);
    }

    #[test]
    fn zero_views_fail_and_unwind() {
        let runtime = SimulatedRuntime::new().with_views(
            ViewConfigurationType::PRIMARY_STEREO,
            0,
            0,
            0,
        );
        let mut bootstrap = initialized(&runtime);

        let err = bootstrap.init_session(&mut gles(3, 2)).unwrap_err();

        assert!(matches!(err, BootstrapError::NoViews(_)));
        assert_eq!(runtime.live_sessions(), 0);
        assert_eq!(runtime.live_spaces(), 0);
        assert_eq!(runtime.count(CallKind::CreateSwapchain), 0);
    }

    #[test]
    fn out_of_order_calls_do_not_reach_runtime() {
        let runtime = SimulatedRuntime::new();
        let mut bootstrap = XrBootstrap::new(runtime.clone(), BootstrapConfig::default());

        let err = bootstrap.start_session().unwrap_err();
        assert_eq!(
            err,
            BootstrapError::InvalidPhase {
                operation: "start_session",
                expected: BootstrapPhase::SessionInitialized,
                actual: BootstrapPhase::Uninitialized,
            }
        );
        assert!(bootstrap.init_session(&mut gles(3, 2)).is_err());
        assert!(bootstrap.end_session().is_err());
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn end_session_failure_keeps_session_active() {
        let runtime = SimulatedRuntime::new()
            .fail_on(CallKind::EndSession, sys::Result::ERROR_SESSION_NOT_READY);
        let mut bootstrap = initialized(&runtime);
        bootstrap.init_session(&mut gles(3, 2)).unwrap();
        bootstrap.start_session().unwrap();

        let err = bootstrap.end_session().unwrap_err();

        assert_eq!(err.code(), Some(sys::Result::ERROR_SESSION_NOT_READY));
        assert_eq!(bootstrap.phase(), BootstrapPhase::SessionActive);
        assert!(bootstrap.has_session());
    }

    #[test]
    fn invalid_config_is_rejected_before_runtime_calls() {
        let runtime = SimulatedRuntime::new();
        let mut config = BootstrapConfig::default();
        config.swapchain.array_size = 0;
        let mut bootstrap = XrBootstrap::new(runtime.clone(), config);

        let err = bootstrap
            .initialize(&PlatformContext::detached())
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::InvalidConfig(ref reason) if reason.contains("array_size")
        ));
        assert_eq!(bootstrap.phase(), BootstrapPhase::Uninitialized);
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn extra_extensions_must_be_offered_by_runtime() {
        let mut config = BootstrapConfig::default();
        config.extra_extensions = vec!["XR_EXT_hand_tracking".to_string()];

        let bare = SimulatedRuntime::new();
        let mut rejected = XrBootstrap::new(bare.clone(), config.clone());
        let err = rejected
            .initialize(&PlatformContext::detached())
            .unwrap_err();
        assert_eq!(
            err,
            BootstrapError::MissingExtensions(vec!["XR_EXT_hand_tracking".to_string()])
        );

        let runtime = SimulatedRuntime::new().with_extension("XR_EXT_hand_tracking");
        let mut accepted = XrBootstrap::new(runtime.clone(), config);
        accepted
            .initialize(&PlatformContext::detached())
            .expect("extension is available");
        let enabled = runtime
            .calls()
            .into_iter()
            .find_map(|call| match call {
                RuntimeCall::CreateInstance(info) => Some(info.enabled_extensions),
                _ => None,
            })
            .expect("instance should be created");
        assert!(enabled.contains(&"XR_EXT_hand_tracking".to_string()));
    }

    #[test]
    fn unexpected_view_count_still_builds_swapchain() {
        let runtime =
            SimulatedRuntime::new().with_views(ViewConfigurationType::PRIMARY_STEREO, 1, 800, 600);
        let mut bootstrap = initialized(&runtime);

        bootstrap
            .init_session(&mut gles(3, 2))
            .expect("single view is usable");

        let target = bootstrap.render_target().expect("render target");
        assert_eq!(target.n_views, 1);
        assert_eq!((target.width, target.height), (800, 600));
    }
}
