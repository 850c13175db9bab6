use super::{
    FormFactor, GraphicsBinding, GraphicsRequirements, InstanceCreateInfo, InstanceHandle,
    KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME, KHR_OPENGL_ES_ENABLE_EXTENSION_NAME,
    ReferenceSpaceCreateInfo, SessionCreateInfo, SessionHandle, SpaceHandle,
    SwapchainCreateInfo, SwapchainHandle, SwapchainImageOpenGlEs, SystemId, Version,
    ViewConfigurationType, ViewConfigurationView, XrResult, XrRuntime, sys,
};
use crate::gles::GL_SRGB8_ALPHA8;
use crate::platform::PlatformContext;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

const GL_RGBA8: i64 = 0x8058;
const FIRST_HANDLE: u64 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    InitializeLoader,
    EnumerateInstanceExtensions,
    CreateInstance,
    GetSystem,
    GraphicsRequirements,
    CreateSession,
    CreateReferenceSpace,
    EnumerateViewConfigurationViews,
    CreateSwapchain,
    EnumerateSwapchainImages,
    BeginSession,
    EndSession,
    DestroySwapchain,
    DestroySpace,
    DestroySession,
    DestroyInstance,
}

/// A call observed by [`SimulatedRuntime`], with the arguments that matter
/// for ordering and ownership checks.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    InitializeLoader {
        detached: bool,
    },
    EnumerateInstanceExtensions,
    CreateInstance(InstanceCreateInfo),
    GetSystem {
        instance: InstanceHandle,
        form_factor: FormFactor,
    },
    GraphicsRequirements {
        instance: InstanceHandle,
        system: SystemId,
    },
    CreateSession {
        instance: InstanceHandle,
        info: SessionCreateInfo,
    },
    CreateReferenceSpace {
        session: SessionHandle,
        info: ReferenceSpaceCreateInfo,
    },
    EnumerateViewConfigurationViews {
        view_configuration: ViewConfigurationType,
        capacity: Option<usize>,
    },
    CreateSwapchain {
        session: SessionHandle,
        info: SwapchainCreateInfo,
    },
    EnumerateSwapchainImages {
        swapchain: SwapchainHandle,
        capacity: Option<usize>,
    },
    BeginSession {
        session: SessionHandle,
        view_configuration: ViewConfigurationType,
    },
    EndSession {
        session: SessionHandle,
    },
    DestroySwapchain(SwapchainHandle),
    DestroySpace(SpaceHandle),
    DestroySession(SessionHandle),
    DestroyInstance(InstanceHandle),
}

impl RuntimeCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RuntimeCall::InitializeLoader { .. } => CallKind::InitializeLoader,
            RuntimeCall::EnumerateInstanceExtensions => CallKind::EnumerateInstanceExtensions,
            RuntimeCall::CreateInstance(_) => CallKind::CreateInstance,
            RuntimeCall::GetSystem { .. } => CallKind::GetSystem,
            RuntimeCall::GraphicsRequirements { .. } => CallKind::GraphicsRequirements,
            RuntimeCall::CreateSession { .. } => CallKind::CreateSession,
            RuntimeCall::CreateReferenceSpace { .. } => CallKind::CreateReferenceSpace,
            RuntimeCall::EnumerateViewConfigurationViews { .. } => {
                CallKind::EnumerateViewConfigurationViews
            }
            RuntimeCall::CreateSwapchain { .. } => CallKind::CreateSwapchain,
            RuntimeCall::EnumerateSwapchainImages { .. } => CallKind::EnumerateSwapchainImages,
            RuntimeCall::BeginSession { .. } => CallKind::BeginSession,
            RuntimeCall::EndSession { .. } => CallKind::EndSession,
            RuntimeCall::DestroySwapchain(_) => CallKind::DestroySwapchain,
            RuntimeCall::DestroySpace(_) => CallKind::DestroySpace,
            RuntimeCall::DestroySession(_) => CallKind::DestroySession,
            RuntimeCall::DestroyInstance(_) => CallKind::DestroyInstance,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScriptedFailure {
    kind: CallKind,
    /// 1-based occurrence to fail; `None` fails every call of that kind.
    occurrence: Option<usize>,
    code: sys::Result,
}

#[derive(Debug)]
struct LiveInstance {
    system: Option<SystemId>,
    requirements_queried: bool,
}

#[derive(Debug)]
struct LiveSession {
    instance: InstanceHandle,
    running: bool,
}

#[derive(Debug)]
struct SimulatedState {
    extensions: Vec<String>,
    loader_available: bool,
    requirements: GraphicsRequirements,
    view_configuration: ViewConfigurationType,
    views: Vec<ViewConfigurationView>,
    swapchain_images: Vec<u32>,
    failures: Vec<ScriptedFailure>,
    calls: Vec<RuntimeCall>,
    next_handle: u64,
    instances: BTreeMap<InstanceHandle, LiveInstance>,
    sessions: BTreeMap<SessionHandle, LiveSession>,
    spaces: BTreeMap<SpaceHandle, SessionHandle>,
    swapchains: BTreeMap<SwapchainHandle, (SessionHandle, Vec<u32>)>,
}

impl SimulatedState {
    fn record(&mut self, call: RuntimeCall) -> XrResult<()> {
        let kind = call.kind();
        self.calls.push(call);
        let occurrence = self.calls.iter().filter(|c| c.kind() == kind).count();
        let injected = self.failures.iter().find(|failure| {
            failure.kind == kind && failure.occurrence.is_none_or(|n| n == occurrence)
        });
        match injected {
            Some(failure) => Err(failure.code),
            None => Ok(()),
        }
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn instance(&mut self, handle: InstanceHandle) -> XrResult<&mut LiveInstance> {
        self.instances
            .get_mut(&handle)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn check_system(&mut self, instance: InstanceHandle, system: SystemId) -> XrResult<()> {
        match self.instance(instance)?.system {
            Some(known) if known == system => Ok(()),
            _ => Err(sys::Result::ERROR_SYSTEM_INVALID),
        }
    }

    fn session(&mut self, handle: SessionHandle) -> XrResult<&mut LiveSession> {
        self.sessions
            .get_mut(&handle)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn drop_session_children(&mut self, session: SessionHandle) {
        self.spaces.retain(|_, owner| *owner != session);
        self.swapchains.retain(|_, (owner, _)| *owner != session);
    }
}

fn fill<T: Copy>(source: &[T], buffer: Option<&mut [T]>) -> XrResult<u32> {
    let count = source.len() as u32;
    match buffer {
        None => Ok(count),
        Some(buffer) if buffer.len() < source.len() => Err(sys::Result::ERROR_SIZE_INSUFFICIENT),
        Some(buffer) => {
            buffer[..source.len()].copy_from_slice(source);
            Ok(count)
        }
    }
}

/// In-process OpenXR runtime with scripted capabilities and failures.
///
/// Clones share state, so a test can keep one clone to inspect the call log
/// while the bootstrapper owns another.
#[derive(Debug, Clone)]
pub struct SimulatedRuntime {
    state: Rc<RefCell<SimulatedState>>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        let eye = ViewConfigurationView::with_recommended_size(1440, 1600);
        Self {
            state: Rc::new(RefCell::new(SimulatedState {
                extensions: vec![
                    KHR_OPENGL_ES_ENABLE_EXTENSION_NAME.to_string(),
                    KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME.to_string(),
                ],
                loader_available: true,
                requirements: GraphicsRequirements {
                    min_api_version_supported: Version::new(3, 0, 0),
                    max_api_version_supported: Version::new(3, 2, 0),
                },
                view_configuration: ViewConfigurationType::PRIMARY_STEREO,
                views: vec![eye, eye],
                swapchain_images: vec![1, 2, 3],
                failures: Vec::new(),
                calls: Vec::new(),
                next_handle: FIRST_HANDLE,
                instances: BTreeMap::new(),
                sessions: BTreeMap::new(),
                spaces: BTreeMap::new(),
                swapchains: BTreeMap::new(),
            })),
        }
    }

    pub fn with_extension(self, name: impl Into<String>) -> Self {
        self.state.borrow_mut().extensions.push(name.into());
        self
    }

    pub fn without_extension(self, name: &str) -> Self {
        self.state.borrow_mut().extensions.retain(|ext| ext != name);
        self
    }

    pub fn with_loader_available(self, available: bool) -> Self {
        self.state.borrow_mut().loader_available = available;
        self
    }

    pub fn with_gles_requirements(self, min: Version, max: Version) -> Self {
        self.state.borrow_mut().requirements = GraphicsRequirements {
            min_api_version_supported: min,
            max_api_version_supported: max,
        };
        self
    }

    /// Reports `count` identical views of the given recommended size for
    /// `view_configuration`; other configurations are unsupported.
    pub fn with_views(
        self,
        view_configuration: ViewConfigurationType,
        count: usize,
        width: u32,
        height: u32,
    ) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.view_configuration = view_configuration;
            state.views = vec![ViewConfigurationView::with_recommended_size(width, height); count];
        }
        self
    }

    /// GL texture names handed out for every swapchain created.
    pub fn with_swapchain_images(self, images: Vec<u32>) -> Self {
        self.state.borrow_mut().swapchain_images = images;
        self
    }

    /// Fails every call of `kind` with `code`.
    pub fn fail_on(self, kind: CallKind, code: sys::Result) -> Self {
        self.state.borrow_mut().failures.push(ScriptedFailure {
            kind,
            occurrence: None,
            code,
        });
        self
    }

    /// Fails only the `occurrence`-th call (1-based) of `kind`.
    pub fn fail_on_nth(self, kind: CallKind, occurrence: usize, code: sys::Result) -> Self {
        self.state.borrow_mut().failures.push(ScriptedFailure {
            kind,
            occurrence: Some(occurrence),
            code,
        });
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.borrow().calls.clone()
    }

    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.state.borrow().calls.iter().map(RuntimeCall::kind).collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    pub fn live_instances(&self) -> usize {
        self.state.borrow().instances.len()
    }

    pub fn live_sessions(&self) -> usize {
        self.state.borrow().sessions.len()
    }

    pub fn live_spaces(&self) -> usize {
        self.state.borrow().spaces.len()
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.borrow().swapchains.len()
    }

    pub fn is_running(&self, session: SessionHandle) -> bool {
        self.state
            .borrow()
            .sessions
            .get(&session)
            .is_some_and(|live| live.running)
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl XrRuntime for SimulatedRuntime {
    fn label(&self) -> &'static str {
        "Simulated OpenXR runtime"
    }

    fn initialize_loader(&self, platform: &PlatformContext) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::InitializeLoader {
            detached: platform.is_detached(),
        })?;
        if !state.loader_available {
            return Err(sys::Result::ERROR_FUNCTION_UNSUPPORTED);
        }
        Ok(())
    }

    fn enumerate_instance_extensions(&self) -> XrResult<Vec<String>> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::EnumerateInstanceExtensions)?;
        Ok(state.extensions.clone())
    }

    fn create_instance(&self, info: &InstanceCreateInfo) -> XrResult<InstanceHandle> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::CreateInstance(info.clone()))?;
        if info
            .enabled_extensions
            .iter()
            .any(|name| !state.extensions.contains(name))
        {
            return Err(sys::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        if info.api_version.major() != 1 {
            return Err(sys::Result::ERROR_API_VERSION_UNSUPPORTED);
        }
        let handle = InstanceHandle::from_raw(state.next_handle());
        state.instances.insert(
            handle,
            LiveInstance {
                system: None,
                requirements_queried: false,
            },
        );
        Ok(handle)
    }

    fn system(&self, instance: InstanceHandle, form_factor: FormFactor) -> XrResult<SystemId> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::GetSystem {
            instance,
            form_factor,
        })?;
        if form_factor != FormFactor::HEAD_MOUNTED_DISPLAY {
            return Err(sys::Result::ERROR_FORM_FACTOR_UNSUPPORTED);
        }
        let system = SystemId::from_raw(state.next_handle());
        state.instance(instance)?.system = Some(system);
        Ok(system)
    }

    fn opengles_graphics_requirements(
        &self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> XrResult<GraphicsRequirements> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::GraphicsRequirements { instance, system })?;
        state.check_system(instance, system)?;
        state.instance(instance)?.requirements_queried = true;
        Ok(state.requirements)
    }

    fn create_session(
        &self,
        instance: InstanceHandle,
        info: &SessionCreateInfo,
    ) -> XrResult<SessionHandle> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::CreateSession {
            instance,
            info: *info,
        })?;
        state.check_system(instance, info.system_id)?;
        if !state.instance(instance)?.requirements_queried {
            return Err(sys::Result::ERROR_GRAPHICS_REQUIREMENTS_CALL_MISSING);
        }
        match info.binding {
            GraphicsBinding::OpenGlEsAndroid(handles) if !handles.is_complete() => {
                return Err(sys::Result::ERROR_GRAPHICS_DEVICE_INVALID);
            }
            GraphicsBinding::OpenGlEsAndroid(_) => {}
        }
        let handle = SessionHandle::from_raw(state.next_handle());
        state.sessions.insert(
            handle,
            LiveSession {
                instance,
                running: false,
            },
        );
        Ok(handle)
    }

    fn create_reference_space(
        &self,
        session: SessionHandle,
        info: &ReferenceSpaceCreateInfo,
    ) -> XrResult<SpaceHandle> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::CreateReferenceSpace {
            session,
            info: *info,
        })?;
        state.session(session)?;
        let handle = SpaceHandle::from_raw(state.next_handle());
        state.spaces.insert(handle, session);
        Ok(handle)
    }

    fn enumerate_view_configuration_views(
        &self,
        instance: InstanceHandle,
        system: SystemId,
        view_configuration: ViewConfigurationType,
        views: Option<&mut [ViewConfigurationView]>,
    ) -> XrResult<u32> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::EnumerateViewConfigurationViews {
            view_configuration,
            capacity: views.as_ref().map(|buffer| buffer.len()),
        })?;
        state.check_system(instance, system)?;
        if view_configuration != state.view_configuration {
            return Err(sys::Result::ERROR_VIEW_CONFIGURATION_TYPE_UNSUPPORTED);
        }
        fill(&state.views, views)
    }

    fn create_swapchain(
        &self,
        session: SessionHandle,
        info: &SwapchainCreateInfo,
    ) -> XrResult<SwapchainHandle> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::CreateSwapchain {
            session,
            info: *info,
        })?;
        state.session(session)?;
        if info.format != GL_SRGB8_ALPHA8 && info.format != GL_RGBA8 {
            return Err(sys::Result::ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED);
        }
        if info.width == 0 || info.height == 0 || info.array_size == 0 {
            return Err(sys::Result::ERROR_VALIDATION_FAILURE);
        }
        let handle = SwapchainHandle::from_raw(state.next_handle());
        let images = state.swapchain_images.clone();
        state.swapchains.insert(handle, (session, images));
        Ok(handle)
    }

    fn enumerate_swapchain_images(
        &self,
        swapchain: SwapchainHandle,
        images: Option<&mut [SwapchainImageOpenGlEs]>,
    ) -> XrResult<u32> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::EnumerateSwapchainImages {
            swapchain,
            capacity: images.as_ref().map(|buffer| buffer.len()),
        })?;
        let textures: Vec<SwapchainImageOpenGlEs> = state
            .swapchains
            .get(&swapchain)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?
            .1
            .iter()
            .map(|&image| SwapchainImageOpenGlEs { image })
            .collect();
        fill(&textures, images)
    }

    fn begin_session(
        &self,
        session: SessionHandle,
        view_configuration: ViewConfigurationType,
    ) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::BeginSession {
            session,
            view_configuration,
        })?;
        if view_configuration != state.view_configuration {
            return Err(sys::Result::ERROR_VIEW_CONFIGURATION_TYPE_UNSUPPORTED);
        }
        let live = state.session(session)?;
        if live.running {
            return Err(sys::Result::ERROR_SESSION_RUNNING);
        }
        live.running = true;
        Ok(())
    }

    fn end_session(&self, session: SessionHandle) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::EndSession { session })?;
        let live = state.session(session)?;
        if !live.running {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        live.running = false;
        Ok(())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::DestroySwapchain(swapchain))?;
        state
            .swapchains
            .remove(&swapchain)
            .map(|_| ())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn destroy_space(&self, space: SpaceHandle) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::DestroySpace(space))?;
        state
            .spaces
            .remove(&space)
            .map(|_| ())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn destroy_session(&self, session: SessionHandle) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::DestroySession(session))?;
        state
            .sessions
            .remove(&session)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        state.drop_session_children(session);
        Ok(())
    }

    fn destroy_instance(&self, instance: InstanceHandle) -> XrResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(RuntimeCall::DestroyInstance(instance))?;
        state
            .instances
            .remove(&instance)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        let orphaned: BTreeSet<SessionHandle> = state
            .sessions
            .iter()
            .filter(|(_, live)| live.instance == instance)
            .map(|(handle, _)| *handle)
            .collect();
        for session in orphaned {
            state.sessions.remove(&session);
            state.drop_session_children(session);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::EglHandles;
    use crate::vr::{ReferenceSpaceType, enumerate_two_call};
    use std::ffi::c_void;

    fn create_info() -> InstanceCreateInfo {
        InstanceCreateInfo {
            application_name: "test".to_string(),
            application_version: 1,
            engine_name: "test".to_string(),
            engine_version: 1,
            api_version: Version::new(1, 0, 0),
            enabled_extensions: vec![KHR_OPENGL_ES_ENABLE_EXTENSION_NAME.to_string()],
            android: None,
        }
    }

    fn fake_egl() -> EglHandles {
        EglHandles::new(
            0x10 as *mut c_void,
            0x20 as *mut c_void,
            0x30 as *mut c_void,
        )
    }

    #[test]
    fn session_creation_requires_graphics_requirements_query() {
        let runtime = SimulatedRuntime::new();
        let instance = runtime.create_instance(&create_info()).unwrap();
        let system = runtime
            .system(instance, FormFactor::HEAD_MOUNTED_DISPLAY)
            .unwrap();
        let info = SessionCreateInfo {
            system_id: system,
            binding: GraphicsBinding::OpenGlEsAndroid(fake_egl()),
        };

        assert_eq!(
            runtime.create_session(instance, &info),
            Err(sys::Result::ERROR_GRAPHICS_REQUIREMENTS_CALL_MISSING)
        );

        runtime
            .opengles_graphics_requirements(instance, system)
            .unwrap();
        assert!(runtime.create_session(instance, &info).is_ok());
        assert_eq!(runtime.live_sessions(), 1);
    }

    #[test]
    fn undersized_buffers_are_rejected() {
        let runtime = SimulatedRuntime::new();
        let instance = runtime.create_instance(&create_info()).unwrap();
        let system = runtime
            .system(instance, FormFactor::HEAD_MOUNTED_DISPLAY)
            .unwrap();
        let mut buffer = [ViewConfigurationView::default(); 1];

        let result = runtime.enumerate_view_configuration_views(
            instance,
            system,
            ViewConfigurationType::PRIMARY_STEREO,
            Some(&mut buffer),
        );
        assert_eq!(result, Err(sys::Result::ERROR_SIZE_INSUFFICIENT));

        let views = enumerate_two_call(|buffer| {
            runtime.enumerate_view_configuration_views(
                instance,
                system,
                ViewConfigurationType::PRIMARY_STEREO,
                buffer,
            )
        })
        .unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].recommended_image_rect_width, 1440);
    }

    #[test]
    fn nth_failure_only_hits_that_occurrence() {
        let runtime = SimulatedRuntime::new().fail_on_nth(
            CallKind::EnumerateInstanceExtensions,
            2,
            sys::Result::ERROR_RUNTIME_FAILURE,
        );

        assert!(runtime.enumerate_instance_extensions().is_ok());
        assert_eq!(
            runtime.enumerate_instance_extensions(),
            Err(sys::Result::ERROR_RUNTIME_FAILURE)
        );
        assert!(runtime.enumerate_instance_extensions().is_ok());
    }

    #[test]
    fn destroying_instance_reclaims_children() {
        let runtime = SimulatedRuntime::new();
        let instance = runtime.create_instance(&create_info()).unwrap();
        let system = runtime
            .system(instance, FormFactor::HEAD_MOUNTED_DISPLAY)
            .unwrap();
        runtime
            .opengles_graphics_requirements(instance, system)
            .unwrap();
        let session = runtime
            .create_session(
                instance,
                &SessionCreateInfo {
                    system_id: system,
                    binding: GraphicsBinding::OpenGlEsAndroid(fake_egl()),
                },
            )
            .unwrap();
        runtime
            .create_reference_space(
                session,
                &ReferenceSpaceCreateInfo::identity(ReferenceSpaceType::STAGE),
            )
            .unwrap();

        runtime.destroy_instance(instance).unwrap();

        assert_eq!(runtime.live_instances(), 0);
        assert_eq!(runtime.live_sessions(), 0);
        assert_eq!(runtime.live_spaces(), 0);
        assert_eq!(
            runtime.destroy_instance(instance),
            Err(sys::Result::ERROR_HANDLE_INVALID)
        );
    }
}
