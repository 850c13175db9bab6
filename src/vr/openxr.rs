use super::{
    AndroidCreateInfo, FormFactor, GraphicsBinding, GraphicsRequirements, InstanceCreateInfo,
    InstanceHandle, ReferenceSpaceCreateInfo, SessionCreateInfo, SessionHandle, SpaceHandle,
    SwapchainCreateInfo, SwapchainHandle, SwapchainImageOpenGlEs, SystemId,
    ViewConfigurationType, ViewConfigurationView, XrResult, XrRuntime, sys,
};
use crate::platform::PlatformContext;
use openxr::{self as xr, Entry, ExtensionSet, InstanceExtensions};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CString, c_char};
use std::ptr;

fn check(result: sys::Result) -> XrResult<()> {
    if result.into_raw() >= 0 {
        Ok(())
    } else {
        Err(result)
    }
}

fn attached(platform: &PlatformContext) -> PlatformContext {
    if platform.is_detached() {
        PlatformContext::from_ndk_context()
    } else {
        *platform
    }
}

/// Copies `text` into a fixed-size, nul-terminated name field.
fn place_name(field: &mut [c_char], text: &str) -> XrResult<()> {
    let bytes = text.as_bytes();
    if bytes.len() >= field.len() || bytes.contains(&0) {
        return Err(sys::Result::ERROR_NAME_INVALID);
    }
    for (slot, &byte) in field.iter_mut().zip(bytes) {
        *slot = byte as c_char;
    }
    field[bytes.len()] = 0;
    Ok(())
}

fn read_name(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extension set the `openxr` wrapper loads function tables for.
fn required_extensions(names: &[String]) -> ExtensionSet {
    let mut set = ExtensionSet::default();
    for name in names {
        match name.as_str() {
            super::KHR_OPENGL_ES_ENABLE_EXTENSION_NAME => set.khr_opengl_es_enable = true,
            super::KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME => {
                set.khr_android_create_instance = true
            }
            other => set.other.push(other.to_string()),
        }
    }
    set
}

struct LiveSession {
    session: xr::Session<xr::OpenGlEs>,
    frame_loop: Option<(xr::FrameWaiter, xr::FrameStream<xr::OpenGlEs>)>,
}

#[derive(Default)]
struct Objects {
    instance: Option<xr::Instance>,
    sessions: HashMap<SessionHandle, LiveSession>,
    spaces: HashMap<SpaceHandle, xr::Space>,
    swapchains: HashMap<SwapchainHandle, xr::Swapchain<xr::OpenGlEs>>,
}

impl Objects {
    fn instance(&self, handle: InstanceHandle) -> XrResult<&xr::Instance> {
        self.instance
            .as_ref()
            .filter(|instance| instance.as_raw().into_raw() == handle.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn session(&self, handle: SessionHandle) -> XrResult<&xr::Session<xr::OpenGlEs>> {
        self.sessions
            .get(&handle)
            .map(|live| &live.session)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }
}

/// [`XrRuntime`] backed by the system OpenXR loader through the `openxr`
/// crate. Handles handed out are the raw OpenXR handle values; the wrapped
/// objects are destroyed when the matching `destroy_*` call drops them.
pub struct OpenXrRuntime {
    entry: Entry,
    objects: RefCell<Objects>,
}

impl OpenXrRuntime {
    pub fn load() -> Result<Self, xr::LoadError> {
        let entry = unsafe { Entry::load()? };
        Ok(Self {
            entry,
            objects: RefCell::new(Objects::default()),
        })
    }

    pub fn instance(&self) -> Option<xr::Instance> {
        self.objects.borrow().instance.clone()
    }

    pub fn session(&self, handle: SessionHandle) -> Option<xr::Session<xr::OpenGlEs>> {
        self.objects.borrow().session(handle).ok().cloned()
    }

    /// Hands the frame waiter and stream of `handle` to the render loop.
    /// Available once per session.
    pub fn take_frame_loop(
        &self,
        handle: SessionHandle,
    ) -> Option<(xr::FrameWaiter, xr::FrameStream<xr::OpenGlEs>)> {
        self.objects
            .borrow_mut()
            .sessions
            .get_mut(&handle)
            .and_then(|live| live.frame_loop.take())
    }

    /// Destroys an instance the `openxr` wrapper never took ownership of.
    fn destroy_raw_instance(&self, instance: sys::Instance) {
        let mut function = None;
        // SAFETY: `instance` is a live handle owned by nobody else, and the
        // resolved pointer has the xrDestroyInstance signature.
        unsafe {
            let resolved = (self.entry.fp().get_instance_proc_addr)(
                instance,
                c"xrDestroyInstance".as_ptr(),
                &mut function,
            );
            match (check(resolved), function) {
                (Ok(()), Some(function)) => {
                    let destroy: sys::pfn::DestroyInstance = std::mem::transmute(function);
                    if let Err(code) = check(destroy(instance)) {
                        log::warn!("[xr] xrDestroyInstance failed: {code:?}");
                    }
                }
                (result, _) => {
                    log::warn!("[xr] xrDestroyInstance unavailable: {result:?}");
                }
            }
        }
    }
}

impl XrRuntime for OpenXrRuntime {
    fn label(&self) -> &'static str {
        "OpenXR"
    }

    fn initialize_loader(&self, platform: &PlatformContext) -> XrResult<()> {
        let platform = attached(platform);
        // SAFETY: xrInitializeLoaderKHR is resolved without an instance, and
        // the JNI handles stay valid for the lifetime of the activity.
        unsafe {
            let loader_init = xr::raw::LoaderInitKHR::load(&self.entry, sys::Instance::NULL)?;
            let info = sys::LoaderInitInfoAndroidKHR {
                ty: sys::LoaderInitInfoAndroidKHR::TYPE,
                next: ptr::null(),
                application_vm: platform.vm,
                application_context: platform.activity,
            };
            check((loader_init.initialize_loader)(
                &info as *const _ as *const sys::LoaderInitInfoBaseHeaderKHR,
            ))
        }
    }

    fn enumerate_instance_extensions(&self) -> XrResult<Vec<String>> {
        let enumerate = self.entry.fp().enumerate_instance_extension_properties;
        let blank = sys::ExtensionProperties {
            ty: sys::ExtensionProperties::TYPE,
            next: ptr::null_mut(),
            extension_name: [0; sys::MAX_EXTENSION_NAME_SIZE],
            extension_version: 0,
        };
        let mut count = 0u32;
        // SAFETY: the buffer holds `count` initialized elements and the
        // runtime writes at most that many.
        let properties = unsafe {
            check(enumerate(ptr::null(), 0, &mut count, ptr::null_mut()))?;
            let mut properties = vec![blank; count as usize];
            check(enumerate(
                ptr::null(),
                count,
                &mut count,
                properties.as_mut_ptr(),
            ))?;
            properties.truncate(count as usize);
            properties
        };
        Ok(properties
            .iter()
            .map(|property| read_name(&property.extension_name))
            .collect())
    }

    fn create_instance(&self, info: &InstanceCreateInfo) -> XrResult<InstanceHandle> {
        let mut objects = self.objects.borrow_mut();
        if objects.instance.is_some() {
            return Err(sys::Result::ERROR_LIMIT_REACHED);
        }

        let extension_names = info
            .enabled_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| sys::Result::ERROR_NAME_INVALID)?;
        let extension_ptrs: Vec<*const c_char> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let android_chain = info.android.as_ref().map(|android| {
            let platform = attached(&PlatformContext::new(
                android.application_vm,
                android.application_activity,
            ));
            let android = AndroidCreateInfo::from(&platform);
            sys::InstanceCreateInfoAndroidKHR {
                ty: sys::InstanceCreateInfoAndroidKHR::TYPE,
                next: ptr::null(),
                application_vm: android.application_vm,
                application_activity: android.application_activity,
            }
        });

        let mut create_info = sys::InstanceCreateInfo {
            ty: sys::InstanceCreateInfo::TYPE,
            next: android_chain
                .as_ref()
                .map_or(ptr::null(), |chain| chain as *const _ as *const _),
            create_flags: sys::InstanceCreateFlags::EMPTY,
            application_info: sys::ApplicationInfo {
                application_name: [0; sys::MAX_APPLICATION_NAME_SIZE],
                application_version: info.application_version,
                engine_name: [0; sys::MAX_ENGINE_NAME_SIZE],
                engine_version: info.engine_version,
                api_version: info.api_version,
            },
            enabled_api_layer_count: 0,
            enabled_api_layer_names: ptr::null(),
            enabled_extension_count: extension_ptrs.len() as u32,
            enabled_extension_names: extension_ptrs.as_ptr(),
        };
        place_name(
            &mut create_info.application_info.application_name,
            &info.application_name,
        )?;
        place_name(
            &mut create_info.application_info.engine_name,
            &info.engine_name,
        )?;

        let mut raw = sys::Instance::NULL;
        // SAFETY: every pointer in `create_info` borrows locals that outlive
        // the call.
        unsafe {
            check((self.entry.fp().create_instance)(&create_info, &mut raw))?;
        }

        let required = required_extensions(&info.enabled_extensions);
        // SAFETY: `raw` was just created with `required` enabled.
        let wrapped = unsafe {
            InstanceExtensions::load(&self.entry, raw, &required)
                .and_then(|exts| xr::Instance::from_raw(self.entry.clone(), raw, exts))
        };
        let instance = match wrapped {
            Ok(instance) => instance,
            Err(err) => {
                self.destroy_raw_instance(raw);
                return Err(err);
            }
        };

        let handle = InstanceHandle::from_raw(instance.as_raw().into_raw());
        objects.instance = Some(instance);
        Ok(handle)
    }

    fn system(&self, instance: InstanceHandle, form_factor: FormFactor) -> XrResult<SystemId> {
        let objects = self.objects.borrow();
        let system = objects.instance(instance)?.system(form_factor)?;
        Ok(SystemId::from_raw(system.into_raw()))
    }

    fn opengles_graphics_requirements(
        &self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> XrResult<GraphicsRequirements> {
        let objects = self.objects.borrow();
        let requirements = objects
            .instance(instance)?
            .graphics_requirements::<xr::OpenGlEs>(sys::SystemId::from_raw(system.into_raw()))?;
        Ok(GraphicsRequirements {
            min_api_version_supported: requirements.min_api_version_supported,
            max_api_version_supported: requirements.max_api_version_supported,
        })
    }

    fn create_session(
        &self,
        instance: InstanceHandle,
        info: &SessionCreateInfo,
    ) -> XrResult<SessionHandle> {
        let mut objects = self.objects.borrow_mut();
        let GraphicsBinding::OpenGlEsAndroid(egl) = info.binding;
        let create_info = xr::opengles::SessionCreateInfo::Android {
            display: egl.display,
            config: egl.config,
            context: egl.context,
        };
        let system = sys::SystemId::from_raw(info.system_id.into_raw());
        // SAFETY: the EGL handles come from the host's live context, which
        // outlives the session.
        let (session, frame_waiter, frame_stream) = unsafe {
            objects
                .instance(instance)?
                .create_session::<xr::OpenGlEs>(system, &create_info)?
        };

        let handle = SessionHandle::from_raw(session.as_raw().into_raw());
        objects.sessions.insert(
            handle,
            LiveSession {
                session,
                frame_loop: Some((frame_waiter, frame_stream)),
            },
        );
        Ok(handle)
    }

    fn create_reference_space(
        &self,
        session: SessionHandle,
        info: &ReferenceSpaceCreateInfo,
    ) -> XrResult<SpaceHandle> {
        let mut objects = self.objects.borrow_mut();
        let space = objects
            .session(session)?
            .create_reference_space(info.reference_space_type, info.pose_in_reference_space)?;
        let handle = SpaceHandle::from_raw(space.as_raw().into_raw());
        objects.spaces.insert(handle, space);
        Ok(handle)
    }

    fn enumerate_view_configuration_views(
        &self,
        instance: InstanceHandle,
        system: SystemId,
        configuration: ViewConfigurationType,
        views: Option<&mut [ViewConfigurationView]>,
    ) -> XrResult<u32> {
        let objects = self.objects.borrow();
        let reported = objects.instance(instance)?.enumerate_view_configuration_views(
            sys::SystemId::from_raw(system.into_raw()),
            configuration,
        )?;

        let Some(views) = views else {
            return Ok(reported.len() as u32);
        };
        if views.len() < reported.len() {
            return Err(sys::Result::ERROR_SIZE_INSUFFICIENT);
        }
        for (slot, view) in views.iter_mut().zip(&reported) {
            *slot = ViewConfigurationView {
                recommended_image_rect_width: view.recommended_image_rect_width,
                max_image_rect_width: view.max_image_rect_width,
                recommended_image_rect_height: view.recommended_image_rect_height,
                max_image_rect_height: view.max_image_rect_height,
                recommended_swapchain_sample_count: view.recommended_swapchain_sample_count,
                max_swapchain_sample_count: view.max_swapchain_sample_count,
            };
        }
        Ok(reported.len() as u32)
    }

    fn create_swapchain(
        &self,
        session: SessionHandle,
        info: &SwapchainCreateInfo,
    ) -> XrResult<SwapchainHandle> {
        let mut objects = self.objects.borrow_mut();
        let format = u32::try_from(info.format)
            .map_err(|_| sys::Result::ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED)?;
        let swapchain = objects.session(session)?.create_swapchain(&xr::SwapchainCreateInfo {
            create_flags: xr::SwapchainCreateFlags::EMPTY,
            usage_flags: info.usage_flags,
            format,
            sample_count: info.sample_count,
            width: info.width,
            height: info.height,
            face_count: info.face_count,
            array_size: info.array_size,
            mip_count: info.mip_count,
        })?;
        let handle = SwapchainHandle::from_raw(swapchain.as_raw().into_raw());
        objects.swapchains.insert(handle, swapchain);
        Ok(handle)
    }

    fn enumerate_swapchain_images(
        &self,
        swapchain: SwapchainHandle,
        images: Option<&mut [SwapchainImageOpenGlEs]>,
    ) -> XrResult<u32> {
        let objects = self.objects.borrow();
        let reported = objects
            .swapchains
            .get(&swapchain)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?
            .enumerate_images()?;

        let Some(images) = images else {
            return Ok(reported.len() as u32);
        };
        if images.len() < reported.len() {
            return Err(sys::Result::ERROR_SIZE_INSUFFICIENT);
        }
        for (slot, &image) in images.iter_mut().zip(&reported) {
            slot.image = image;
        }
        Ok(reported.len() as u32)
    }

    fn begin_session(
        &self,
        session: SessionHandle,
        configuration: ViewConfigurationType,
    ) -> XrResult<()> {
        let objects = self.objects.borrow();
        objects.session(session)?.begin(configuration).map(|_| ())
    }

    fn end_session(&self, session: SessionHandle) -> XrResult<()> {
        let objects = self.objects.borrow();
        objects.session(session)?.end().map(|_| ())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> XrResult<()> {
        self.objects
            .borrow_mut()
            .swapchains
            .remove(&swapchain)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn destroy_space(&self, space: SpaceHandle) -> XrResult<()> {
        self.objects
            .borrow_mut()
            .spaces
            .remove(&space)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn destroy_session(&self, session: SessionHandle) -> XrResult<()> {
        self.objects
            .borrow_mut()
            .sessions
            .remove(&session)
            .map(drop)
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)
    }

    fn destroy_instance(&self, instance: InstanceHandle) -> XrResult<()> {
        let mut objects = self.objects.borrow_mut();
        objects.instance(instance)?;
        objects.swapchains.clear();
        objects.spaces.clear();
        objects.sessions.clear();
        objects.instance = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_extensions_enable_gles_and_android_instance() {
        let set = required_extensions(&[
            "XR_KHR_opengl_es_enable".to_string(),
            "XR_KHR_android_create_instance".to_string(),
            "XR_EXT_hand_tracking".to_string(),
        ]);
        assert!(set.khr_opengl_es_enable);
        assert!(set.khr_android_create_instance);
        assert_eq!(set.other, vec!["XR_EXT_hand_tracking".to_string()]);
    }

    #[test]
    fn names_are_nul_terminated_and_bounded() {
        let mut field = [0x7f as c_char; 8];
        place_name(&mut field, "HelloXR").unwrap();
        assert_eq!(read_name(&field), "HelloXR");
        assert_eq!(
            place_name(&mut field, "TooLongXR"),
            Err(sys::Result::ERROR_NAME_INVALID)
        );
    }
}
