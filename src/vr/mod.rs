#[cfg(all(feature = "vr-openxr", target_os = "android"))]
pub mod openxr;
pub mod simulated;
mod types;

pub use openxr_sys as sys;
pub use simulated::{CallKind, RuntimeCall, SimulatedRuntime};
pub use sys::{
    FormFactor, Posef, ReferenceSpaceType, SwapchainUsageFlags, Version, ViewConfigurationType,
};
pub use types::*;

/// Outcome of a runtime call. Failures carry the runtime's result code.
pub type XrResult<T> = Result<T, sys::Result>;

use crate::platform::PlatformContext;

/// The OpenXR entry points the bootstrapper drives.
///
/// Enumerations follow the two-call idiom of the native API: passing `None`
/// asks for the element count, passing a buffer fills it and returns how
/// many elements were written.
///
/// Methods take `&self`; implementations keep their bookkeeping behind
/// interior mutability and are expected to be driven from a single thread.
pub trait XrRuntime {
    fn label(&self) -> &'static str;

    fn initialize_loader(&self, platform: &PlatformContext) -> XrResult<()>;
    fn enumerate_instance_extensions(&self) -> XrResult<Vec<String>>;
    fn create_instance(&self, info: &InstanceCreateInfo) -> XrResult<InstanceHandle>;
    fn system(&self, instance: InstanceHandle, form_factor: FormFactor) -> XrResult<SystemId>;
    fn opengles_graphics_requirements(
        &self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> XrResult<GraphicsRequirements>;

    fn create_session(
        &self,
        instance: InstanceHandle,
        info: &SessionCreateInfo,
    ) -> XrResult<SessionHandle>;
    fn create_reference_space(
        &self,
        session: SessionHandle,
        info: &ReferenceSpaceCreateInfo,
    ) -> XrResult<SpaceHandle>;
    fn enumerate_view_configuration_views(
        &self,
        instance: InstanceHandle,
        system: SystemId,
        view_configuration: ViewConfigurationType,
        views: Option<&mut [ViewConfigurationView]>,
    ) -> XrResult<u32>;
    fn create_swapchain(
        &self,
        session: SessionHandle,
        info: &SwapchainCreateInfo,
    ) -> XrResult<SwapchainHandle>;
    fn enumerate_swapchain_images(
        &self,
        swapchain: SwapchainHandle,
        images: Option<&mut [SwapchainImageOpenGlEs]>,
    ) -> XrResult<u32>;

    fn begin_session(
        &self,
        session: SessionHandle,
        view_configuration: ViewConfigurationType,
    ) -> XrResult<()>;
    fn end_session(&self, session: SessionHandle) -> XrResult<()>;

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> XrResult<()>;
    fn destroy_space(&self, space: SpaceHandle) -> XrResult<()>;
    fn destroy_session(&self, session: SessionHandle) -> XrResult<()>;
    fn destroy_instance(&self, instance: InstanceHandle) -> XrResult<()>;
}

/// Runs a two-call enumeration: query the count, allocate default
/// elements, then fill them.
pub fn enumerate_two_call<T, F>(mut call: F) -> XrResult<Vec<T>>
where
    T: Clone + Default,
    F: FnMut(Option<&mut [T]>) -> XrResult<u32>,
{
    let count = call(None)?;
    let mut items = vec![T::default(); count as usize];
    let written = call(Some(&mut items))?;
    items.truncate(written as usize);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_call_enumeration_sizes_buffer_from_first_call() {
        let source = [7u32, 8, 9];
        let mut capacities = Vec::new();
        let items = enumerate_two_call(|buffer: Option<&mut [u32]>| {
            capacities.push(buffer.as_ref().map(|b| b.len()));
            match buffer {
                None => Ok(source.len() as u32),
                Some(buffer) => {
                    buffer.copy_from_slice(&source);
                    Ok(source.len() as u32)
                }
            }
        })
        .unwrap();

        assert_eq!(items, vec![7, 8, 9]);
        assert_eq!(capacities, vec![None, Some(3)]);
    }

    #[test]
    fn two_call_enumeration_stops_at_first_failure() {
        let mut calls = 0;
        let result = enumerate_two_call(|_: Option<&mut [u32]>| {
            calls += 1;
            Err(sys::Result::ERROR_RUNTIME_FAILURE)
        });

        assert_eq!(result, Err(sys::Result::ERROR_RUNTIME_FAILURE));
        assert_eq!(calls, 1);
    }
}
