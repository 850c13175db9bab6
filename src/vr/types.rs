use super::{Posef, ReferenceSpaceType, SwapchainUsageFlags, Version, ViewConfigurationType};
use crate::gles::EglHandles;
use crate::platform::PlatformContext;
use std::fmt;

pub const KHR_OPENGL_ES_ENABLE_EXTENSION_NAME: &str = "XR_KHR_opengl_es_enable";
pub const KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME: &str = "XR_KHR_android_create_instance";

macro_rules! xr_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn into_raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

xr_handle!(
    /// Connection to the OpenXR runtime.
    InstanceHandle
);
xr_handle!(
    /// Physical device class selected from the runtime. Only meaningful
    /// alongside the instance it was queried from.
    SystemId
);
xr_handle!(SessionHandle);
xr_handle!(SpaceHandle);
xr_handle!(SwapchainHandle);

/// Number of views a primary view configuration renders, when the
/// configuration has a fixed count.
pub fn expected_view_count(view_configuration: ViewConfigurationType) -> Option<usize> {
    match view_configuration {
        ViewConfigurationType::PRIMARY_MONO => Some(1),
        ViewConfigurationType::PRIMARY_STEREO => Some(2),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidCreateInfo {
    pub application_vm: *mut std::ffi::c_void,
    pub application_activity: *mut std::ffi::c_void,
}

impl From<&PlatformContext> for AndroidCreateInfo {
    fn from(platform: &PlatformContext) -> Self {
        Self {
            application_vm: platform.vm,
            application_activity: platform.activity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceCreateInfo {
    pub application_name: String,
    pub application_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: Version,
    pub enabled_extensions: Vec<String>,
    pub android: Option<AndroidCreateInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsRequirements {
    pub min_api_version_supported: Version,
    pub max_api_version_supported: Version,
}

/// Graphics API binding chained onto session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsBinding {
    OpenGlEsAndroid(EglHandles),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCreateInfo {
    pub system_id: SystemId,
    pub binding: GraphicsBinding,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSpaceCreateInfo {
    pub reference_space_type: ReferenceSpaceType,
    pub pose_in_reference_space: Posef,
}

impl ReferenceSpaceCreateInfo {
    pub fn identity(reference_space_type: ReferenceSpaceType) -> Self {
        Self {
            reference_space_type,
            pose_in_reference_space: Posef::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewConfigurationView {
    pub recommended_image_rect_width: u32,
    pub max_image_rect_width: u32,
    pub recommended_image_rect_height: u32,
    pub max_image_rect_height: u32,
    pub recommended_swapchain_sample_count: u32,
    pub max_swapchain_sample_count: u32,
}

impl ViewConfigurationView {
    pub fn with_recommended_size(width: u32, height: u32) -> Self {
        Self {
            recommended_image_rect_width: width,
            max_image_rect_width: width,
            recommended_image_rect_height: height,
            max_image_rect_height: height,
            recommended_swapchain_sample_count: 1,
            max_swapchain_sample_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    pub usage_flags: SwapchainUsageFlags,
    pub format: i64,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub face_count: u32,
    pub array_size: u32,
    pub mip_count: u32,
}

/// One GL texture name owned by the runtime's swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwapchainImageOpenGlEs {
    pub image: u32,
}
