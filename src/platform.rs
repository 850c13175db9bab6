use std::ffi::c_void;
use std::ptr;

/// JNI handles the Android OpenXR loader and instance extensions need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformContext {
    /// `JavaVM*` of the host process.
    pub vm: *mut c_void,
    /// `jobject` of the hosting activity.
    pub activity: *mut c_void,
}

impl PlatformContext {
    pub fn new(vm: *mut c_void, activity: *mut c_void) -> Self {
        Self { vm, activity }
    }

    /// Context without JNI handles, for desktop runtimes and tests.
    pub fn detached() -> Self {
        Self::new(ptr::null_mut(), ptr::null_mut())
    }

    pub fn is_detached(&self) -> bool {
        self.vm.is_null() || self.activity.is_null()
    }

    /// Reads the handles the activity glue published through `ndk-context`.
    #[cfg(target_os = "android")]
    pub fn from_ndk_context() -> Self {
        let context = ndk_context::android_context();
        Self::new(context.vm(), context.context())
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        Self::detached()
    }
}
