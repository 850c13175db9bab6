use crate::vr::Version;
use std::ffi::c_void;
use std::fmt;
use std::ptr;

/// `GL_SRGB8_ALPHA8`, the swapchain color format requested by default.
pub const GL_SRGB8_ALPHA8: i64 = 0x8C43;

/// Raw EGL objects of the host's current GLES context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EglHandles {
    pub display: *mut c_void,
    pub context: *mut c_void,
    pub config: *mut c_void,
}

impl EglHandles {
    pub fn new(display: *mut c_void, context: *mut c_void, config: *mut c_void) -> Self {
        Self {
            display,
            context,
            config,
        }
    }

    pub fn null() -> Self {
        Self::new(ptr::null_mut(), ptr::null_mut(), ptr::null_mut())
    }

    pub fn is_complete(&self) -> bool {
        !self.display.is_null() && !self.context.is_null() && !self.config.is_null()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlesVersion {
    pub major: u16,
    pub minor: u16,
}

impl GlesVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub const fn to_xr_version(self) -> Version {
        Version::new(self.major, self.minor, 0)
    }
}

impl fmt::Display for GlesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The host's EGL/GLES context as seen by the bootstrapper. The context is
/// created and owned by the host; the bootstrapper only reads it, except for
/// asking the host to tear it down when the runtime rejects its version.
pub trait GlesContext {
    fn handles(&self) -> EglHandles;
    /// Version of the context that is current on the calling thread.
    fn version(&self) -> GlesVersion;
    fn destroy(&mut self);
}

/// A [`GlesContext`] filled in by the host from its own EGL setup.
pub struct HostGlesContext {
    handles: EglHandles,
    version: GlesVersion,
    on_destroy: Option<Box<dyn FnOnce()>>,
    destroyed: bool,
}

impl HostGlesContext {
    pub fn new(handles: EglHandles, version: GlesVersion) -> Self {
        Self {
            handles,
            version,
            on_destroy: None,
            destroyed: false,
        }
    }

    pub fn with_destroy(mut self, on_destroy: impl FnOnce() + 'static) -> Self {
        self.on_destroy = Some(Box::new(on_destroy));
        self
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl fmt::Debug for HostGlesContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostGlesContext")
            .field("handles", &self.handles)
            .field("version", &self.version)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl GlesContext for HostGlesContext {
    fn handles(&self) -> EglHandles {
        self.handles
    }

    fn version(&self) -> GlesVersion {
        self.version
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(on_destroy) = self.on_destroy.take() {
            on_destroy();
        }
        self.destroyed = true;
        self.handles = EglHandles::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn destroy_runs_host_callback_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut context = HostGlesContext::new(EglHandles::null(), GlesVersion::new(3, 0))
            .with_destroy(move || counter.set(counter.get() + 1));

        context.destroy();
        context.destroy();

        assert_eq!(calls.get(), 1);
        assert!(context.is_destroyed());
    }

    #[test]
    fn gles_version_maps_to_xr_version_without_patch() {
        let version = GlesVersion::new(3, 2).to_xr_version();
        assert_eq!(version, Version::new(3, 2, 0));
        assert!(GlesVersion::new(3, 1).to_xr_version() < version);
    }
}
