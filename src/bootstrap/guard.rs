use crate::vr::{
    InstanceHandle, SessionHandle, SpaceHandle, SwapchainHandle, XrResult, XrRuntime,
};
use std::fmt;

/// A runtime handle that has to be destroyed explicitly.
pub(crate) trait OwnedHandle: Copy + fmt::Display {
    fn destroy<R: XrRuntime + ?Sized>(self, runtime: &R) -> XrResult<()>;
}

impl OwnedHandle for InstanceHandle {
    fn destroy<R: XrRuntime + ?Sized>(self, runtime: &R) -> XrResult<()> {
        runtime.destroy_instance(self)
    }
}

impl OwnedHandle for SessionHandle {
    fn destroy<R: XrRuntime + ?Sized>(self, runtime: &R) -> XrResult<()> {
        runtime.destroy_session(self)
    }
}

impl OwnedHandle for SpaceHandle {
    fn destroy<R: XrRuntime + ?Sized>(self, runtime: &R) -> XrResult<()> {
        runtime.destroy_space(self)
    }
}

impl OwnedHandle for SwapchainHandle {
    fn destroy<R: XrRuntime + ?Sized>(self, runtime: &R) -> XrResult<()> {
        runtime.destroy_swapchain(self)
    }
}

/// Destroys `handle`. Failures are logged, not returned.
pub(crate) fn release<R: XrRuntime + ?Sized, H: OwnedHandle>(runtime: &R, handle: H) {
    match handle.destroy(runtime) {
        Ok(()) => log::debug!("[xr] destroyed {handle}"),
        Err(code) => log::warn!("[xr] failed to destroy {handle}: {code:?}"),
    }
}

/// Destroys the wrapped handle when dropped unless [`into_inner`] was
/// called. Guards declared later drop first, so partial failures unwind in
/// reverse acquisition order.
///
/// [`into_inner`]: ResourceGuard::into_inner
pub(crate) struct ResourceGuard<'r, R: XrRuntime + ?Sized, H: OwnedHandle> {
    runtime: &'r R,
    handle: H,
    armed: bool,
}

impl<'r, R: XrRuntime + ?Sized, H: OwnedHandle> ResourceGuard<'r, R, H> {
    pub(crate) fn new(runtime: &'r R, handle: H) -> Self {
        Self {
            runtime,
            handle,
            armed: true,
        }
    }

    pub(crate) fn handle(&self) -> H {
        self.handle
    }

    /// Hands ownership of the handle to the caller.
    pub(crate) fn into_inner(mut self) -> H {
        self.armed = false;
        self.handle
    }
}

impl<R: XrRuntime + ?Sized, H: OwnedHandle> Drop for ResourceGuard<'_, R, H> {
    fn drop(&mut self) {
        if self.armed {
            release(self.runtime, self.handle);
        }
    }
}
