pub mod bootstrap;
pub mod config;
pub mod gles;
pub mod platform;
pub mod vr;

pub use bootstrap::{BootstrapError, BootstrapPhase, RenderTarget, XrBootstrap, XrState};
pub use config::{BootstrapConfig, ConfigError, SwapchainConfig};
pub use gles::{EglHandles, GlesContext, GlesVersion, HostGlesContext};
pub use platform::PlatformContext;
pub use vr::{SimulatedRuntime, XrRuntime, sys};

/// Brings up the instance and session and begins the session, the
/// sequence a host runs once at startup.
pub fn start<R: XrRuntime>(
    runtime: R,
    config: BootstrapConfig,
    platform: &PlatformContext,
    gles: &mut dyn GlesContext,
) -> Result<XrBootstrap<R>, BootstrapError> {
    let mut bootstrap = XrBootstrap::new(runtime, config);
    bootstrap.initialize(platform)?;
    bootstrap.init_session(gles)?;
    bootstrap.start_session()?;
    Ok(bootstrap)
}
