//! Capability-gated low-level interceptor for one reserved key.

use thiserror::Error;

/// Callback invoked on the interceptor's own thread. Must not block.
pub type InterceptCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// What the interceptor calls while installed
pub struct InterceptHandlers {
    /// Target key went down (auto-repeat excluded)
    pub on_down: InterceptCallback,
    /// Target key came up. `None` routes only presses.
    pub on_up: Option<InterceptCallback>,
    /// The platform disabled the interceptor without `remove` being called
    pub on_stopped: Option<InterceptCallback>,
}

/// Identifies one successful install; stale handles are ignored by `remove`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
    #[error("input monitoring permission not granted")]
    PermissionDenied,
    #[error("key interception is not supported on this platform")]
    Unsupported,
    #[error("interceptor backend error: {0}")]
    Backend(String),
}

/// A system-wide interceptor that sees the target key before the OS feature
/// competing for it, reports it through the handlers and swallows it.
///
/// At most one installation is live at a time; installing again replaces it.
pub trait PlatformInputInterceptor: Send + Sync {
    fn install(
        &self,
        target_key: u16,
        handlers: InterceptHandlers,
    ) -> Result<InterceptorHandle, InterceptError>;

    /// Remove the installation identified by `handle`. Never calls `on_stopped`.
    fn remove(&self, handle: InterceptorHandle);

    fn is_active(&self) -> bool;
}

/// Interceptor for platforms without reserved keys
#[derive(Debug, Default)]
pub struct UnsupportedInterceptor;

impl PlatformInputInterceptor for UnsupportedInterceptor {
    fn install(
        &self,
        _target_key: u16,
        _handlers: InterceptHandlers,
    ) -> Result<InterceptorHandle, InterceptError> {
        Err(InterceptError::Unsupported)
    }

    fn remove(&self, _handle: InterceptorHandle) {}

    fn is_active(&self) -> bool {
        false
    }
}

/// The interceptor for the current platform
pub fn platform_interceptor() -> std::sync::Arc<dyn PlatformInputInterceptor> {
    #[cfg(target_os = "macos")]
    {
        std::sync::Arc::new(super::event_tap::EventTapInterceptor::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        std::sync::Arc::new(UnsupportedInterceptor)
    }
}
