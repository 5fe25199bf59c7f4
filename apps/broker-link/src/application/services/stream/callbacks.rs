//! Consumer hooks for stream events.

use std::fmt;
use std::sync::Arc;

use crate::domain::streaming::Tick;

/// Receives tick batches in arrival order. Errors are logged and ignored.
pub type TickHandler = Arc<dyn Fn(&[Tick]) -> anyhow::Result<()> + Send + Sync>;

/// Called after every successful (re)connect.
pub type ConnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Called when the session closes unexpectedly, with code and reason.
pub type CloseHandler = Arc<dyn Fn(Option<u16>, &str) + Send + Sync>;

/// Called when the session fails, with the reason.
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Set of optional consumer hooks.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    pub(super) on_ticks: Option<TickHandler>,
    pub(super) on_connect: Option<ConnectHandler>,
    pub(super) on_close: Option<CloseHandler>,
    pub(super) on_error: Option<ErrorHandler>,
}

impl StreamCallbacks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick consumer.
    #[must_use]
    pub fn on_ticks(
        mut self,
        handler: impl Fn(&[Tick]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_ticks = Some(Arc::new(handler));
        self
    }

    /// Set the connect hook.
    #[must_use]
    pub fn on_connect(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(handler));
        self
    }

    /// Set the close hook.
    #[must_use]
    pub fn on_close(mut self, handler: impl Fn(Option<u16>, &str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    /// Set the error hook.
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_ticks", &self.on_ticks.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
