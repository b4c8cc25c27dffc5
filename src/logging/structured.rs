use tracing::{debug, error, info, trace, warn};

/// Who is logging, and on behalf of which session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    /// Component name (e.g., "clock", "controller", "api")
    pub component: String,
    /// Remote charging session ID
    pub session_id: Option<i64>,
    /// Port the session is bound to
    pub port_id: Option<i64>,
    /// Charge mode name, once the session has one
    pub mode: Option<&'static str>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn with_port_id(mut self, port_id: i64) -> Self {
        self.port_id = Some(port_id);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: &'static str) -> Self {
        self.mode = Some(mode);
        self
    }
}

// Unset ids and mode are left out of the event instead of logged as empty
macro_rules! contextual {
    ($($(#[$doc:meta])* $name:ident => $event:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, message: &str) {
                let ctx = &self.context;
                $event!(
                    component = %ctx.component,
                    session_id = ctx.session_id,
                    port_id = ctx.port_id,
                    mode = ctx.mode,
                    "{}",
                    message
                );
            }
        )*
    };
}

/// Logger stamping its context as structured fields on every event
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    pub const fn new(context: LogContext) -> Self {
        Self { context }
    }

    contextual! {
        /// Log an info message with context
        info => info;
        /// Log a warning message with context
        warn => warn;
        /// Log an error message with context
        error => error;
        /// Log a debug message with context
        debug => debug;
        trace => trace;
    }

    /// Context this logger stamps on every line
    pub const fn context(&self) -> &LogContext {
        &self.context
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub const fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
