//! Tracer configuration
//!
//! This module defines [`Settings`], the typed snapshot of the `OMNITRACE_*`
//! environment, and the coarse tracer [`State`] machine. Settings are read
//! once per process; everything here is cheap enough to consult from inside
//! the runtime callbacks.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Parse a boolean environment variable the permissive way
///
/// Accepts 0/1, true/false, on/off, yes/no in any case. Anything else falls
/// back to `default`.
pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_lowercase().as_str() {
            "1" | "true" | "on" | "yes" | "y" => true,
            "0" | "false" | "off" | "no" | "n" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse an integer environment variable, falling back on garbage
pub fn env_int(name: &str, default: i32) -> i32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Typed snapshot of the tracer's environment configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Apply the CPU/GPU clock-skew correction to device timestamps
    pub use_clock_skew: bool,

    /// Register with the runtime at `OnLoad`; when false the tracer stands down
    pub init_tooling: bool,

    /// Trace the host-side HSA API channel
    pub trace_hsa_api: bool,

    /// Comma/space-delimited HSA API names to trace (empty = whole domain)
    pub trace_hsa_api_types: Vec<String>,

    /// Trace asynchronous device activity records
    pub trace_hsa_activity: bool,

    /// Diagnostic verbosity; gates log emission only
    pub verbose: i32,

    /// Extra diagnostics; gates log emission only
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            use_clock_skew: true,
            init_tooling: true,
            trace_hsa_api: true,
            trace_hsa_api_types: Vec::new(),
            trace_hsa_activity: true,
            verbose: 0,
            debug: false,
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        let types = std::env::var("OMNITRACE_TRACE_HSA_API_TYPES").unwrap_or_default();
        Settings {
            use_clock_skew: env_bool("OMNITRACE_USE_ROCTRACER_CLOCK_SKEW", true),
            init_tooling: env_bool("OMNITRACE_INIT_TOOLING", true),
            trace_hsa_api: env_bool("OMNITRACE_TRACE_HSA_API", true),
            trace_hsa_api_types: delimit(&types),
            trace_hsa_activity: env_bool("OMNITRACE_TRACE_HSA_ACTIVITY", true),
            verbose: env_int("OMNITRACE_VERBOSE", 0),
            debug: env_bool("OMNITRACE_DEBUG", false),
        }
    }

    /// Process-wide settings, read from the environment on first use
    pub fn global() -> &'static Settings {
        static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
        &SETTINGS
    }
}

/// Split a delimited list on commas, semicolons and whitespace
pub fn delimit(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The command line of the traced application, published by `initialize`
///
/// Mirrored into `OMNITRACE_COMMAND_LINE` so out-of-process sinks can observe
/// it.
pub fn set_command_line(cmd: &str) {
    static COMMAND_LINE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));
    if let Ok(mut guard) = COMMAND_LINE.lock() {
        *guard = Some(cmd.to_string());
    }
    std::env::set_var("OMNITRACE_COMMAND_LINE", cmd);
}

/// Coarse lifecycle state of the tracing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Callbacks return immediately
    Inactive = 0,
    /// Callbacks collect
    Active = 1,
    /// Shutdown has begun; callbacks return immediately, queues may drain
    Finalized = 2,
}

/// Lock-free holder for [`State`]
///
/// Written by the lifecycle controller, read by every callback on every
/// invocation.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub const fn new(state: State) -> Self {
        StateCell(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            1 => State::Active,
            2 => State::Finalized,
            _ => State::Inactive,
        }
    }

    pub fn set(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transition only if currently in `from`; returns whether it happened
    pub fn transition(&self, from: State, to: State) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        StateCell::new(State::Inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_bool_spellings() {
        std::env::set_var("OMNITRACE_TEST_BOOL", "on");
        assert!(env_bool("OMNITRACE_TEST_BOOL", false));
        std::env::set_var("OMNITRACE_TEST_BOOL", "0");
        assert!(!env_bool("OMNITRACE_TEST_BOOL", true));
        std::env::set_var("OMNITRACE_TEST_BOOL", "FALSE");
        assert!(!env_bool("OMNITRACE_TEST_BOOL", true));
        std::env::set_var("OMNITRACE_TEST_BOOL", "garbage");
        assert!(env_bool("OMNITRACE_TEST_BOOL", true));
        std::env::remove_var("OMNITRACE_TEST_BOOL");
        assert!(!env_bool("OMNITRACE_TEST_BOOL", false));
    }

    #[test]
    #[serial]
    fn test_env_int_fallback() {
        std::env::set_var("OMNITRACE_TEST_INT", "3");
        assert_eq!(env_int("OMNITRACE_TEST_INT", 0), 3);
        std::env::set_var("OMNITRACE_TEST_INT", "not-a-number");
        assert_eq!(env_int("OMNITRACE_TEST_INT", 7), 7);
        std::env::remove_var("OMNITRACE_TEST_INT");
    }

    #[test]
    fn test_delimit() {
        assert_eq!(
            delimit("hsa_init, hsa_shut_down;hsa_queue_create"),
            vec!["hsa_init", "hsa_shut_down", "hsa_queue_create"]
        );
        assert!(delimit("").is_empty());
        assert!(delimit(" , ; ").is_empty());
    }

    #[test]
    fn test_settings_defaults() {
        let s = Settings::default();
        assert!(s.use_clock_skew);
        assert!(s.init_tooling);
        assert!(s.trace_hsa_api);
        assert!(s.trace_hsa_activity);
        assert_eq!(s.verbose, 0);
        assert!(!s.debug);
    }

    #[test]
    #[serial]
    fn test_command_line_published() {
        set_command_line("app --flag input.bin");
        assert_eq!(
            std::env::var("OMNITRACE_COMMAND_LINE").unwrap(),
            "app --flag input.bin"
        );
        std::env::remove_var("OMNITRACE_COMMAND_LINE");
    }

    #[test]
    fn test_state_cell_transitions() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), State::Inactive);
        assert!(cell.transition(State::Inactive, State::Active));
        assert_eq!(cell.get(), State::Active);
        // wrong `from` does nothing
        assert!(!cell.transition(State::Inactive, State::Finalized));
        assert_eq!(cell.get(), State::Active);
        assert!(cell.transition(State::Active, State::Finalized));
        assert_eq!(cell.get(), State::Finalized);
    }
}
