//! Frame-event pipeline
//!
//! One invocation per interpreter event. The pipeline short-circuits in
//! order: recursion guard, ignore-stack accounting, C-event gate, function
//! filters, internal-path filter, filename filters; survivors produce a
//! region push with a matching pop closure on a per-thread stack, so push
//! and pop stay balanced whatever the downstream event order looks like.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::tracer::threading::try_enter;
use crate::tracer::Tracer;

use super::config::{default_exclude_functions, ConfigStore, ProfilerConfig};
use super::filter::find_matching;

thread_local! {
    static IN_PROFILER: Cell<bool> = const { Cell::new(false) };
    static POP_STACK: RefCell<Vec<Box<dyn FnOnce()>>> = RefCell::new(Vec::new());
    static LABELS: RefCell<HashSet<&'static str>> = RefCell::new(HashSet::new());
}

/// Interpreter event kinds the adapter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    Call,
    CCall,
    Return,
    CReturn,
}

impl FrameEvent {
    /// Map the interpreter's event string; anything else is ignored
    pub fn from_event_str(event: &str) -> Option<Self> {
        match event {
            "call" => Some(FrameEvent::Call),
            "c_call" => Some(FrameEvent::CCall),
            "return" => Some(FrameEvent::Return),
            "c_return" => Some(FrameEvent::CReturn),
            _ => None,
        }
    }

    fn is_c_event(self) -> bool {
        matches!(self, FrameEvent::CCall | FrameEvent::CReturn)
    }

    fn is_call(self) -> bool {
        matches!(self, FrameEvent::Call | FrameEvent::CCall)
    }
}

/// The frame fields the adapter reads
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo<'a> {
    pub function: &'a str,
    pub filename: &'a str,
    pub lineno: u32,
}

/// Number of pop closures pending on the calling thread
pub fn pop_stack_depth() -> usize {
    POP_STACK.with(|stack| stack.borrow().len())
}

/// Intern a label on the calling thread, giving it a stable address
fn intern_label(label: String) -> &'static str {
    LABELS.with(|labels| {
        let mut labels = labels.borrow_mut();
        if let Some(existing) = labels.get(label.as_str()) {
            return *existing;
        }
        let leaked: &'static str = Box::leak(label.into_boxed_str());
        labels.insert(leaked);
        leaked
    })
}

/// CALL/RETURN balance while a subtree is being skipped; C events are not
/// part of the balance
fn update_ignore_stack(config: &mut ProfilerConfig, event: FrameEvent) {
    match event {
        FrameEvent::Call => config.ignore_stack_depth += 1,
        FrameEvent::Return => config.ignore_stack_depth -= 1,
        _ => {}
    }
}

fn build_label(
    config: &ProfilerConfig,
    frame: &FrameInfo<'_>,
    format_args: &dyn Fn() -> String,
) -> String {
    let mut label = String::new();
    let bracket = config.include_filename;
    if bracket {
        label.push('[');
    }
    label.push_str(frame.function);
    if config.include_args {
        label.push_str(&format_args());
    }
    if bracket {
        label.push(']');
    }
    if config.include_filename {
        let shown = if config.full_filepath {
            frame.filename
        } else {
            frame
                .filename
                .rsplit('/')
                .next()
                .unwrap_or(frame.filename)
        };
        label.push('[');
        label.push_str(shown);
    }
    if config.include_line && config.include_filename {
        label.push_str(&format!(":{}]", frame.lineno));
    } else if config.include_line {
        label.push_str(&format!(":{}", frame.lineno));
    } else if config.include_filename {
        label.push(']');
    }
    label
}

/// The per-frame hook body
///
/// `format_args` is only invoked when argument capture is enabled; in the
/// Python layer it re-enters the interpreter, which is why the recursion
/// guard brackets the whole pipeline.
pub fn profile_frame(
    tracer: &Tracer,
    store: &ConfigStore,
    event: FrameEvent,
    frame: &FrameInfo<'_>,
    format_args: &dyn Fn() -> String,
) {
    let Some(_guard) = try_enter(&IN_PROFILER) else {
        return;
    };

    store.with(|config| {
        if config.ignore_stack_depth > 0 {
            if config.verbose > 2 {
                tracing::trace!(
                    function = frame.function,
                    depth = config.ignore_stack_depth,
                    "ignoring call/return in skipped subtree"
                );
            }
            update_ignore_stack(config, event);
            return;
        } else if config.ignore_stack_depth < 0 {
            tracing::warn!(
                depth = config.ignore_stack_depth,
                "ignore_stack_depth went negative"
            );
        }

        if !config.trace_c && event.is_c_event() {
            return;
        }

        let mut force = false;
        if !config.restrict_functions.is_empty() {
            force = find_matching(&config.restrict_functions, frame.function);
            if !force {
                if config.verbose > 2 {
                    tracing::trace!(function = frame.function, "not in restricted set");
                }
                return;
            }
        }

        if !force {
            if find_matching(&config.include_functions, frame.function) {
                force = true;
            } else if find_matching(&config.exclude_functions, frame.function) {
                if config.verbose > 1 {
                    tracing::trace!(function = frame.function, "excluded function");
                }
                if !find_matching(&default_exclude_functions(), frame.function) {
                    update_ignore_stack(config, event);
                }
                return;
            }
        }

        if !config.include_internal
            && !config.base_module_path.is_empty()
            && frame.filename.starts_with(&config.base_module_path)
        {
            if config.verbose > 2 {
                tracing::trace!(function = frame.function, "internal function");
            }
            return;
        }

        if !force && !config.restrict_filenames.is_empty() {
            force = find_matching(&config.restrict_filenames, frame.filename);
            if !force {
                if config.verbose > 2 {
                    tracing::trace!(filename = frame.filename, "not in restricted files");
                }
                return;
            }
        }

        if !force
            && !find_matching(&config.include_filenames, frame.filename)
            && find_matching(&config.exclude_filenames, frame.filename)
        {
            if config.verbose > 2 {
                tracing::trace!(filename = frame.filename, "excluded file");
            }
            return;
        }

        let label = build_label(config, frame, format_args);
        if label.is_empty() {
            return;
        }
        let label = intern_label(label);

        if event.is_call() {
            let sinks = tracer.sinks().snapshot();
            for sink in &sinks {
                sink.push_region(label);
            }
            POP_STACK.with(|stack| {
                stack.borrow_mut().push(Box::new(move || {
                    for sink in &sinks {
                        sink.pop_region(label);
                    }
                }));
            });
        } else {
            let pop = POP_STACK.with(|stack| stack.borrow_mut().pop());
            if let Some(pop) = pop {
                pop();
            }
        }
    });
}
