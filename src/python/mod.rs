//! Python extension module
//!
//! Loadable-module surface over the tracing session and the interpreter
//! trace adapter: `initialize`/`finalize` with their state queries, and the
//! `profiler` submodule carrying the per-frame hook plus a `config` settings
//! object whose fields mirror [`crate::interp::ProfilerConfig`]. Session
//! contract violations surface as Python exceptions; everything else is
//! best-effort.

use std::sync::atomic::{AtomicBool, Ordering};

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::IntoPyDict;

use crate::interp::{profile_frame, ConfigStore, FrameEvent, FrameInfo};
use crate::tracer::Tracer;

static IS_INITIALIZED: AtomicBool = AtomicBool::new(false);
static IS_FINALIZED: AtomicBool = AtomicBool::new(false);

/// `initialize` accepts a single command string or an argv list
#[derive(FromPyObject)]
enum InitArg {
    #[pyo3(transparent)]
    Command(String),
    #[pyo3(transparent)]
    Argv(Vec<String>),
}

/// MPI support is keyed on whether mpi4py is importable at runtime
fn mpi_is_available(py: Python<'_>) -> bool {
    py.import_bound("mpi4py").is_ok()
}

/// Initialization state
#[pyfunction]
fn is_initialized() -> bool {
    IS_INITIALIZED.load(Ordering::Acquire)
}

/// Finalization state
#[pyfunction]
fn is_finalized() -> bool {
    IS_FINALIZED.load(Ordering::Acquire)
}

/// Establish the trace session
#[pyfunction]
fn initialize(py: Python<'_>, arg: InitArg) -> PyResult<()> {
    if IS_INITIALIZED.swap(true, Ordering::AcqRel) {
        return Err(PyRuntimeError::new_err(
            "Error! omnitrace is already initialized",
        ));
    }

    let use_mpi = mpi_is_available(py);
    tracing::debug!(use_mpi, "initializing trace session");

    let command = match arg {
        InitArg::Command(command) => command,
        InitArg::Argv(argv) => {
            let command_line = argv.join(" ");
            if !command_line.is_empty() {
                crate::config::set_command_line(&command_line);
            }
            argv.into_iter().next().unwrap_or_default()
        }
    };

    crate::logging::init_from_env();
    tracing::info!(command = %command, "trace session established");
    Ok(())
}

/// Tear the trace session down; one-shot
#[pyfunction]
fn finalize() -> PyResult<()> {
    if IS_FINALIZED.swap(true, Ordering::AcqRel) {
        return Err(PyRuntimeError::new_err(
            "Error! omnitrace is already finalized",
        ));
    }
    Tracer::global().on_unload();
    Ok(())
}

/// Format the frame's argument values the way the interpreter renders them
fn format_frame_args(frame: &Bound<'_, PyAny>) -> String {
    let py = frame.py();
    let result = (|| -> PyResult<String> {
        let locals = [("frame", frame)].into_py_dict_bound(py);
        py.eval_bound(
            "__import__('inspect').formatargvalues(*__import__('inspect').getargvalues(frame))",
            None,
            Some(&locals),
        )?
        .extract::<String>()
    })();
    result.unwrap_or_default()
}

/// The per-frame profiling hook
#[pyfunction]
fn profiler_function(
    frame: Bound<'_, PyAny>,
    event: &str,
    _arg: Bound<'_, PyAny>,
) -> PyResult<()> {
    let Some(kind) = FrameEvent::from_event_str(event) else {
        // only call/c_call/return/c_return are meaningful here
        tracing::trace!(event, "ignoring interpreter event kind");
        return Ok(());
    };
    if frame.is_none() {
        return Ok(());
    }

    let code = frame.getattr("f_code")?;
    let function: String = code.getattr("co_name")?.extract()?;
    let filename: String = code.getattr("co_filename")?.extract()?;
    let lineno: u32 = frame.getattr("f_lineno")?.extract().unwrap_or(0);

    let info = FrameInfo {
        function: &function,
        filename: &filename,
        lineno,
    };
    let format_args = || format_frame_args(&frame);
    profile_frame(
        Tracer::global(),
        ConfigStore::global(),
        kind,
        &info,
        &format_args,
    );
    Ok(())
}

/// Prepare the per-frame hook: resolve our own installation prefix for the
/// internal-path filter and mark the profiler running
#[pyfunction]
fn profiler_init(py: Python<'_>) -> PyResult<()> {
    let base_module_path = (|| -> PyResult<String> {
        let file: String = py
            .import_bound("omnitrace")?
            .getattr("__file__")?
            .extract()?;
        Ok(file
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or(file))
    })()
    .unwrap_or_default();

    ConfigStore::global().with(|config| {
        if !base_module_path.is_empty() {
            config.base_module_path = base_module_path.clone();
        }
        if config.is_running {
            return;
        }
        config.base_stack_depth = -1;
        config.is_running = true;
    });
    Ok(())
}

/// Stop the per-frame hook
#[pyfunction]
fn profiler_finalize() -> PyResult<()> {
    ConfigStore::global().with(|config| {
        if !config.is_running {
            return;
        }
        config.is_running = false;
        config.base_stack_depth = -1;
    });
    Ok(())
}

/// Profiler configuration settings object
///
/// Every getter/setter proxies the calling thread's configuration record.
/// Set-valued properties extend the underlying regex set, matching the
/// accumulate-on-assign behavior the interpreter side expects.
#[pyclass(name = "config")]
struct ProfilerSettings;

#[pymethods]
impl ProfilerSettings {
    #[getter(_is_running)]
    fn is_running(&self) -> bool {
        ConfigStore::global().with(|config| config.is_running)
    }

    #[setter(_is_running)]
    fn set_is_running(&self, value: bool) {
        ConfigStore::global().with(|config| config.is_running = value);
    }

    #[getter]
    fn trace_c(&self) -> bool {
        ConfigStore::global().with(|config| config.trace_c)
    }

    #[setter]
    fn set_trace_c(&self, value: bool) {
        ConfigStore::global().with(|config| config.trace_c = value);
    }

    #[getter]
    fn include_internal(&self) -> bool {
        ConfigStore::global().with(|config| config.include_internal)
    }

    #[setter]
    fn set_include_internal(&self, value: bool) {
        ConfigStore::global().with(|config| config.include_internal = value);
    }

    #[getter]
    fn include_args(&self) -> bool {
        ConfigStore::global().with(|config| config.include_args)
    }

    #[setter]
    fn set_include_args(&self, value: bool) {
        ConfigStore::global().with(|config| config.include_args = value);
    }

    #[getter]
    fn include_line(&self) -> bool {
        ConfigStore::global().with(|config| config.include_line)
    }

    #[setter]
    fn set_include_line(&self, value: bool) {
        ConfigStore::global().with(|config| config.include_line = value);
    }

    #[getter]
    fn include_filename(&self) -> bool {
        ConfigStore::global().with(|config| config.include_filename)
    }

    #[setter]
    fn set_include_filename(&self, value: bool) {
        ConfigStore::global().with(|config| config.include_filename = value);
    }

    #[getter]
    fn full_filepath(&self) -> bool {
        ConfigStore::global().with(|config| config.full_filepath)
    }

    #[setter]
    fn set_full_filepath(&self, value: bool) {
        ConfigStore::global().with(|config| config.full_filepath = value);
    }

    #[getter]
    fn verbosity(&self) -> i32 {
        ConfigStore::global().with(|config| config.verbose)
    }

    #[setter]
    fn set_verbosity(&self, value: i32) {
        ConfigStore::global().with(|config| config.verbose = value);
    }

    #[getter]
    fn restrict_functions(&self) -> Vec<String> {
        ConfigStore::global().with(|config| config.restrict_functions.iter().cloned().collect())
    }

    #[setter]
    fn set_restrict_functions(&self, value: Vec<String>) {
        ConfigStore::global().with(|config| config.restrict_functions.extend(value));
    }

    #[getter]
    fn restrict_modules(&self) -> Vec<String> {
        ConfigStore::global().with(|config| config.restrict_filenames.iter().cloned().collect())
    }

    #[setter]
    fn set_restrict_modules(&self, value: Vec<String>) {
        ConfigStore::global().with(|config| config.restrict_filenames.extend(value));
    }

    #[getter]
    fn include_functions(&self) -> Vec<String> {
        ConfigStore::global().with(|config| config.include_functions.iter().cloned().collect())
    }

    #[setter]
    fn set_include_functions(&self, value: Vec<String>) {
        ConfigStore::global().with(|config| config.include_functions.extend(value));
    }

    #[getter]
    fn include_modules(&self) -> Vec<String> {
        ConfigStore::global().with(|config| config.include_filenames.iter().cloned().collect())
    }

    #[setter]
    fn set_include_modules(&self, value: Vec<String>) {
        ConfigStore::global().with(|config| config.include_filenames.extend(value));
    }

    #[getter]
    fn exclude_functions(&self) -> Vec<String> {
        ConfigStore::global().with(|config| config.exclude_functions.iter().cloned().collect())
    }

    #[setter]
    fn set_exclude_functions(&self, value: Vec<String>) {
        ConfigStore::global().with(|config| config.exclude_functions.extend(value));
    }

    #[getter]
    fn exclude_modules(&self) -> Vec<String> {
        ConfigStore::global().with(|config| config.exclude_filenames.iter().cloned().collect())
    }

    #[setter]
    fn set_exclude_modules(&self, value: Vec<String>) {
        ConfigStore::global().with(|config| config.exclude_filenames.extend(value));
    }
}

/// omnitrace profiler for Python
#[pymodule]
fn omnitrace(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();

    m.add_function(wrap_pyfunction!(is_initialized, m)?)?;
    m.add_function(wrap_pyfunction!(is_finalized, m)?)?;
    m.add_function(wrap_pyfunction!(initialize, m)?)?;
    m.add_function(wrap_pyfunction!(finalize, m)?)?;

    let profiler = PyModule::new_bound(py, "profiler")?;
    profiler.add_function(wrap_pyfunction!(profiler_function, &profiler)?)?;
    profiler.add_function(wrap_pyfunction!(profiler_init, &profiler)?)?;
    profiler.add_function(wrap_pyfunction!(profiler_finalize, &profiler)?)?;
    profiler.add("config", Py::new(py, ProfilerSettings)?)?;
    m.add_submodule(&profiler)?;

    Ok(())
}
