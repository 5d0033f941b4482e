//! Diagnostic traces for failed operations.
//!
//! Panics inside an operation are caught by the worker. While an operation is
//! running, a chained panic hook records the panic location and a backtrace
//! on the current thread instead of printing them, so the report can travel
//! back in the acknowledgement.

use crate::envelope::Command;
use crate::error::RemoteError;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// Location and backtrace of a caught panic.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub location: Option<String>,
    pub backtrace: String,
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the capturing panic hook once per process.
pub fn install_panic_capture() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let report = PanicReport {
                    location: info.location().map(|l| l.to_string()),
                    backtrace: Backtrace::force_capture().to_string(),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `f`, turning a panic into its payload plus whatever the hook recorded.
pub fn catch_panic<F, R>(f: F) -> Result<R, (Box<dyn Any + Send>, Option<PanicReport>)>
where
    F: FnOnce() -> R,
{
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
    CAPTURING.with(|c| c.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(false));

    outcome.map_err(|payload| {
        let report = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        (payload, report)
    })
}

/// Render the operator-facing trace for a failed command.
pub fn render(command: &Command, error: &RemoteError, panic: Option<&PanicReport>) -> String {
    let args = command.arguments();
    let mut out = String::new();

    let _ = writeln!(out, "Operation failed in worker (pid {})", std::process::id());
    let _ = writeln!(out, "  operation: {}", command.operation());
    let _ = writeln!(
        out,
        "  args: {}",
        serde_json::to_string(args.positional()).unwrap_or_default()
    );
    let _ = writeln!(
        out,
        "  kwargs: {}",
        serde_json::to_string(args.keyword()).unwrap_or_default()
    );
    if let Some(report) = panic {
        if let Some(location) = &report.location {
            let _ = writeln!(out, "  panicked at {}", location);
        }
        let _ = writeln!(out, "  backtrace:");
        for line in report.backtrace.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
    match error.code {
        Some(code) => {
            let _ = write!(out, "{} (code {})", error, code);
        }
        None => {
            let _ = write!(out, "{}", error);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_catch_panic_passes_values_through() {
        install_panic_capture();
        assert_eq!(catch_panic(|| 7).unwrap(), 7);
    }

    #[test]
    fn test_catch_panic_records_location() {
        install_panic_capture();
        let (payload, report) = catch_panic(|| -> u32 { panic!("probe fell off the bus") }).unwrap_err();

        assert_eq!(RemoteError::from_panic(payload.as_ref()).message, "probe fell off the bus");
        let report = report.expect("hook should record the panic");
        assert!(report.location.unwrap().contains("trace.rs"));
    }

    #[test]
    fn test_render_mentions_operation_and_error() {
        let command = Command::new("read_u32", vec![json!(4097)], Default::default());
        let error = RemoteError::new(ErrorKind::InvalidArgument, "address 0x00001001 is not 32-bit aligned")
            .with_code(-3);

        let trace = render(&command, &error, None);
        assert!(trace.contains("operation: read_u32"));
        assert!(trace.contains("args: [4097]"));
        assert!(trace.contains("invalid_argument: address 0x00001001 is not 32-bit aligned (code -3)"));
        assert!(!trace.contains("backtrace"));
    }

    #[test]
    fn test_render_includes_panic_report() {
        let command = Command::new("divide", vec![json!(10), json!(0)], Default::default());
        let error = RemoteError::new(ErrorKind::Panic, "attempt to divide by zero");
        let report = PanicReport {
            location: Some("src/ops.rs:3:5".to_string()),
            backtrace: "0: ops::divide\n1: main".to_string(),
        };

        let trace = render(&command, &error, Some(&report));
        assert!(trace.contains("panicked at src/ops.rs:3:5"));
        assert!(trace.contains("    0: ops::divide"));
    }
}
