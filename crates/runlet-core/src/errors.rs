//! Error types for the execution orchestrator.
//!
//! Failures are classified by the pipeline stage that produced them so the
//! HTTP and WebSocket surfaces can map each one to the response the protocol
//! promises. A child process exiting non-zero is deliberately absent here:
//! the program's own failure is content of the result, never a pipeline
//! error.

use thiserror::Error;

/// Errors raised by the synchronous execution pipeline.
///
/// Each variant corresponds to exactly one stage of the pipeline state
/// machine. Every variant is terminal for its request; the pipeline releases
/// all artifacts it created before returning one.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The source artifact could not be written to the working directory.
    #[error("failed to persist source artifact: {0}")]
    Persist(#[source] std::io::Error),

    /// The compile command failed to start or exited non-zero.
    ///
    /// `diagnostics` carries the toolchain's own output when any was
    /// captured: stderr first, stdout as a fallback (tsc reports on stdout),
    /// or the spawn error text when the command never started.
    #[error("compilation failed{}", diagnostics_suffix(.diagnostics))]
    Compile { diagnostics: Option<String> },

    /// The run command itself could not be started.
    #[error("failed to invoke '{command}': {source}")]
    RunInvocation {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    /// Create a compile error, normalizing empty diagnostics to `None`.
    pub fn compile(diagnostics: impl Into<String>) -> Self {
        let text = diagnostics.into();
        ExecError::Compile {
            diagnostics: if text.trim().is_empty() {
                None
            } else {
                Some(text)
            },
        }
    }
}

fn diagnostics_suffix(diagnostics: &Option<String>) -> String {
    match diagnostics {
        Some(text) => format!(":\n{}", text),
        None => String::new(),
    }
}

/// Errors raised by an interactive session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A frame that is neither `PROGRAM:` nor `INPUT:`.
    #[error("unrecognized frame")]
    UnrecognizedFrame,

    /// A frame arrived in a state that cannot accept it, e.g. `INPUT:`
    /// before any program or a second `PROGRAM:` while one is running.
    #[error("{0}")]
    OutOfOrder(&'static str),

    /// Writing to the child's stdin failed, typically because the input
    /// stream was already consumed by an earlier `INPUT:` frame.
    #[error("failed to write to program input: {0}")]
    InputStream(#[source] std::io::Error),

    /// Persisting or compiling the submitted program failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The interactive process could not be spawned.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_carries_diagnostics() {
        let err = ExecError::compile("undefined reference to `main'");
        assert!(err.to_string().contains("undefined reference"));
    }

    #[test]
    fn compile_error_normalizes_blank_diagnostics() {
        match ExecError::compile("  \n") {
            ExecError::Compile { diagnostics } => assert!(diagnostics.is_none()),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
