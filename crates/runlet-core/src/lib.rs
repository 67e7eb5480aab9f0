//! Core execution orchestrator for the Runlet code execution service.
//!
//! This crate turns raw source text into a running OS process, per language:
//! adapters describe toolchains, the artifact store allocates and sweeps the
//! scratch files a run leaves behind, the pipeline sequences
//! persist/compile/run/cleanup for one-shot requests, and interactive
//! sessions relay stdin/stdout live for one connection. Failure handling is
//! classified by stage so callers can keep the protocol's promises; a
//! program's own non-zero exit is result content, never a failure. The HTTP
//! and WebSocket surfaces live in `runlet-server` and treat everything here
//! as the single source of execution semantics.

pub mod errors;
pub mod language;
pub mod pipeline;
pub mod session;
pub mod store;

pub use errors::{ExecError, SessionError};
pub use language::{Descriptor, Language, UnknownLanguage};
pub use pipeline::{execute, ExecutionOutput};
pub use session::{fault_frame, Frame, InteractiveSession, SessionEvent, END_SENTINEL};
pub use store::ArtifactStore;
