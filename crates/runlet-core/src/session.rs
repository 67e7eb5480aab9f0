//! Interactive execution sessions for the streaming path.
//!
//! One session backs one live connection. It owns at most one child process
//! and the artifacts behind it, parses wire frames into tagged variants at
//! the boundary, and pushes every stdout/stderr chunk out the instant it is
//! read — no coalescing, no back-pressure. Termination is driven by the
//! process exiting; the exit watcher releases artifacts and emits the end
//! sentinel even when the transport has already gone away.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;

use crate::errors::SessionError;
use crate::language::Descriptor;
use crate::store::ArtifactStore;

/// Terminal sentinel sent exactly once after the process has exited and its
/// artifacts are released.
pub const END_SENTINEL: &str = "PROGRAM END: websocket closed";

/// Frame sent for any protocol or stage failure, at most once per session.
pub fn fault_frame(reason: impl std::fmt::Display) -> String {
    format!("WEBSOCKET ERROR: {reason}")
}

/// An inbound wire frame, parsed at the boundary.
///
/// Anything that is neither `PROGRAM:` nor `INPUT:` is rejected as a
/// protocol error rather than silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Program(String),
    Input(String),
}

impl Frame {
    pub fn parse(raw: &str) -> Result<Frame, SessionError> {
        if let Some(source) = raw.strip_prefix("PROGRAM:") {
            Ok(Frame::Program(source.to_string()))
        } else if let Some(text) = raw.strip_prefix("INPUT:") {
            Ok(Frame::Input(text.to_string()))
        } else {
            Err(SessionError::UnrecognizedFrame)
        }
    }
}

/// Outbound session events, framed by [`SessionEvent::to_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A chunk the process wrote to stdout.
    Output(String),
    /// A chunk the process wrote to stderr.
    ErrorOutput(String),
    /// The process exited and its artifacts are released.
    Ended,
}

impl SessionEvent {
    /// The wire text for this event.
    pub fn to_frame(&self) -> String {
        match self {
            SessionEvent::Output(chunk) => {
                serde_json::json!({ "output": chunk }).to_string()
            }
            SessionEvent::ErrorOutput(chunk) => {
                serde_json::json!({ "error": chunk }).to_string()
            }
            SessionEvent::Ended => END_SENTINEL.to_string(),
        }
    }
}

enum State {
    /// No program submitted yet.
    Idle,
    /// Process spawned; `stdin` is consumed by the first `INPUT:` frame.
    /// `finished` is set by the exit watcher so frames arriving between the
    /// process dying and the end sentinel reaching the transport are
    /// reported against a finished session, not a running one.
    Running {
        stdin: Option<ChildStdin>,
        finished: Arc<AtomicBool>,
    },
    /// Program submitted and finished (or failed before spawning). The
    /// session accepts no further frames.
    Terminated,
}

/// The stateful object behind one streaming connection.
///
/// Transitions are explicit: [`InteractiveSession::handle_frame`] either
/// advances the state machine or returns the [`SessionError`] the transport
/// layer should frame and close on. Output, and eventually the end sentinel,
/// arrive on the event channel handed to [`InteractiveSession::new`].
pub struct InteractiveSession {
    store: ArtifactStore,
    descriptor: &'static Descriptor,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: State,
}

impl InteractiveSession {
    pub fn new(
        store: ArtifactStore,
        descriptor: &'static Descriptor,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            store,
            descriptor,
            events,
            state: State::Idle,
        }
    }

    /// Feed one parsed frame into the session.
    ///
    /// Any error is terminal: the caller sends one fault frame and closes
    /// the connection. An already-spawned process still runs to exit and its
    /// watcher still cleans up.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        match frame {
            Frame::Program(source) => self.start_program(&source).await,
            Frame::Input(text) => self.deliver_input(&text).await,
        }
    }

    async fn start_program(&mut self, program: &str) -> Result<(), SessionError> {
        match &self.state {
            State::Idle => {}
            State::Running { finished, .. } => {
                if finished.load(Ordering::Acquire) {
                    self.state = State::Terminated;
                    return Err(SessionError::OutOfOrder("the session has already ended"));
                }
                return Err(SessionError::OutOfOrder("a program is already running"));
            }
            State::Terminated => {
                return Err(SessionError::OutOfOrder("the session has already ended"))
            }
        }

        // PERSISTING
        let transformed = self.descriptor.transform_source(program);
        if !transformed.applied
            && !matches!(self.descriptor.transform, crate::language::Transform::None)
        {
            log::warn!(
                "source transform did not match; interactive '{}' program may not stream output",
                self.descriptor.source_ext
            );
        }
        let source = self.store.allocate(self.descriptor.source_ext);
        if let Err(err) = tokio::fs::write(&source, transformed.text.as_bytes()).await {
            self.state = State::Terminated;
            self.store.release(&source, &[]).await;
            return Err(crate::errors::ExecError::Persist(err).into());
        }

        // COMPILING (compiled languages only) — on failure the session ends
        // without ever spawning a process.
        if let Some((mut compile, _output)) = self.descriptor.compile_command(&source) {
            let compiled = compile
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await;
            let failure = match compiled {
                Err(err) => Some(err.to_string()),
                Ok(out) if !out.status.success() => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    Some(if stderr.trim().is_empty() {
                        String::from_utf8_lossy(&out.stdout).into_owned()
                    } else {
                        stderr.into_owned()
                    })
                }
                Ok(_) => None,
            };
            if let Some(diagnostics) = failure {
                self.state = State::Terminated;
                self.store.release(&source, &[]).await;
                return Err(crate::errors::ExecError::compile(diagnostics).into());
            }
        }

        // RUNNING
        let (mut run, command_name) = self.descriptor.run_command(&source);
        let spawned = run
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                self.state = State::Terminated;
                self.store.release(&source, &[]).await;
                return Err(SessionError::Spawn {
                    command: command_name,
                    source: err,
                });
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let finished = Arc::new(AtomicBool::new(false));
        self.state = State::Running {
            stdin,
            finished: finished.clone(),
        };

        let events = self.events.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let out_pump = pump(stdout, events.clone(), SessionEvent::Output);
            let err_pump = pump(stderr, events.clone(), SessionEvent::ErrorOutput);
            tokio::join!(out_pump, err_pump);

            // Streams are drained; now reap the process, whatever its code.
            match child.wait().await {
                Ok(status) => log::debug!("interactive program exited with {status}"),
                Err(err) => log::warn!("failed to await interactive program: {err}"),
            }
            store.release(&source, &[]).await;
            finished.store(true, Ordering::Release);
            let _ = events.send(SessionEvent::Ended);
        });

        Ok(())
    }

    async fn deliver_input(&mut self, text: &str) -> Result<(), SessionError> {
        let stdin = match &mut self.state {
            State::Idle => return Err(SessionError::OutOfOrder("no program is running")),
            State::Terminated => {
                return Err(SessionError::OutOfOrder("the session has already ended"))
            }
            State::Running { stdin, finished } => {
                if finished.load(Ordering::Acquire) {
                    self.state = State::Terminated;
                    return Err(SessionError::OutOfOrder("the session has already ended"));
                }
                stdin.take().ok_or(SessionError::OutOfOrder(
                    "program input was already delivered",
                ))?
            }
        };

        // One delivery per session: text, end-of-input newline, then the
        // stream is closed for good.
        let mut stdin = stdin;
        let write = async {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        };
        write.await.map_err(SessionError::InputStream)
    }
}

/// Forward every chunk `reader` produces as its own event, the instant it is
/// available. Send failures mean the transport is gone; reading continues so
/// the stream still drains.
async fn pump<R>(
    reader: Option<R>,
    events: mpsc::UnboundedSender<SessionEvent>,
    wrap: fn(String) -> SessionEvent,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                let _ = events.send(wrap(chunk));
            }
            Err(err) => {
                log::warn!("failed to read program output: {err}");
                break;
            }
        }
    }
}
