//! Synchronous execution pipeline: persist -> [compile ->] run -> cleanup.
//!
//! One invocation per request; stages are strictly sequential and every
//! terminal path, success or failure, releases the artifacts the run
//! created. Concurrency across requests is unbounded — each request owns an
//! independent artifact namespace, so no coordination is needed beyond path
//! uniqueness.

use std::process::Stdio;

use crate::errors::ExecError;
use crate::language::Descriptor;
use crate::store::ArtifactStore;

/// Captured output of a completed run.
///
/// Completion means the process ran to exit, whatever its exit code: a
/// non-zero exit is the program's business and shows up as `error` text,
/// never as a pipeline failure.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub output: String,
    pub error: String,
}

/// Run one program through the full pipeline.
///
/// The source text is transformed per the adapter, persisted, compiled when
/// the language calls for it, executed with no stdin attached, and cleaned
/// up. Errors identify the stage that failed; artifacts never outlive the
/// call either way.
pub async fn execute(
    store: &ArtifactStore,
    descriptor: &Descriptor,
    program: &str,
) -> Result<ExecutionOutput, ExecError> {
    // PERSIST
    let transformed = descriptor.transform_source(program);
    if !transformed.applied && !matches!(descriptor.transform, crate::language::Transform::None) {
        log::warn!(
            "source transform did not match; persisting '{}' source unmodified",
            descriptor.source_ext
        );
    }
    let source = store.allocate(descriptor.source_ext);
    if let Err(err) = tokio::fs::write(&source, transformed.text.as_bytes()).await {
        log::error!("failed to write {}: {}", source.display(), err);
        store.release(&source, &[]).await;
        return Err(ExecError::Persist(err));
    }
    log::debug!("persisted source artifact {}", source.display());

    // COMPILE (compiled languages only)
    if let Some((mut compile, output_path)) = descriptor.compile_command(&source) {
        let compiled = compile
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        match compiled {
            Err(err) => {
                store.release(&source, &[]).await;
                return Err(ExecError::compile(err.to_string()));
            }
            Ok(out) if !out.status.success() => {
                store.release(&source, &[]).await;
                // stderr first; tsc writes its diagnostics to stdout.
                let stderr = String::from_utf8_lossy(&out.stderr);
                let diagnostics = if stderr.trim().is_empty() {
                    String::from_utf8_lossy(&out.stdout).into_owned()
                } else {
                    stderr.into_owned()
                };
                return Err(ExecError::compile(diagnostics));
            }
            Ok(_) => {
                log::debug!("compiled {} -> {}", source.display(), output_path.display());
            }
        }
    }

    // RUN — the synchronous path never supplies input.
    let (mut run, command_name) = descriptor.run_command(&source);
    let ran = run
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;
    let result = match ran {
        Err(err) => {
            store.release(&source, &[]).await;
            return Err(ExecError::RunInvocation {
                command: command_name,
                source: err,
            });
        }
        Ok(out) => {
            if !out.status.success() {
                log::debug!("program exited with {}", out.status);
            }
            ExecutionOutput {
                output: String::from_utf8_lossy(&out.stdout).into_owned(),
                error: String::from_utf8_lossy(&out.stderr).into_owned(),
            }
        }
    };

    // CLEANUP — no exceptions, the executed artifact goes too.
    store.release(&source, &[]).await;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{CompileArg, CompileTemplate, Descriptor, RunTemplate, Transform};

    // Descriptors built on `sh` and `cp` so the tests do not depend on any
    // real language toolchain being installed.
    fn shell_descriptor() -> Descriptor {
        Descriptor {
            source_ext: "py",
            compile: None,
            run: RunTemplate::Interpreter { tool: "sh" },
            transform: Transform::None,
            interactive: true,
        }
    }

    fn copy_compile_descriptor() -> Descriptor {
        Descriptor {
            source_ext: "c",
            compile: Some(CompileTemplate {
                tool: "cp",
                args: &[CompileArg::Source, CompileArg::Output],
                output_ext: "exe",
            }),
            run: RunTemplate::Hosted { tool: "sh" },
            transform: Transform::None,
            interactive: true,
        }
    }

    fn scratch_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        (dir, store)
    }

    fn artifact_count(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn interpreted_run_captures_stdout_and_cleans_up() {
        let (dir, store) = scratch_store();
        let result = execute(&store, &shell_descriptor(), "echo hello")
            .await
            .unwrap();
        assert_eq!(result.output, "hello\n");
        assert_eq!(result.error, "");
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_output_not_error() {
        let (dir, store) = scratch_store();
        let result = execute(&store, &shell_descriptor(), "echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(result.output, "");
        assert_eq!(result.error, "oops\n");
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn compiled_run_executes_the_compile_output() {
        let (dir, store) = scratch_store();
        // "Compilation" copies the script to the .exe artifact, which the
        // hosted run template then feeds back to sh.
        let result = execute(&store, &copy_compile_descriptor(), "echo built")
            .await
            .unwrap();
        assert_eq!(result.output, "built\n");
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn compile_failure_surfaces_diagnostics_and_cleans_up() {
        let (dir, store) = scratch_store();
        let descriptor = Descriptor {
            compile: Some(CompileTemplate {
                tool: "sh",
                args: &[
                    CompileArg::Lit("-c"),
                    CompileArg::Lit("echo 'syntax error near line 1' >&2; exit 1"),
                ],
                output_ext: "exe",
            }),
            ..copy_compile_descriptor()
        };
        let err = execute(&store, &descriptor, "whatever").await.unwrap_err();
        match err {
            ExecError::Compile { diagnostics } => {
                assert!(diagnostics.unwrap().contains("syntax error near line 1"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn compile_diagnostics_fall_back_to_stdout() {
        let (_dir, store) = scratch_store();
        let descriptor = Descriptor {
            compile: Some(CompileTemplate {
                tool: "sh",
                args: &[CompileArg::Lit("-c"), CompileArg::Lit("echo TS2304; exit 2")],
                output_ext: "exe",
            }),
            ..copy_compile_descriptor()
        };
        let err = execute(&store, &descriptor, "whatever").await.unwrap_err();
        match err {
            ExecError::Compile { diagnostics } => {
                assert!(diagnostics.unwrap().contains("TS2304"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_toolchain_is_a_compile_error() {
        let (dir, store) = scratch_store();
        let descriptor = Descriptor {
            compile: Some(CompileTemplate {
                tool: "runlet-no-such-compiler",
                args: &[CompileArg::Source],
                output_ext: "exe",
            }),
            ..copy_compile_descriptor()
        };
        let err = execute(&store, &descriptor, "whatever").await.unwrap_err();
        assert!(matches!(err, ExecError::Compile { diagnostics: Some(_) }));
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_run_invocation_error() {
        let (dir, store) = scratch_store();
        let descriptor = Descriptor {
            run: RunTemplate::Interpreter {
                tool: "runlet-no-such-interpreter",
            },
            ..shell_descriptor()
        };
        let err = execute(&store, &descriptor, "echo hi").await.unwrap_err();
        assert!(matches!(err, ExecError::RunInvocation { .. }));
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn repeat_runs_do_not_interfere() {
        let (dir, store) = scratch_store();
        let descriptor = copy_compile_descriptor();
        let first = execute(&store, &descriptor, "echo once").await.unwrap();
        let second = execute(&store, &descriptor, "echo once").await.unwrap();
        assert_eq!(first.output, second.output);
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn c_transform_is_applied_before_persisting() {
        let (_dir, store) = scratch_store();
        // sh descriptor with the C shim: `cat`ing the persisted file back
        // shows the injected statement.
        let descriptor = Descriptor {
            source_ext: "c",
            compile: None,
            run: RunTemplate::Interpreter { tool: "cat" },
            transform: Transform::InjectMainShim,
            interactive: true,
        };
        let result = execute(&store, &descriptor, "int main(void) {\nreturn 0;\n}")
            .await
            .unwrap();
        assert!(result.output.contains("setbuf(stdout, NULL);"));

        // No main signature: persisted byte-for-byte.
        let untouched = "int helper(void) { return 1; }";
        let result = execute(&store, &descriptor, untouched).await.unwrap();
        assert_eq!(result.output, untouched);
    }

    #[tokio::test]
    async fn concurrent_runs_share_the_working_directory_safely() {
        let (dir, store) = scratch_store();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                execute(&store, &shell_descriptor(), &format!("echo run-{i}")).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.output, format!("run-{i}\n"));
        }
        assert_eq!(artifact_count(&dir), 0);
    }
}
