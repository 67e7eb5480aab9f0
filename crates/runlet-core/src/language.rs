//! Per-language adapter descriptors.
//!
//! An adapter is a pure description of how to take a source text to a
//! running process: the canonical source extension, an optional compile
//! command template, a run command template, an optional pre-persist source
//! transform, and whether the language supports interactive execution. The
//! pipeline and session consume these descriptors; adapters never execute
//! anything themselves.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

/// Extension given to native binaries produced by compile stages.
///
/// Sharing one extension across gcc/g++/mcs/rustc output keeps the artifact
/// store's extension sweep uniform.
pub const BINARY_EXT: &str = "exe";

/// Every extension any adapter can leave in the working directory.
///
/// `release` sweeps this whole set for a base name; a toolchain byproduct
/// with an untracked extension would be an orphan, so compile templates are
/// written to only ever produce tracked extensions.
pub const TRACKED_EXTENSIONS: &[&str] =
    &["py", "js", "ts", "c", "cpp", "cs", "rs", "lua", BINARY_EXT];

/// The fixed set of supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    C,
    Cpp,
    CSharp,
    Rust,
    Lua,
}

impl Language {
    /// All supported languages, in the order they are documented.
    pub const ALL: &'static [Language] = &[
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Rust,
        Language::Lua,
    ];

    /// The identifier used in route paths and usage text.
    pub fn id(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Rust => "rust",
            Language::Lua => "lua",
        }
    }

    /// The adapter descriptor for this language.
    pub fn descriptor(&self) -> &'static Descriptor {
        match self {
            Language::Python => &Descriptor {
                source_ext: "py",
                compile: None,
                run: RunTemplate::Interpreter { tool: "python3" },
                transform: Transform::None,
                interactive: true,
            },
            Language::JavaScript => &Descriptor {
                source_ext: "js",
                compile: None,
                run: RunTemplate::Interpreter { tool: "node" },
                transform: Transform::None,
                interactive: false,
            },
            Language::TypeScript => &Descriptor {
                source_ext: "ts",
                compile: Some(CompileTemplate {
                    tool: "tsc",
                    args: &[CompileArg::Source],
                    output_ext: "js",
                }),
                run: RunTemplate::Hosted { tool: "node" },
                transform: Transform::None,
                interactive: false,
            },
            Language::C => &Descriptor {
                source_ext: "c",
                compile: Some(CompileTemplate {
                    tool: "gcc",
                    args: &[CompileArg::Source, CompileArg::Lit("-o"), CompileArg::Output],
                    output_ext: BINARY_EXT,
                }),
                run: RunTemplate::Binary,
                transform: Transform::InjectMainShim,
                interactive: true,
            },
            Language::Cpp => &Descriptor {
                source_ext: "cpp",
                compile: Some(CompileTemplate {
                    tool: "g++",
                    args: &[CompileArg::Source, CompileArg::Lit("-o"), CompileArg::Output],
                    output_ext: BINARY_EXT,
                }),
                run: RunTemplate::Binary,
                transform: Transform::None,
                interactive: true,
            },
            Language::CSharp => &Descriptor {
                source_ext: "cs",
                compile: Some(CompileTemplate {
                    tool: "mcs",
                    args: &[CompileArg::OutputFlag { prefix: "-out:" }, CompileArg::Source],
                    output_ext: BINARY_EXT,
                }),
                run: RunTemplate::Hosted { tool: "mono" },
                transform: Transform::None,
                interactive: true,
            },
            Language::Rust => &Descriptor {
                source_ext: "rs",
                compile: Some(CompileTemplate {
                    tool: "rustc",
                    args: &[CompileArg::Source, CompileArg::Lit("-o"), CompileArg::Output],
                    output_ext: BINARY_EXT,
                }),
                run: RunTemplate::Binary,
                transform: Transform::None,
                interactive: true,
            },
            Language::Lua => &Descriptor {
                source_ext: "lua",
                compile: None,
                run: RunTemplate::Interpreter { tool: "lua" },
                transform: Transform::PrependLine {
                    line: "io.stdout:setvbuf(\"no\")",
                },
                interactive: true,
            },
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .iter()
            .copied()
            .find(|lang| lang.id() == s)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Returned when a route names a language outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language '{}'", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

/// A pure description of one language's toolchain.
#[derive(Debug)]
pub struct Descriptor {
    /// Canonical extension for persisted source files.
    pub source_ext: &'static str,
    /// Compile stage, absent for interpreted languages.
    pub compile: Option<CompileTemplate>,
    /// How to start the program once persisted (and compiled, if needed).
    pub run: RunTemplate,
    /// Source-text rewrite applied before persisting.
    pub transform: Transform,
    /// Whether `/io/{language}` sessions are supported.
    pub interactive: bool,
}

impl Descriptor {
    /// Build the compile invocation for `source`, or `None` for interpreted
    /// languages. The returned path is where the compiled output will land.
    pub fn compile_command(&self, source: &Path) -> Option<(Command, std::path::PathBuf)> {
        let template = self.compile.as_ref()?;
        let output = source.with_extension(template.output_ext);
        let mut cmd = Command::new(template.tool);
        for arg in template.args {
            match arg {
                CompileArg::Lit(lit) => {
                    cmd.arg(lit);
                }
                CompileArg::Source => {
                    cmd.arg(source);
                }
                CompileArg::Output => {
                    cmd.arg(&output);
                }
                CompileArg::OutputFlag { prefix } => {
                    let mut flag = std::ffi::OsString::from(prefix);
                    flag.push(&output);
                    cmd.arg(flag);
                }
            }
        }
        Some((cmd, output))
    }

    /// Build the run invocation for a persisted (and possibly compiled)
    /// program, plus the name reported when the invocation cannot start.
    pub fn run_command(&self, source: &Path) -> (Command, String) {
        match &self.run {
            RunTemplate::Interpreter { tool } => {
                let mut cmd = Command::new(tool);
                cmd.arg(source);
                (cmd, tool.to_string())
            }
            RunTemplate::Binary => {
                let binary = self.output_path(source);
                let cmd = Command::new(&binary);
                (cmd, binary.display().to_string())
            }
            RunTemplate::Hosted { tool } => {
                let mut cmd = Command::new(tool);
                cmd.arg(self.output_path(source));
                (cmd, tool.to_string())
            }
        }
    }

    /// Apply this language's source transform.
    pub fn transform_source(&self, source: &str) -> TransformOutcome {
        self.transform.apply(source)
    }

    fn output_path(&self, source: &Path) -> std::path::PathBuf {
        let ext = self
            .compile
            .as_ref()
            .map(|c| c.output_ext)
            .unwrap_or(BINARY_EXT);
        source.with_extension(ext)
    }
}

/// Compile command template. `Source` and `Output` are substituted with the
/// artifact paths at invocation time.
#[derive(Debug)]
pub struct CompileTemplate {
    pub tool: &'static str,
    pub args: &'static [CompileArg],
    /// Extension of the file the toolchain produces next to the source.
    pub output_ext: &'static str,
}

/// One argument slot in a compile template.
#[derive(Debug)]
pub enum CompileArg {
    Lit(&'static str),
    Source,
    Output,
    /// A single argument gluing a flag prefix to the output path (mcs style:
    /// `-out:/path/to/base.exe`).
    OutputFlag { prefix: &'static str },
}

/// Run command template.
#[derive(Debug)]
pub enum RunTemplate {
    /// `tool <source>` — interpreted languages.
    Interpreter { tool: &'static str },
    /// Execute the compile output directly.
    Binary,
    /// `tool <compile output>` — node on tsc output, mono on mcs output.
    Hosted { tool: &'static str },
}

/// Source-text rewrite applied before the source is persisted.
#[derive(Debug)]
pub enum Transform {
    None,
    /// Insert an unbuffered-stdout call as the first statement of `main`,
    /// located by a pattern match on the entry-point signature. Interactive
    /// C programs never stream output without it because libc switches to
    /// full buffering on a pipe.
    InjectMainShim,
    /// Unconditionally prepend one line to the file.
    PrependLine { line: &'static str },
}

/// Result of applying a [`Transform`]: the text to persist plus whether the
/// transform actually took effect. `applied` is false either when the
/// language has no transform or when the shim pattern failed to match; the
/// caller decides whether that is worth a warning.
#[derive(Debug)]
pub struct TransformOutcome {
    pub text: String,
    pub applied: bool,
}

const MAIN_SHIM: &str = "setbuf(stdout, NULL);";

fn main_signature() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // `int main(...)` followed by its opening brace; the shim is
        // injected immediately after the brace.
        Regex::new(r"int\s+main\s*\([^)]*\)\s*\{").expect("main signature pattern is valid")
    })
}

impl Transform {
    fn apply(&self, source: &str) -> TransformOutcome {
        match self {
            Transform::None => TransformOutcome {
                text: source.to_string(),
                applied: false,
            },
            Transform::PrependLine { line } => TransformOutcome {
                text: format!("{line}\n{source}"),
                applied: true,
            },
            Transform::InjectMainShim => match main_signature().find(source) {
                Some(found) => {
                    let insert_at = found.end();
                    let mut text =
                        String::with_capacity(source.len() + MAIN_SHIM.len() + 1);
                    text.push_str(&source[..insert_at]);
                    text.push('\n');
                    text.push_str(MAIN_SHIM);
                    text.push_str(&source[insert_at..]);
                    TransformOutcome {
                        text,
                        applied: true,
                    }
                }
                None => TransformOutcome {
                    text: source.to_string(),
                    applied: false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn language_ids_round_trip() {
        for lang in Language::ALL {
            assert_eq!(lang.id().parse::<Language>().unwrap(), *lang);
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn interpreted_languages_have_no_compile_stage() {
        for lang in [Language::Python, Language::JavaScript, Language::Lua] {
            assert!(lang.descriptor().compile.is_none());
        }
    }

    #[test]
    fn javascript_and_typescript_are_not_interactive() {
        assert!(!Language::JavaScript.descriptor().interactive);
        assert!(!Language::TypeScript.descriptor().interactive);
        assert!(Language::Python.descriptor().interactive);
    }

    #[test]
    fn c_shim_is_injected_after_main_brace() {
        let source = "#include <stdio.h>\nint main(void) {\n  printf(\"hi\");\n}\n";
        let out = Language::C.descriptor().transform_source(source);
        assert!(out.applied);
        let shim_at = out.text.find(MAIN_SHIM).unwrap();
        let brace_at = out.text.find('{').unwrap();
        assert!(shim_at > brace_at);
        assert!(shim_at < out.text.find("printf").unwrap());
    }

    #[test]
    fn c_without_main_is_persisted_unmodified() {
        let source = "int helper(void) { return 1; }\n";
        let out = Language::C.descriptor().transform_source(source);
        assert!(!out.applied);
        assert_eq!(out.text, source);
    }

    #[test]
    fn lua_prepends_unbuffered_directive() {
        let out = Language::Lua.descriptor().transform_source("print(1)");
        assert!(out.applied);
        assert!(out.text.starts_with("io.stdout:setvbuf(\"no\")\n"));
        assert!(out.text.ends_with("print(1)"));
    }

    #[test]
    fn compile_output_shares_the_source_base_name() {
        let source = PathBuf::from("/tmp/work/123-abc.ts");
        let (_, output) = Language::TypeScript
            .descriptor()
            .compile_command(&source)
            .unwrap();
        assert_eq!(output, PathBuf::from("/tmp/work/123-abc.js"));

        let (_, output) = Language::C
            .descriptor()
            .compile_command(&source.with_extension("c"))
            .unwrap();
        assert_eq!(output, PathBuf::from("/tmp/work/123-abc.exe"));
    }

    #[test]
    fn every_compile_output_extension_is_tracked() {
        for lang in Language::ALL {
            let descriptor = lang.descriptor();
            assert!(TRACKED_EXTENSIONS.contains(&descriptor.source_ext));
            if let Some(compile) = &descriptor.compile {
                assert!(TRACKED_EXTENSIONS.contains(&compile.output_ext));
            }
        }
    }
}
