//! Compiler options.

use std::path::PathBuf;

use rulegen_classfile::ClassVersion;

use crate::RuntimeClasses;

/// Environment variable naming a directory for generated class dumps.
pub const DUMP_DIR_VAR: &str = "RULEGEN_DUMP_DIR";
/// Environment variable enabling self-verification of generated classes.
pub const VERIFY_VAR: &str = "RULEGEN_VERIFY";
/// Environment variable enabling the execution trace in generated classes.
pub const TRACE_VAR: &str = "RULEGEN_TRACE";

/// Options controlling adapter generation.
///
/// # Example
///
/// ```ignore
/// let options = CompilerOptions::default()
///     .with_verify(true)
///     .with_dump_dir("/tmp/adapters");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Emit the gated `"<rule> execute()"` trace at the top of `execute`.
    pub emit_trace: bool,
    /// Run the structural verifier over every generated class before loading.
    pub verify: bool,
    /// Write every generated class below this directory.
    pub dump_dir: Option<PathBuf>,
    /// Class file version of generated classes.
    pub version: ClassVersion,
    /// Names of the runtime types generated code links against.
    pub runtime: RuntimeClasses,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            emit_trace: true,
            verify: cfg!(debug_assertions),
            dump_dir: None,
            version: ClassVersion::V1_5,
            runtime: RuntimeClasses::default(),
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `RULEGEN_DUMP_DIR`, `RULEGEN_VERIFY` and
    /// `RULEGEN_TRACE`. Flags accept `1`/`true`/`yes`/`on` and
    /// `0`/`false`/`no`/`off`; anything else leaves the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(dir) = lookup(DUMP_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            options.dump_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(VERIFY_VAR).as_deref().and_then(parse_flag) {
            options.verify = flag;
        }
        if let Some(flag) = lookup(TRACE_VAR).as_deref().and_then(parse_flag) {
            options.emit_trace = flag;
        }
        options
    }

    pub fn with_trace(mut self, emit_trace: bool) -> Self {
        self.emit_trace = emit_trace;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn with_version(mut self, version: ClassVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeClasses) -> Self {
        self.runtime = runtime;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
