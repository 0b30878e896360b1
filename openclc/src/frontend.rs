use crate::{
    ast::TranslationUnit,
    lang::{ClStd, Dialect},
};
use anyhow::{bail, format_err, Context, Result};
use std::{
    borrow::Cow,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, Output},
};

pub const TARGET: &str = "spirv64-unknown-unknown";

/// Runs `command` to completion, capturing stdout and stderr.
fn output(command: &mut Command) -> Result<(String, Output)> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!("{command:?}");
    let output = command
        .output()
        .with_context(|| format!("failed to run `{program}`"))?;
    Ok((program, output))
}

fn stderr(output: &Output) -> Cow<str> {
    match String::from_utf8_lossy(&output.stderr) {
        Cow::Borrowed(x) => Cow::Borrowed(x.trim_end()),
        Cow::Owned(x) => Cow::Owned(x.trim_end().to_string()),
    }
}

/// Runs `command`, returning stdout.
///
/// stderr is collected and logged if not empty. Fails if the command does not exit successfully.
pub fn run(command: &mut Command) -> Result<Vec<u8>> {
    let (program, output) = self::output(command)?;
    let stderr = stderr(&output);
    if output.status.success() {
        if !stderr.is_empty() {
            tracing::warn!("{stderr}");
        }
        Ok(output.stdout)
    } else {
        if !stderr.is_empty() {
            tracing::error!("{stderr}");
        }
        bail!("`{program}` failed with {}", output.status)
    }
}

/** Reads the AST dumped by `clang -ast-dump=json`.

The whole input is parsed as device code, so host code usually fails to compile. clang recovers
and still dumps the AST, which is kept. Only the kernels are compiled afterwards, errors in those
are reported then. Fails if no AST was dumped. */
fn read_ast(program: &str, output: &Output, path: &Path) -> Result<TranslationUnit> {
    let stderr = stderr(output);
    let main_file = path.to_string_lossy();
    match TranslationUnit::from_json(&output.stdout, &main_file) {
        Ok(unit) => {
            if !stderr.is_empty() {
                tracing::debug!("diagnostics of `{}` as device code:\n{stderr}", path.display());
            }
            Ok(unit)
        }
        Err(e) => {
            if !stderr.is_empty() {
                tracing::error!("{stderr}");
            }
            if output.status.success() {
                Err(format_err!("failed to parse the AST of `{}`: {e}", path.display()))
            } else {
                bail!("`{program}` failed with {}", output.status)
            }
        }
    }
}

/// Options for the device frontend.
#[derive(Clone, Debug)]
pub struct FrontendOptions {
    pub std: ClStd,
    /// `-W<name>`, ie "all", "error", "no-unused".
    pub warnings: Vec<String>,
    pub includes: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub debug: bool,
}

/// Parses and lowers device code.
pub trait Frontend {
    /// The function declarations of `path`.
    fn parse(&self, path: &Path) -> Result<TranslationUnit>;
    /// Compiles `input`, written in `dialect`, to LLVM bitcode at `output`.
    fn emit_llvm(&self, input: &Path, dialect: Dialect, output: &Path) -> Result<()>;
}

/// Invokes `clang`.
#[derive(Clone, Debug)]
pub struct ClangFrontend {
    clang: PathBuf,
    options: FrontendOptions,
    runtime_include: Option<PathBuf>,
}

impl ClangFrontend {
    pub fn new(clang: impl Into<PathBuf>, options: FrontendOptions) -> Self {
        Self {
            clang: clang.into(),
            options,
            runtime_include: None,
        }
    }
    /// Adds `dir`, which holds `oclc_rt.h`, to the include path when parsing inputs.
    pub fn runtime_include(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_include.replace(dir.into());
        self
    }
    fn parse_command(&self, path: &Path) -> Result<Command> {
        let dialect = Dialect::from_path(path)?;
        let mut command = self.command(path, dialect)?;
        if let Some(dir) = self.runtime_include.as_ref() {
            command.arg(concat_os("-I", dir.as_os_str()));
        }
        command
            .args(["-ferror-limit=0", "-fsyntax-only", "-Xclang", "-ast-dump=json"])
            .arg(path);
        Ok(command)
    }
    fn command(&self, input: &Path, dialect: Dialect) -> Result<Command> {
        let options = &self.options;
        let mut command = Command::new(&self.clang);
        command
            .args(["-x", dialect.clang_language()])
            .arg(dialect.cl_std_flag(options.std, input)?)
            .args(["-target", TARGET])
            .args(["-Xclang", "-finclude-default-header"])
            .arg("-D__SPIRV__");
        for warning in dialect.default_warnings() {
            command.arg(format!("-W{warning}"));
        }
        for warning in options.warnings.iter() {
            command.arg(format!("-W{warning}"));
        }
        for include in options.includes.iter() {
            command.arg(concat_os("-I", include.as_os_str()));
        }
        for define in options.defines.iter() {
            command.arg(format!("-D{define}"));
        }
        Ok(command)
    }
}

fn concat_os(prefix: &str, value: &OsStr) -> std::ffi::OsString {
    let mut arg = std::ffi::OsString::from(prefix);
    arg.push(value);
    arg
}

impl Frontend for ClangFrontend {
    fn parse(&self, path: &Path) -> Result<TranslationUnit> {
        let (program, output) = output(&mut self.parse_command(path)?)?;
        read_ast(&program, &output, path)
    }
    fn emit_llvm(&self, input: &Path, dialect: Dialect, output: &Path) -> Result<()> {
        let mut command = self.command(input, dialect)?;
        if self.options.debug {
            command.arg("-g");
        }
        command
            .args(["-c", "-emit-llvm"])
            .arg(input)
            .arg("-o")
            .arg(output);
        run(&mut command)?;
        Ok(())
    }
}
