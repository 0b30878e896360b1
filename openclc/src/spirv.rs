/*!
SPIR-V translation, optimization and validation.
*/

use crate::{error::CompileError, frontend::run, lang::SpvVersion};
use anyhow::{format_err, Context, Result};
use oclc_core::kernel::KernelDeclaration;
use rspirv::{
    binary::Assemble,
    dr::Operand,
    spirv::ExecutionModel,
};
use spirv_tools::{opt::Optimizer, val::Validator};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

/// Lowers the LLVM bitcode of the device code to SPIR-V.
pub trait Backend {
    /// The maximum SPIR-V version of the modules produced.
    fn version(&self) -> SpvVersion;
    /// Lowers `bitcode` to an optimized and validated module, writing intermediates next to
    /// `spirv`.
    fn lower(&self, bitcode: &Path, spirv: &Path) -> Result<Vec<u32>>;
}

/// Lowers with `llvm-spirv` and SPIRV-Tools.
#[derive(Clone, Debug)]
pub struct SpirvBackend {
    llvm_spirv: PathBuf,
    version: SpvVersion,
    /// Skip optimization.
    debug: bool,
}

impl SpirvBackend {
    pub fn new(llvm_spirv: impl Into<PathBuf>, version: SpvVersion, debug: bool) -> Self {
        Self {
            llvm_spirv: llvm_spirv.into(),
            version,
            debug,
        }
    }
}

impl Backend for SpirvBackend {
    fn version(&self) -> SpvVersion {
        self.version
    }
    fn lower(&self, bitcode: &Path, spirv: &Path) -> Result<Vec<u32>> {
        translate(&self.llvm_spirv, bitcode, spirv, self.version)?;
        let bytes =
            fs::read(spirv).with_context(|| format!("failed to read `{}`", spirv.display()))?;
        optimize(&words(&bytes)?, self.version, self.debug)
    }
}

/// Translates LLVM bitcode to SPIR-V with `llvm-spirv`.
pub fn translate(
    llvm_spirv: &Path,
    input: &Path,
    output: &Path,
    version: SpvVersion,
) -> Result<()> {
    let mut command = Command::new(llvm_spirv);
    command
        .arg(version.max_version_flag())
        .arg(input)
        .arg("-o")
        .arg(output);
    run(&mut command)?;
    Ok(())
}

/// Reads a module as words.
///
/// **errors**
///
/// The module is not a whole number of words or is not valid SPIR-V.
pub fn words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(CompileError::UnalignedModule { len: bytes.len() }.into());
    }
    let module =
        rspirv::dr::load_bytes(bytes).map_err(|e| format_err!("invalid SPIR-V module: {e}"))?;
    Ok(module.assemble())
}

/// Runs the performance passes unless `debug` and validates the result.
pub fn optimize(words: &[u32], version: SpvVersion, debug: bool) -> Result<Vec<u32>> {
    let target_env = version.target_env();
    let words = if debug {
        words.to_vec()
    } else {
        let mut optimizer = spirv_tools::opt::create(Some(target_env));
        optimizer.register_performance_passes();
        optimizer
            .optimize(
                words,
                &mut |message: spirv_tools::error::Message| {
                    tracing::debug!("spirv-opt: {}", message.message)
                },
                None,
            )
            .context("optimization passes failed")?
            .as_words()
            .to_vec()
    };
    let validator = spirv_tools::val::create(Some(target_env));
    validator
        .validate(&words, None)
        .context("validation failed")?;
    Ok(words)
}

/// Checks that every kernel is an entry point and the module does not exceed `version`.
pub fn check_module(
    words: &[u32],
    kernels: &[KernelDeclaration],
    version: SpvVersion,
) -> Result<()> {
    let module = rspirv::dr::load_words(words).map_err(|e| format_err!("{e}"))?;
    if let Some(header) = module.header.as_ref() {
        let found = header.version();
        let requested = version.major_minor();
        if found > requested {
            return Err(CompileError::SpirvVersion { found, requested }.into());
        }
    }
    let entry_points: HashSet<&str> = module
        .entry_points
        .iter()
        .filter_map(|inst| match inst.operands.as_slice() {
            [
                Operand::ExecutionModel(ExecutionModel::Kernel),
                Operand::IdRef(_),
                Operand::LiteralString(name),
                ..,
            ] => Some(name.as_str()),
            _ => None,
        })
        .collect();
    for kernel in kernels {
        if !entry_points.contains(kernel.name()) {
            return Err(CompileError::MissingEntryPoint {
                kernel: kernel.name().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Intermediate files of one input.
#[derive(Clone, Debug)]
pub struct ModulePaths {
    pub device: PathBuf,
    pub bitcode: PathBuf,
    pub spirv: PathBuf,
}

impl ModulePaths {
    pub fn new(dir: &Path, stem: &str, device_extension: &str) -> Self {
        Self {
            device: dir.join(format!("{stem}.device.{device_extension}")),
            bitcode: dir.join(format!("{stem}.bc")),
            spirv: dir.join(format!("{stem}.spv")),
        }
    }
}
