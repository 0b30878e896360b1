use crate::{
    ast::{FunctionDecl, ParamDecl, TranslationUnit},
    error::CompileError,
};
use itertools::Itertools;
use oclc_core::kernel::{KernelDeclaration, KernelParam};

/// Address space qualifiers removed from parameter types.
const BUFFER_QUALIFIERS: [&str; 4] = ["__global", "global", "__constant", "constant"];
const LOCAL_QUALIFIERS: [&str; 2] = ["__local", "local"];

/// Collects the kernels declared in a file.
#[derive(Debug, Default)]
pub struct KernelExtractor {
    kernels: Vec<KernelDeclaration>,
}

impl KernelExtractor {
    pub fn new() -> Self {
        Self::default()
    }
    /// Visits every function of `unit` in order.
    pub fn extract(&mut self, unit: &TranslationUnit) -> Result<(), CompileError> {
        for function in unit.functions.iter() {
            self.visit(function)?;
        }
        Ok(())
    }
    /// Adds `function` if it is a kernel defined in the input file.
    ///
    /// **errors**
    ///
    /// - The kernel returns a value.
    /// - A parameter is in local memory.
    /// - The kernel has no location, or ends before it begins.
    pub fn visit(&mut self, function: &FunctionDecl) -> Result<(), CompileError> {
        if !function.is_kernel || function.in_header || function.is_specialization {
            return Ok(());
        }
        let kernel = &function.name;
        if function.return_type != "void" {
            return Err(CompileError::KernelReturnType {
                kernel: kernel.clone(),
                ty: function.return_type.clone(),
            });
        }
        let params = function
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| kernel_param(kernel, index, param))
            .collect::<Result<Vec<_>, _>>()?;
        let (begin, end) = function
            .begin
            .zip(function.end)
            .ok_or_else(|| CompileError::MissingLocation {
                kernel: kernel.clone(),
            })?;
        tracing::debug!("found kernel `{kernel}` at {begin}");
        self.kernels
            .push(KernelDeclaration::new(kernel.as_str(), params, begin, end)?);
        Ok(())
    }
    /// The kernels found so far, leaving the extractor empty for the next file.
    pub fn take(&mut self) -> Vec<KernelDeclaration> {
        std::mem::take(&mut self.kernels)
    }
}

fn kernel_param(
    kernel: &str,
    index: usize,
    param: &ParamDecl,
) -> Result<KernelParam, CompileError> {
    let tokens: Vec<&str> = param.ty.split_whitespace().collect();
    if tokens.iter().any(|x| LOCAL_QUALIFIERS.contains(x)) {
        return Err(CompileError::LocalMemoryParam {
            kernel: kernel.to_string(),
            param: param.name.clone(),
        });
    }
    let ty = tokens
        .into_iter()
        .filter(|x| !BUFFER_QUALIFIERS.contains(x))
        .join(" ");
    let name = if param.name.is_empty() {
        format!("__oclc_param{index}")
    } else {
        param.name.clone()
    };
    Ok(KernelParam::new(ty, name))
}
