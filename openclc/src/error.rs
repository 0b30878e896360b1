use crate::lang::ClStd;
use oclc_core::{kernel::error::DeclarationOrderError, source::error::SpanError};
use std::path::PathBuf;

/// Input errors, reported with the offending file or kernel.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid file extension for `{}`, use `.cl` or `.ocl` for OpenCL C and `.clpp` or `.clcpp` for OpenCL C++ source", path.display())]
    InvalidExtension { path: PathBuf },
    #[error("cannot compile OpenCL C file `{}` with {std}, use `.clpp` or `.clcpp` instead", path.display())]
    CppStandardForC { path: PathBuf, std: ClStd },
    #[error("`{}` and `{}` are both staged as `{stem}`", first.display(), second.display())]
    DuplicateStem {
        stem: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("kernel declaration `{kernel}` has return type `{ty}`")]
    KernelReturnType { kernel: String, ty: String },
    #[error("__local memory used in kernel `{kernel}` (parameter `{param}`), but dynamically allocated group-local memory is not supported")]
    LocalMemoryParam { kernel: String, param: String },
    #[error("kernel `{kernel}` has no source location")]
    MissingLocation { kernel: String },
    #[error(transparent)]
    DeclarationOrder(#[from] DeclarationOrderError),
    #[error("kernel `{kernel}` has an invalid span: {source}")]
    InvalidSpan { kernel: String, source: SpanError },
    #[error("kernel `{kernel}` overlaps kernel `{previous}`")]
    OverlappingSpans { kernel: String, previous: String },
    #[error("SPIR-V module of {len} bytes is not word aligned")]
    UnalignedModule { len: usize },
    #[error("kernel `{kernel}` is not an entry point of the compiled module")]
    MissingEntryPoint { kernel: String },
    #[error("compiled module has SPIR-V version {}.{}, requested {}.{}", found.0, found.1, requested.0, requested.1)]
    SpirvVersion {
        found: (u8, u8),
        requested: (u8, u8),
    },
}
