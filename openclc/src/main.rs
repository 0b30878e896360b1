/*!
openclc compiles OpenCL C / C++ sources containing both host and device code.

Kernels are compiled to SPIR-V and replaced by host functions that launch them through the
`oclc` runtime with CUDA style grid and block dimensions.

```text
openclc vector_add.cl -o vector_add
```
*/

use anyhow::{Context, Result};
use clap::Parser;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing_subscriber::EnvFilter;

mod ast;
mod codegen;
mod driver;
mod error;
mod extract;
mod frontend;
mod isolate;
mod lang;
mod spirv;
mod staging;

use driver::Driver;
use frontend::{ClangFrontend, FrontendOptions};
use lang::{ClStd, Dialect, SpvVersion};
use spirv::SpirvBackend;
use staging::Staging;

#[derive(clap::Parser, Debug)]
#[command(name = "openclc", version, about = "OpenCL Compiler")]
struct Cli {
    /// input files (.cl, .ocl, .clpp, .clcpp)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// output file
    #[arg(short = 'o', default_value = "a.out")]
    output: PathBuf,
    /// print debug messages
    #[arg(short = 'v')]
    verbose: bool,
    /// enable a warning, ie -Wall, -Werror, -Wno-unused-variable
    #[arg(short = 'W', value_name = "warning")]
    warnings: Vec<String>,
    /// add an include directory
    #[arg(short = 'I', value_name = "dir")]
    includes: Vec<PathBuf>,
    /// define a macro, ie -DN or -DN=4
    #[arg(short = 'D', value_name = "name[=value]")]
    defines: Vec<String>,
    /// skip SPIR-V optimization and emit debug info
    #[arg(short = 'g')]
    debug: bool,
    /// OpenCL language standard
    #[arg(long = "cl-std", value_enum, default_value = "CL1.2")]
    cl_std: ClStd,
    /// maximum SPIR-V version
    #[arg(long = "spv-version", value_enum, default_value = "1.0")]
    spv_version: SpvVersion,
    /// directory for generated sources
    #[arg(long, env = "OPENCLC_STAGING_DIR", default_value = "openclc-tmp")]
    staging_dir: PathBuf,
    /// directory containing liboclc.a [default: the directory of openclc]
    #[arg(long, env = "OPENCLC_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,
    /// host compiler [default: cc, or c++ for OpenCL C++ sources]
    #[arg(long, env = "OPENCLC_HOST_CC")]
    host_cc: Option<String>,
    /// clang executable
    #[arg(long, env = "OPENCLC_CLANG", default_value = "clang")]
    clang: PathBuf,
    /// llvm-spirv executable
    #[arg(long, env = "OPENCLC_LLVM_SPIRV", default_value = "llvm-spirv")]
    llvm_spirv: PathBuf,
    /// only write generated sources, do not compile and link
    #[arg(short = 'c', long = "no-link")]
    no_link: bool,
}

impl Cli {
    fn frontend_options(&self) -> FrontendOptions {
        FrontendOptions {
            std: self.cl_std,
            warnings: self.warnings.clone(),
            includes: self.includes.clone(),
            defines: self.defines.clone(),
            debug: self.debug,
        }
    }
    fn backend(&self) -> SpirvBackend {
        SpirvBackend::new(&self.llvm_spirv, self.spv_version, self.debug)
    }
    fn host_cc(&self, dialects: impl IntoIterator<Item = Dialect>) -> String {
        if let Some(host_cc) = self.host_cc.as_ref() {
            return host_cc.clone();
        }
        if dialects.into_iter().any(|x| x == Dialect::OpenClCpp) {
            "c++".to_string()
        } else {
            "cc".to_string()
        }
    }
    fn runtime_dir(&self) -> Result<PathBuf> {
        if let Some(runtime_dir) = self.runtime_dir.as_ref() {
            return Ok(runtime_dir.clone());
        }
        let exe = std::env::current_exe().context("unable to locate openclc")?;
        Ok(exe.parent().map(Path::to_path_buf).unwrap_or_default())
    }
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let staging = Staging::create(&cli.staging_dir)?;
    let frontend =
        ClangFrontend::new(&cli.clang, cli.frontend_options()).runtime_include(staging.dir());
    let backend = cli.backend();
    let mut driver = Driver::new(&frontend, &backend, &staging);
    let mut staged = Vec::with_capacity(cli.inputs.len());
    for input in cli.inputs.iter() {
        let file = driver.compile(input)?;
        tracing::debug!(
            "{} kernels from `{}` staged at `{}`",
            file.kernels,
            input.display(),
            file.path.display()
        );
        staged.push(file);
    }
    if cli.no_link {
        return Ok(());
    }
    let cc = cli.host_cc(staged.iter().map(|x| x.dialect));
    let sources: Vec<PathBuf> = staged.into_iter().map(|x| x.path).collect();
    staging::link(&cc, &sources, &staging, &cli.runtime_dir()?, &cli.output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
