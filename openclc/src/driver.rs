/*!
The per-file pipeline.

Each input is parsed by the frontend, its kernels are extracted and their text compiled to one
SPIR-V module, which is embedded in a host source where each kernel is replaced by a dispatch
stub.
*/

use crate::{
    codegen,
    error::CompileError,
    extract::KernelExtractor,
    frontend::Frontend,
    isolate::isolate,
    lang::Dialect,
    spirv::{self, Backend, ModulePaths},
    staging::Staging,
};
use anyhow::{Context, Result};
use oclc_core::{kernel::KernelDeclaration, source::LineIndex};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// A generated host source.
#[derive(Clone, Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub dialect: Dialect,
    pub kernels: usize,
}

/// Compiles inputs into the staging directory.
pub struct Driver<'a> {
    frontend: &'a dyn Frontend,
    backend: &'a dyn Backend,
    staging: &'a Staging,
    extractor: KernelExtractor,
    stems: HashMap<String, PathBuf>,
}

impl<'a> Driver<'a> {
    pub fn new(frontend: &'a dyn Frontend, backend: &'a dyn Backend, staging: &'a Staging) -> Self {
        Self {
            frontend,
            backend,
            staging,
            extractor: KernelExtractor::new(),
            stems: HashMap::new(),
        }
    }
    /// Reserves the name of the staged files of `path`.
    fn stem(&mut self, path: &Path) -> Result<String, CompileError> {
        let stem = path
            .file_stem()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(first) = self.stems.get(&stem) {
            return Err(CompileError::DuplicateStem {
                stem,
                first: first.clone(),
                second: path.to_path_buf(),
            });
        }
        self.stems.insert(stem.clone(), path.to_path_buf());
        Ok(stem)
    }
    /// Compiles `path`, returning the generated host source.
    pub fn compile(&mut self, path: &Path) -> Result<StagedFile> {
        let dialect = Dialect::from_path(path)?;
        let stem = self.stem(path)?;
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let unit = self.frontend.parse(path)?;
        let extracted = self.extractor.extract(&unit);
        let kernels = self.extractor.take();
        extracted?;
        let index = LineIndex::new(&source);
        let device = isolate(&source, &index, &kernels)?;
        let spirv = if kernels.is_empty() {
            tracing::warn!("no kernels found in `{}`", path.display());
            Vec::new()
        } else {
            tracing::debug!("device code of `{}`:\n{}", path.display(), device.text);
            self.compile_device(&stem, dialect, &device.text, &kernels)
                .with_context(|| format!("failed to compile the kernels of `{}`", path.display()))?
        };
        let input = path.to_string_lossy();
        let host = codegen::host_source(&input, &source, &kernels, &device.spans, &spirv);
        let staged = self
            .staging
            .write(&format!("{stem}.{}", dialect.host_extension()), host)?;
        self.staging.write(
            &format!("{stem}.oclc.h"),
            codegen::prototypes(&stem, &kernels),
        )?;
        Ok(StagedFile {
            path: staged,
            dialect,
            kernels: kernels.len(),
        })
    }
    fn compile_device(
        &self,
        stem: &str,
        dialect: Dialect,
        device: &str,
        kernels: &[KernelDeclaration],
    ) -> Result<Vec<u32>> {
        let paths = ModulePaths::new(self.staging.dir(), stem, dialect.clang_language());
        fs::write(&paths.device, device)
            .with_context(|| format!("failed to write `{}`", paths.device.display()))?;
        self.frontend
            .emit_llvm(&paths.device, dialect, &paths.bitcode)?;
        let words = self.backend.lower(&paths.bitcode, &paths.spirv)?;
        spirv::check_module(&words, kernels, self.backend.version())?;
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{FunctionDecl, ParamDecl, TranslationUnit},
        lang::SpvVersion,
    };
    use oclc_core::source::SourceLocation;

    fn function(name: &str, is_kernel: bool, begin: usize, end: usize) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            return_type: if is_kernel { "void" } else { "int" }.to_string(),
            is_kernel,
            in_header: false,
            is_specialization: false,
            params: Vec::new(),
            begin: Some(SourceLocation::new(begin, 1)),
            end: Some(SourceLocation::new(end, 1)),
        }
    }

    /// Parses nothing but host functions, so no device tools are run.
    struct HostOnly;

    impl Frontend for HostOnly {
        fn parse(&self, _path: &Path) -> Result<TranslationUnit> {
            let mut main = function("main", false, 1, 1);
            main.params.push(ParamDecl {
                ty: "int".to_string(),
                name: "argc".to_string(),
            });
            main.end = Some(SourceLocation::new(1, 30));
            Ok(TranslationUnit {
                functions: vec![main],
            })
        }
        fn emit_llvm(&self, _input: &Path, _dialect: Dialect, _output: &Path) -> Result<()> {
            unreachable!()
        }
    }

    const VECTOR_ADD: &str = r#"#include "oclc_rt.h"

__kernel void add(__global float *a, uint n) {
    a[get_global_id(0)] += n;
}

int main(void) {
    oclc_context *ctx;
    oclcInit(&ctx);
    return 0;
}
"#;

    /// The AST clang recovers from `VECTOR_ADD`, which has errors in host code.
    struct VectorAdd;

    impl Frontend for VectorAdd {
        fn parse(&self, _path: &Path) -> Result<TranslationUnit> {
            let mut add = function("add", true, 3, 5);
            add.params = vec![
                ParamDecl {
                    ty: "__global float *".to_string(),
                    name: "a".to_string(),
                },
                ParamDecl {
                    ty: "uint".to_string(),
                    name: "n".to_string(),
                },
            ];
            Ok(TranslationUnit {
                functions: vec![add, function("main", false, 7, 11)],
            })
        }
        fn emit_llvm(&self, input: &Path, dialect: Dialect, output: &Path) -> Result<()> {
            assert_eq!(dialect, Dialect::OpenClC);
            let device = fs::read_to_string(input)?;
            assert!(!device.contains("main"));
            fs::write(output, device)?;
            Ok(())
        }
    }

    /// Emits a module with an empty kernel for each name.
    struct Kernels(&'static [&'static str]);

    impl Backend for Kernels {
        fn version(&self) -> SpvVersion {
            SpvVersion::V1_0
        }
        fn lower(&self, bitcode: &Path, _spirv: &Path) -> Result<Vec<u32>> {
            assert!(bitcode.exists());
            Ok(spirv::tests::module(self.0, (1, 0)))
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("openclc-driver-{name}-{}", std::process::id()))
    }

    #[test]
    fn host_only_source() {
        let dir = temp_dir("host");
        let staging = Staging::create(dir.join("staging")).unwrap();
        let input = dir.join("main.cl");
        let source = "int main(int argc) { return 0; }\n";
        fs::write(&input, source).unwrap();
        let mut driver = Driver::new(&HostOnly, &Kernels(&[]), &staging);
        let staged = driver.compile(&input).unwrap();
        assert_eq!(staged.kernels, 0);
        assert_eq!(staged.dialect, Dialect::OpenClC);
        assert_eq!(staged.path, staging.path("main.c"));
        let host = fs::read_to_string(&staged.path).unwrap();
        assert!(host.contains("#include \"oclc_rt.h\""));
        assert!(!host.contains("__oclc_spv_bin"));
        assert!(host.ends_with(source));
        assert!(staging.path("main.oclc.h").exists());
        let error = driver.compile(&input).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CompileError>(),
            Some(CompileError::DuplicateStem { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn kernels_and_host_code() {
        let dir = temp_dir("vector-add");
        let staging = Staging::create(dir.join("staging")).unwrap();
        let input = dir.join("vector_add.cl");
        fs::write(&input, VECTOR_ADD).unwrap();
        let mut driver = Driver::new(&VectorAdd, &Kernels(&["add"]), &staging);
        let staged = driver.compile(&input).unwrap();
        assert_eq!(staged.kernels, 1);
        assert_eq!(staged.path, staging.path("vector_add.c"));
        let device = fs::read_to_string(staging.path("vector_add.device.cl")).unwrap();
        assert!(device.starts_with("__kernel void add(__global float *a, uint n) {"));
        assert!(device.ends_with("}\n"));
        let host = fs::read_to_string(&staged.path).unwrap();
        assert!(host.contains("static const unsigned char __oclc_spv_bin["));
        assert!(host.contains(
            "int add(oclc_context* __oclc_ctx, dim3 __oclc_grid, dim3 __oclc_block, float *a, uint n)"
        ));
        assert!(host.contains("oclcArgBuffer((oclc_mem)a),"));
        assert!(host.contains("oclcArgValue(&n, sizeof(n)),"));
        assert!(!host.contains("__kernel"));
        assert!(host.contains("int main(void) {\n    oclc_context *ctx;\n    oclcInit(&ctx);"));
        let header = fs::read_to_string(staging.path("vector_add.oclc.h")).unwrap();
        assert!(header.contains("int add(oclc_context* __oclc_ctx"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_entry_point() {
        let dir = temp_dir("missing");
        let staging = Staging::create(dir.join("staging")).unwrap();
        let input = dir.join("vector_add.cl");
        fs::write(&input, VECTOR_ADD).unwrap();
        let mut driver = Driver::new(&VectorAdd, &Kernels(&["sub"]), &staging);
        let error = driver.compile(&input).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CompileError>(),
            Some(CompileError::MissingEntryPoint { kernel }) if kernel == "add"
        ));
        assert!(!staging.path("vector_add.c").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_extension() {
        let dir = temp_dir("ext");
        let staging = Staging::create(&dir).unwrap();
        let mut driver = Driver::new(&HostOnly, &Kernels(&[]), &staging);
        let error = driver.compile(Path::new("main.c")).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CompileError>(),
            Some(CompileError::InvalidExtension { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
