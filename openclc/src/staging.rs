use crate::{codegen::RUNTIME_HEADER_NAME, frontend::run};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

/// The runtime header, written next to generated sources.
pub const RUNTIME_HEADER: &str = include_str!("../../include/oclc_rt.h");

/// Libraries linked into every executable.
const LIBS: [&str; 5] = ["-loclc", "-lOpenCL", "-lpthread", "-ldl", "-lm"];

/// The directory holding generated sources.
#[derive(Clone, Debug)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    /// Creates `dir` if needed and writes the runtime header.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create `{}`", dir.display()))?;
        let staging = Self { dir };
        staging.write(RUNTIME_HEADER_NAME, RUNTIME_HEADER)?;
        Ok(staging)
    }
    pub fn dir(&self) -> &Path {
        &self.dir
    }
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
    /// Writes `contents` to `name`, returning its path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, contents)
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        tracing::debug!("wrote {}", path.display());
        Ok(path)
    }
}

/// The host compiler invocation linking `sources` into `output`.
pub fn link_command(
    cc: &str,
    sources: &[PathBuf],
    staging: &Staging,
    runtime_dir: &Path,
    output: &Path,
) -> Command {
    let mut command = Command::new(cc);
    command.args(sources);
    let mut include = std::ffi::OsString::from("-I");
    include.push(staging.dir());
    let mut lib_dir = std::ffi::OsString::from("-L");
    lib_dir.push(runtime_dir);
    command
        .arg(include)
        .arg(lib_dir)
        .args(LIBS)
        .arg("-o")
        .arg(output);
    command
}

/// Compiles and links the generated sources with the runtime library.
pub fn link(
    cc: &str,
    sources: &[PathBuf],
    staging: &Staging,
    runtime_dir: &Path,
    output: &Path,
) -> Result<()> {
    run(&mut link_command(cc, sources, staging, runtime_dir, output))
        .with_context(|| format!("failed to link `{}`", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("openclc-{name}-{}", std::process::id()))
    }

    #[test]
    fn staging_dir() {
        let dir = temp_dir("staging");
        let staging = Staging::create(&dir).unwrap();
        let header = fs::read_to_string(dir.join("oclc_rt.h")).unwrap();
        assert!(header.contains("int oclcDispatch("));
        let path = staging.write("add.c", "int x;\n").unwrap();
        assert_eq!(path, dir.join("add.c"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "int x;\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn host_compiler_args() {
        let dir = temp_dir("link");
        let staging = Staging::create(&dir).unwrap();
        let sources = [dir.join("a.c"), dir.join("b.cpp")];
        let runtime_dir = Path::new("/opt/oclc/lib");
        let command = link_command("c++", &sources, &staging, runtime_dir, Path::new("app"));
        assert_eq!(command.get_program(), "c++");
        let args: Vec<String> = command
            .get_args()
            .map(|x| x.to_string_lossy().into_owned())
            .collect();
        let staged = dir.to_string_lossy();
        assert_eq!(
            args,
            [
                format!("{staged}/a.c"),
                format!("{staged}/b.cpp"),
                format!("-I{staged}"),
                "-L/opt/oclc/lib".to_string(),
                "-loclc".to_string(),
                "-lOpenCL".to_string(),
                "-lpthread".to_string(),
                "-ldl".to_string(),
                "-lm".to_string(),
                "-o".to_string(),
                "app".to_string(),
            ]
        );
        fs::remove_dir_all(&dir).unwrap();
    }
}
