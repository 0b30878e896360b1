/*!
Source dialects, language standards and SPIR-V versions.

The dialect is chosen by file extension. Every option maps to the flags of the external tools
through an exhaustive match.
*/

use crate::error::CompileError;
use spirv_tools::TargetEnv;
use std::path::Path;

/// The device language of an input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Dialect {
    #[display(fmt = "OpenCL C")]
    OpenClC,
    #[display(fmt = "OpenCL C++")]
    OpenClCpp,
}

impl Dialect {
    /// `.cl` / `.ocl` are OpenCL C, `.clpp` / `.clcpp` are OpenCL C++.
    pub fn from_path(path: &Path) -> Result<Self, CompileError> {
        match path.extension().and_then(|x| x.to_str()) {
            Some("cl" | "ocl") => Ok(Self::OpenClC),
            Some("clpp" | "clcpp") => Ok(Self::OpenClCpp),
            _ => Err(CompileError::InvalidExtension {
                path: path.to_path_buf(),
            }),
        }
    }
    /// The extension of the generated host source.
    pub fn host_extension(self) -> &'static str {
        match self {
            Self::OpenClC => "c",
            Self::OpenClCpp => "cpp",
        }
    }
    /// The `-x` language passed to clang.
    pub fn clang_language(self) -> &'static str {
        match self {
            Self::OpenClC => "cl",
            Self::OpenClCpp => "clcpp",
        }
    }
    /// Warnings disabled by default.
    pub fn default_warnings(self) -> &'static [&'static str] {
        match self {
            Self::OpenClC => &["no-unsafe-buffer-usage"],
            Self::OpenClCpp => &[
                "no-unsafe-buffer-usage",
                "no-c++98-compat",
                "no-missing-prototypes",
            ],
        }
    }
    /// The `-cl-std` flag for `std`.
    ///
    /// **errors**
    ///
    /// C++ standards cannot be used for OpenCL C files.
    pub fn cl_std_flag(self, std: ClStd, path: &Path) -> Result<&'static str, CompileError> {
        use ClStd::*;
        let flag = match (self, std) {
            (Self::OpenClC, Cl1_0) => "-cl-std=CL1.0",
            (Self::OpenClC, Cl1_1) => "-cl-std=CL1.1",
            (Self::OpenClC, Cl1_2) => "-cl-std=CL1.2",
            (Self::OpenClC, Cl2_0) => "-cl-std=CL2.0",
            (Self::OpenClC, Cl3_0) => "-cl-std=CL3.0",
            (Self::OpenClC, ClCpp | ClCpp2021) => {
                return Err(CompileError::CppStandardForC {
                    path: path.to_path_buf(),
                    std,
                })
            }
            (Self::OpenClCpp, ClCpp2021) => "-cl-std=clc++2021",
            (Self::OpenClCpp, Cl1_0 | Cl1_1 | Cl1_2 | Cl2_0 | Cl3_0 | ClCpp) => "-cl-std=clc++1.0",
        };
        Ok(flag)
    }
}

/// `--cl-std`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, derive_more::Display)]
pub enum ClStd {
    #[value(name = "CL1.0")]
    #[display(fmt = "CL1.0")]
    Cl1_0,
    #[value(name = "CL1.1")]
    #[display(fmt = "CL1.1")]
    Cl1_1,
    #[value(name = "CL1.2")]
    #[display(fmt = "CL1.2")]
    Cl1_2,
    #[value(name = "CL2.0")]
    #[display(fmt = "CL2.0")]
    Cl2_0,
    #[value(name = "CL3.0")]
    #[display(fmt = "CL3.0")]
    Cl3_0,
    #[value(name = "CLC++")]
    #[display(fmt = "CLC++")]
    ClCpp,
    #[value(name = "CLC++2021")]
    #[display(fmt = "CLC++2021")]
    ClCpp2021,
}

/// `--spv-version`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum, derive_more::Display)]
pub enum SpvVersion {
    #[value(name = "1.0")]
    #[display(fmt = "1.0")]
    V1_0,
    #[value(name = "1.1")]
    #[display(fmt = "1.1")]
    V1_1,
    #[value(name = "1.2")]
    #[display(fmt = "1.2")]
    V1_2,
    #[value(name = "1.3")]
    #[display(fmt = "1.3")]
    V1_3,
    #[value(name = "1.4")]
    #[display(fmt = "1.4")]
    V1_4,
    #[value(name = "1.5")]
    #[display(fmt = "1.5")]
    V1_5,
}

impl SpvVersion {
    pub fn major_minor(self) -> (u8, u8) {
        match self {
            Self::V1_0 => (1, 0),
            Self::V1_1 => (1, 1),
            Self::V1_2 => (1, 2),
            Self::V1_3 => (1, 3),
            Self::V1_4 => (1, 4),
            Self::V1_5 => (1, 5),
        }
    }
    pub fn target_env(self) -> TargetEnv {
        match self {
            Self::V1_0 => TargetEnv::Universal_1_0,
            Self::V1_1 => TargetEnv::Universal_1_1,
            Self::V1_2 => TargetEnv::Universal_1_2,
            Self::V1_3 => TargetEnv::Universal_1_3,
            Self::V1_4 => TargetEnv::Universal_1_4,
            Self::V1_5 => TargetEnv::Universal_1_5,
        }
    }
    /// The `llvm-spirv` flag limiting the module version.
    pub fn max_version_flag(self) -> String {
        format!("--spirv-max-version={self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_extension() {
        assert_eq!(Dialect::from_path(Path::new("a.cl")).unwrap(), Dialect::OpenClC);
        assert_eq!(Dialect::from_path(Path::new("dir/a.ocl")).unwrap(), Dialect::OpenClC);
        assert_eq!(Dialect::from_path(Path::new("a.clpp")).unwrap(), Dialect::OpenClCpp);
        assert_eq!(Dialect::from_path(Path::new("a.clcpp")).unwrap(), Dialect::OpenClCpp);
        assert!(matches!(
            Dialect::from_path(Path::new("a.c")),
            Err(CompileError::InvalidExtension { .. })
        ));
        assert!(Dialect::from_path(Path::new("cl")).is_err());
        assert_eq!(Dialect::OpenClC.host_extension(), "c");
        assert_eq!(Dialect::OpenClCpp.host_extension(), "cpp");
    }

    #[test]
    fn language_standards() {
        let path = Path::new("a.cl");
        assert_eq!(Dialect::OpenClC.cl_std_flag(ClStd::Cl1_2, path).unwrap(), "-cl-std=CL1.2");
        assert_eq!(Dialect::OpenClC.cl_std_flag(ClStd::Cl3_0, path).unwrap(), "-cl-std=CL3.0");
        for std in [ClStd::ClCpp, ClStd::ClCpp2021] {
            assert!(matches!(
                Dialect::OpenClC.cl_std_flag(std, path),
                Err(CompileError::CppStandardForC { .. })
            ));
        }
        let path = Path::new("a.clcpp");
        assert_eq!(
            Dialect::OpenClCpp.cl_std_flag(ClStd::ClCpp2021, path).unwrap(),
            "-cl-std=clc++2021"
        );
        assert_eq!(
            Dialect::OpenClCpp.cl_std_flag(ClStd::Cl1_2, path).unwrap(),
            "-cl-std=clc++1.0"
        );
    }

    #[test]
    fn spirv_versions() {
        assert_eq!(SpvVersion::V1_3.max_version_flag(), "--spirv-max-version=1.3");
        assert_eq!(SpvVersion::V1_5.major_minor(), (1, 5));
        assert!(matches!(SpvVersion::V1_0.target_env(), TargetEnv::Universal_1_0));
        assert!(matches!(SpvVersion::V1_4.target_env(), TargetEnv::Universal_1_4));
    }
}
