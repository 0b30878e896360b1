use std::{borrow::Cow, str::FromStr};

pub mod error {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("VersionFromStrError: expected \"major[.minor[.patch]]\", found {:?}!", .input)]
    pub struct VersionFromStrError {
        pub(super) input: Cow<'static, str>,
    }
}
use error::*;

/// A `major.minor.patch` version, as used by OpenCL platforms / devices and SPIR-V modules.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Debug, derive_more::Display)]
#[display(fmt = "{}.{}.{}", major, minor, patch)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn from_major_minor(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: 0,
        }
    }
    /// Parses the version out of an OpenCL version string.
    ///
    /// Devices report `"OpenCL <major>.<minor> <vendor-specific information>"`.
    pub fn from_opencl_version(input: &str) -> Option<Self> {
        let version = input.strip_prefix("OpenCL")?.split_whitespace().next()?;
        Self::from_str(version).ok()
    }
}

impl FromStr for Version {
    type Err = VersionFromStrError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let error = || VersionFromStrError {
            input: input.to_string().into(),
        };
        let mut iter = input.split('.');
        let mut next = |required: bool| match iter.next() {
            Some(x) => u32::from_str(x).map_err(|_| error()),
            None if required => Err(error()),
            None => Ok(0),
        };
        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        if iter.next().is_some() {
            return Err(error());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str() {
        assert_eq!(Version::from_str("3").unwrap(), Version::from_major_minor(3, 0));
        assert_eq!(Version::from_str("1.2").unwrap(), Version::from_major_minor(1, 2));
        assert_eq!(
            Version::from_str("1.2.3").unwrap(),
            Version {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("1.x").is_err());
        assert!(Version::from_str("1.2.3.4").is_err());
    }

    #[test]
    fn opencl_version() {
        assert_eq!(
            Version::from_opencl_version("OpenCL 3.0 CUDA 12.2.148"),
            Some(Version::from_major_minor(3, 0))
        );
        assert_eq!(
            Version::from_opencl_version("OpenCL 1.2 "),
            Some(Version::from_major_minor(1, 2))
        );
        assert_eq!(Version::from_opencl_version("CUDA 3.0"), None);
    }
}
