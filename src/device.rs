/*!
An execution [`Context`] owns a device, its command queue and the programs built for it.

Every runtime call takes the context explicitly. [`Context::host()`] creates a context backed by
host memory, which queues transfers and records dispatches without executing kernels. With the
"device" feature, [`Context::builder()`] selects an OpenCL device.

```
# use oclc::device::{Context, FailurePolicy};
# fn main() -> oclc::error::Result<()> {
let context = Context::builder()
    .host()
    .failure_policy(FailurePolicy::Silent)
    .build()?;
let buffer = context.allocate(256)?;
context.release(buffer)?;
# Ok(())
# }
```

# Queue
Transfers and dispatches are enqueued in order on one queue and are only guaranteed to have
completed after [`Context::synchronize()`].

# Threads
A context is `Send + Sync`, and a program is built at most once even when dispatches race. The
supported model is still one thread driving one context.
*/

use crate::{
    buffer::DeviceBuffer,
    error::{error_string, Result, RuntimeError},
    kernel::{KernelArg, ProgramCache},
};
use oclc_core::{dim::WorkDims, version::Version};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    env,
    fmt::{self, Debug},
    str::FromStr,
    sync::Arc,
};

pub(crate) mod host_engine;
use host_engine::HostEngine;
#[cfg(feature = "device")]
mod opencl_engine;

/// Errors.
pub mod error {
    /// The value of a failure policy could not be parsed.
    #[derive(Clone, Debug, thiserror::Error)]
    #[error("expected \"crash\" or \"silent\", found {input:?}")]
    pub struct FailurePolicyFromStrError {
        pub(super) input: String,
    }
}
use error::FailurePolicyFromStrError;

/// Builders.
pub mod builder {
    use super::*;

    /// Builder for creating a [`Context`].
    #[derive(Clone, Debug)]
    pub struct ContextBuilder {
        pub(crate) index: Option<usize>,
        pub(crate) host: bool,
        pub(crate) failure_policy: FailurePolicy,
    }

    impl ContextBuilder {
        /// Index of the device among all OpenCL devices.
        ///
        /// Defaults to the first GPU supporting OpenCL 3.
        pub fn index(mut self, index: usize) -> Self {
            self.index = Some(index);
            self
        }
        /// Use the host instead of a device.
        pub fn host(mut self) -> Self {
            self.host = true;
            self
        }
        /// Defaults to [`FailurePolicy::Silent`].
        pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
            self.failure_policy = failure_policy;
            self
        }
        /// Applies the environment.
        ///
        /// - `OCLC_DEVICE`: "host" or a device index.
        /// - `OCLC_FAILURE_POLICY`: see [`FailurePolicy::from_env()`].
        pub fn from_env(mut self) -> Self {
            if let Ok(device) = env::var(DEVICE_ENV) {
                let device = device.trim();
                if device.eq_ignore_ascii_case("host") {
                    self = self.host();
                } else if let Ok(index) = device.parse() {
                    self = self.index(index);
                } else {
                    tracing::warn!("ignoring {DEVICE_ENV}={device:?}, expected \"host\" or an index");
                }
            }
            self.failure_policy(FailurePolicy::from_env())
        }
        /// Creates a context.
        ///
        /// **errors**
        ///
        /// - [`DeviceUnavailable`](RuntimeError::DeviceUnavailable) if the "device" feature is not
        /// enabled or no device was found.
        /// - [`DeviceIndexOutOfRange`](RuntimeError::DeviceIndexOutOfRange)
        /// - The context or queue could not be created.
        pub fn build(self) -> Result<Context> {
            let engine: Box<dyn DeviceEngine> = if self.host {
                Box::new(HostEngine::new())
            } else {
                device_engine(self.index)?
            };
            tracing::debug!("created context on {}", engine.info());
            Ok(Context {
                inner: Arc::new(ContextInner {
                    engine,
                    failure_policy: self.failure_policy,
                    metrics: Mutex::default(),
                    programs: Mutex::default(),
                }),
            })
        }
    }
}
use builder::ContextBuilder;

const DEVICE_ENV: &str = "OCLC_DEVICE";

#[cfg(feature = "device")]
fn device_engine(index: Option<usize>) -> Result<Box<dyn DeviceEngine>> {
    Ok(Box::new(opencl_engine::OpenClEngine::new(index)?))
}

#[cfg(not(feature = "device"))]
fn device_engine(_index: Option<usize>) -> Result<Box<dyn DeviceEngine>> {
    Err(RuntimeError::DeviceUnavailable)
}

/// The device side of a context.
pub(crate) trait DeviceEngine: Send + Sync {
    fn info(&self) -> &DeviceInfo;
    fn allocate(&self, size: usize) -> Result<DeviceBuffer>;
    fn release(&self, buffer: DeviceBuffer) -> Result<()>;
    /// The size of `buffer` in bytes.
    fn buffer_size(&self, buffer: DeviceBuffer) -> Result<usize>;
    /// # Safety
    /// `src` must be valid for reads of `size` bytes until the queue is synchronized.
    unsafe fn upload(&self, dst: DeviceBuffer, src: *const u8, size: usize) -> Result<()>;
    /// # Safety
    /// `dst` must be valid for writes of `size` bytes until the queue is synchronized.
    unsafe fn download(&self, src: DeviceBuffer, dst: *mut u8, size: usize) -> Result<()>;
    fn synchronize(&self) -> Result<()>;
    fn build_program(&self, binary: &[u8]) -> Result<Arc<dyn EngineProgram>>;
}

pub(crate) trait EngineProgram: Send + Sync {
    fn create_kernel(&self, name: &str) -> Result<Box<dyn EngineKernel>>;
}

pub(crate) trait EngineKernel: Send {
    fn set_arg(&mut self, index: u32, arg: &KernelArg) -> Result<()>;
    fn enqueue(&mut self, work_dims: &WorkDims) -> Result<()>;
}

/** What to do when a runtime call fails.

The failure is logged either way. */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FailurePolicy {
    /// Exit the process with status 1.
    #[display(fmt = "crash")]
    Crash,
    /// Return the error.
    #[display(fmt = "silent")]
    Silent,
}

impl FailurePolicy {
    /// The environment variable read by [`.from_env()`](Self::from_env).
    pub const ENV: &'static str = "OCLC_FAILURE_POLICY";
    /// Reads `OCLC_FAILURE_POLICY`, "crash" or "silent".
    ///
    /// Defaults to [`Crash`](Self::Crash) when unset or invalid.
    pub fn from_env() -> Self {
        match env::var(Self::ENV) {
            Ok(input) => input.parse().unwrap_or_else(|e| {
                tracing::warn!("{}: {e}, defaulting to crash", Self::ENV);
                Self::Crash
            }),
            Err(_) => Self::Crash,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = FailurePolicyFromStrError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "crash" => Ok(Self::Crash),
            "silent" => Ok(Self::Silent),
            _ => Err(FailurePolicyFromStrError {
                input: input.to_string(),
            }),
        }
    }
}

/// Counters of work submitted to a context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub allocations: usize,
    pub releases: usize,
    /// Host to device copies enqueued.
    pub uploads: usize,
    pub upload_bytes: usize,
    /// Device to host copies enqueued.
    pub downloads: usize,
    pub download_bytes: usize,
    pub synchronizations: usize,
    /// Program builds submitted to the device compiler, including failures.
    pub build_attempts: usize,
    pub dispatches: usize,
}

/// Device info.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) version: Option<Version>,
}

impl DeviceInfo {
    /// The index among all devices.
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The OpenCL version, None for the host.
    pub fn version(&self) -> Option<Version> {
        self.version
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.index)?;
        if let Some(version) = self.version {
            write!(f, " OpenCL {}.{}", version.major, version.minor)?;
        }
        Ok(())
    }
}

/** An execution context.

Contexts can be cloned, which is equivalent to [`Arc::clone()`]. Native resources are released when
the last clone is dropped. */
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    engine: Box<dyn DeviceEngine>,
    failure_policy: FailurePolicy,
    metrics: Mutex<Metrics>,
    programs: Mutex<HashMap<(usize, usize), Arc<ProgramCache>>>,
}

impl Context {
    /// A host context with the [`Silent`](FailurePolicy::Silent) policy.
    pub fn host() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                engine: Box::new(HostEngine::new()),
                failure_policy: FailurePolicy::Silent,
                metrics: Mutex::default(),
                programs: Mutex::default(),
            }),
        }
    }
    /// A builder for creating a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder {
            index: None,
            host: false,
            failure_policy: FailurePolicy::Silent,
        }
    }
    /// Is the host.
    pub fn is_host(&self) -> bool {
        self.info().version.is_none()
    }
    pub fn info(&self) -> &DeviceInfo {
        self.inner.engine.info()
    }
    pub fn failure_policy(&self) -> FailurePolicy {
        self.inner.failure_policy
    }
    /// A snapshot of the metrics.
    pub fn metrics(&self) -> Metrics {
        *self.inner.metrics.lock()
    }
    /// Blocks until all enqueued transfers and dispatches have completed.
    pub fn synchronize(&self) -> Result<()> {
        let result = self.inner.engine.synchronize();
        if result.is_ok() {
            self.record(|metrics| metrics.synchronizations += 1);
        }
        self.check(result)
    }
    /** The program cache for `binary`.

    Caches are keyed by the address and length of `binary`, so each embedded binary has its own
    cache for the lifetime of the context. The program is not built until it is first used. */
    pub fn program(&self, binary: &'static [u8]) -> Arc<ProgramCache> {
        let key = (binary.as_ptr() as usize, binary.len());
        self.inner
            .programs
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(ProgramCache::new(binary)))
            .clone()
    }
    pub(crate) fn engine(&self) -> &dyn DeviceEngine {
        &*self.inner.engine
    }
    pub(crate) fn record(&self, f: impl FnOnce(&mut Metrics)) {
        f(&mut self.inner.metrics.lock());
    }
    /// Reports a failure and applies the failure policy.
    pub(crate) fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            tracing::error!("{error} [{}]", error_string(error.code()));
            if self.inner.failure_policy == FailurePolicy::Crash {
                std::process::exit(1);
            }
        }
        result
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("device", self.info())
            .field("failure_policy", &self.inner.failure_policy)
            .finish()
    }
}
