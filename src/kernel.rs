/*!
Programs and kernel dispatch.

The SPIR-V module of a source file is embedded in the generated code, and built by the device
compiler the first time one of its kernels is dispatched. [`ProgramCache`] holds the built program
for the lifetime of the [`Context`], along with one kernel object per kernel name.

```
# use oclc::{device::Context, kernel::KernelArg};
# use oclc_core::dim::Dim3;
# fn main() -> oclc::error::Result<()> {
# static SPIRV: &[u8] = &[];
let context = Context::host();
let n = 256u32;
let x = context.allocate(n as usize * 4)?;
# if false {
context.dispatch(
    SPIRV,
    "fill",
    Dim3::new(n / 64, 0, 0),
    Dim3::new(64, 0, 0),
    &[KernelArg::Buffer(x), KernelArg::value(&n)],
)?;
# }
# Ok(())
# }
```
*/

use crate::{
    buffer::DeviceBuffer,
    device::{Context, EngineKernel, EngineProgram},
    error::Result,
};
use oclc_core::dim::{self, Dim3, WorkDims};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// A kernel argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelArg<'a> {
    /// A pointer parameter.
    Buffer(DeviceBuffer),
    /// A scalar parameter, by value.
    Value(&'a [u8]),
}

impl<'a> KernelArg<'a> {
    /// A scalar argument.
    pub fn value<T: bytemuck::Pod>(value: &'a T) -> Self {
        Self::Value(bytemuck::bytes_of(value))
    }
}

/** The build-once cache of a program.

Created by [`Context::program()`]. The program is built on first use, and stays built once a build
succeeds. A failed build leaves the cache empty, so the next use builds again. */
pub struct ProgramCache {
    binary: &'static [u8],
    program: OnceCell<Arc<dyn EngineProgram>>,
    kernels: Mutex<HashMap<String, Box<dyn EngineKernel>>>,
    build_attempts: AtomicUsize,
}

impl ProgramCache {
    pub(crate) fn new(binary: &'static [u8]) -> Self {
        Self {
            binary,
            program: OnceCell::new(),
            kernels: Mutex::default(),
            build_attempts: AtomicUsize::default(),
        }
    }
    /// The embedded binary.
    pub fn binary(&self) -> &'static [u8] {
        self.binary
    }
    pub fn is_built(&self) -> bool {
        self.program.get().is_some()
    }
    /// The number of builds attempted, including failures.
    pub fn build_attempts(&self) -> usize {
        self.build_attempts.load(Ordering::SeqCst)
    }
    fn get_or_build(&self, context: &Context) -> Result<&Arc<dyn EngineProgram>> {
        self.program.get_or_try_init(|| {
            self.build_attempts.fetch_add(1, Ordering::SeqCst);
            context.record(|metrics| metrics.build_attempts += 1);
            tracing::debug!(
                "building program of {} bytes on {}",
                self.binary.len(),
                context.info()
            );
            context.engine().build_program(self.binary)
        })
    }
    fn dispatch(
        &self,
        context: &Context,
        name: &str,
        work_dims: &WorkDims,
        args: &[KernelArg],
    ) -> Result<()> {
        let program = self.get_or_build(context)?;
        let mut kernels = self.kernels.lock();
        let kernel = match kernels.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(program.create_kernel(name)?),
        };
        for (index, arg) in (0..).zip(args) {
            kernel.set_arg(index, arg)?;
        }
        kernel.enqueue(work_dims)
    }
}

impl Debug for ProgramCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramCache")
            .field("binary", &format_args!("{:p}[{}]", self.binary, self.binary.len()))
            .field("built", &self.is_built())
            .field("build_attempts", &self.build_attempts())
            .finish()
    }
}

impl Context {
    /** Builds the program of `binary` unless it is already built.

    **errors**
    - [`BuildFailed`](crate::error::RuntimeError::BuildFailed) with the build log. */
    pub fn build_program(&self, binary: &'static [u8]) -> Result<Arc<ProgramCache>> {
        let program = self.program(binary);
        let result = program.get_or_build(self).map(|_| ());
        self.check(result)?;
        Ok(program)
    }
    /** Dispatches the kernel `name` of `binary`.

    The launch is validated before anything is submitted to the device. The program is built if
    necessary, then `args` are bound in order, pointer parameters as [`KernelArg::Buffer`] and
    scalars as [`KernelArg::Value`], and the kernel is enqueued.

    **errors**
    - [`WorkDims`](crate::error::RuntimeError::WorkDims) if `grid` and `block` are invalid, see
    [`validate`](oclc_core::dim::validate).
    - [`BuildFailed`](crate::error::RuntimeError::BuildFailed)
    - The kernel was not found, or an argument could not be bound. */
    pub fn dispatch(
        &self,
        binary: &'static [u8],
        name: &str,
        grid: Dim3,
        block: Dim3,
        args: &[KernelArg],
    ) -> Result<()> {
        let result = dim::validate(grid, block)
            .map_err(Into::into)
            .and_then(|work_dims| {
                self.program(binary).dispatch(self, name, &work_dims, args)
            });
        if result.is_ok() {
            tracing::trace!("dispatched {name} grid = {grid} block = {block}");
            self.record(|metrics| metrics.dispatches += 1);
        }
        self.check(result)
    }
}
