/*!
The C ABI called by generated code, declared in `include/oclc_rt.h`.

Functions returning `int` return 0 on success and an error code otherwise, see
[`oclcErrorString`]. Failures are logged and handled by the failure policy of the context, so under
the default crash policy a failing call does not return.
*/

#![allow(non_snake_case)]

use crate::{
    buffer::{CopyKind, DeviceBuffer},
    device::{builder::ContextBuilder, Context, FailurePolicy},
    error::{codes::*, error_string, error_strings, Result, RuntimeError},
    kernel::KernelArg,
};
use oclc_core::dim::{self, Dim3};
use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    ffi::{c_char, c_int, c_uint, c_void, CStr, CString},
    ptr,
};
use tracing_subscriber::EnvFilter;

/// `oclc_arg`, a kernel argument.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct OclcArg {
    kind: c_int,
    size: usize,
    value: *const c_void,
}

const ARG_BUFFER: c_int = 0;
const ARG_VALUE: c_int = 1;

impl OclcArg {
    /// # Safety
    /// A value argument must point to `size` readable bytes.
    unsafe fn to_kernel_arg<'a>(self) -> Result<KernelArg<'a>> {
        match self.kind {
            ARG_BUFFER => DeviceBuffer::from_raw(self.value.cast_mut())
                .map(KernelArg::Buffer)
                .ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT)),
            ARG_VALUE if self.value.is_null() || self.size == 0 => {
                Err(RuntimeError::native(CL_INVALID_ARG_VALUE))
            }
            ARG_VALUE => Ok(KernelArg::Value(unsafe {
                std::slice::from_raw_parts(self.value.cast(), self.size)
            })),
            _ => Err(RuntimeError::native(CL_INVALID_ARG_VALUE)),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // The host program may have installed a subscriber already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => CL_SUCCESS,
        Err(e) => e.code(),
    }
}

/// Reports a failure that has no context to take the policy from.
fn fail(error: RuntimeError, failure_policy: FailurePolicy) -> c_int {
    tracing::error!("{error} [{}]", error_string(error.code()));
    if failure_policy == FailurePolicy::Crash {
        std::process::exit(1);
    }
    error.code()
}

/// # Safety
/// `ctx` must be null or returned by [`oclcInit`] and not yet released.
unsafe fn context<'a>(ctx: *const Context) -> Result<&'a Context, c_int> {
    unsafe { ctx.as_ref() }
        .ok_or_else(|| fail(RuntimeError::NullContext, FailurePolicy::from_env()))
}

unsafe fn init(out: *mut *mut Context, builder: ContextBuilder) -> c_int {
    init_logging();
    let failure_policy = builder.failure_policy;
    if out.is_null() {
        return fail(RuntimeError::NullPointer, failure_policy);
    }
    match builder.build() {
        Ok(context) => {
            unsafe {
                out.write(Box::into_raw(Box::new(context)));
            }
            CL_SUCCESS
        }
        Err(e) => fail(e, failure_policy),
    }
}

/** Creates a context.

The device and failure policy are read from `OCLC_DEVICE` and `OCLC_FAILURE_POLICY`, see
[`ContextBuilder::from_env()`].

# Safety
`out` must be valid for writes. */
#[no_mangle]
pub unsafe extern "C" fn oclcInit(out: *mut *mut Context) -> c_int {
    unsafe { init(out, Context::builder().from_env()) }
}

/** Creates a context with a failure policy, 0 for crash and 1 for silent.

# Safety
`out` must be valid for writes. */
#[no_mangle]
pub unsafe extern "C" fn oclcInitWithPolicy(out: *mut *mut Context, policy: c_int) -> c_int {
    let failure_policy = match policy {
        0 => FailurePolicy::Crash,
        1 => FailurePolicy::Silent,
        _ => {
            init_logging();
            return fail(RuntimeError::native(CL_INVALID_VALUE), FailurePolicy::from_env());
        }
    };
    unsafe {
        init(
            out,
            Context::builder()
                .from_env()
                .failure_policy(failure_policy),
        )
    }
}

/// Releases a context.
///
/// # Safety
/// `ctx` must be null or returned by [`oclcInit`], and is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn oclcRelease(ctx: *mut Context) -> c_int {
    if ctx.is_null() {
        return fail(RuntimeError::NullContext, FailurePolicy::from_env());
    }
    drop(unsafe { Box::from_raw(ctx) });
    CL_SUCCESS
}

/// Allocates `size` bytes, returns NULL on failure.
///
/// # Safety
/// See [`oclcRelease`].
#[no_mangle]
pub unsafe extern "C" fn oclcMalloc(ctx: *const Context, size: usize) -> *mut c_void {
    let Ok(context) = (unsafe { context(ctx) }) else {
        return ptr::null_mut();
    };
    context
        .allocate(size)
        .map_or(ptr::null_mut(), |buffer| buffer.as_raw())
}

/// Releases memory returned by [`oclcMalloc`].
///
/// # Safety
/// See [`oclcRelease`].
#[no_mangle]
pub unsafe extern "C" fn oclcFree(ctx: *const Context, mem: *mut c_void) -> c_int {
    let context = match unsafe { context(ctx) } {
        Ok(context) => context,
        Err(status) => return status,
    };
    let result = context.check(
        DeviceBuffer::from_raw(mem).ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT)),
    );
    status(result.and_then(|buffer| context.release(buffer)))
}

/// Enqueues a copy of `size` bytes from host memory to `dst`.
///
/// # Safety
/// `src` must be valid for reads of `size` bytes until [`oclcDeviceSynchronize`].
#[no_mangle]
pub unsafe extern "C" fn oclcMemcpyHostToDevice(
    ctx: *const Context,
    dst: *mut c_void,
    src: *const c_void,
    size: usize,
) -> c_int {
    unsafe { oclcMemcpy(ctx, dst, src, size, CopyKind::HostToDevice as c_int) }
}

/// Enqueues a copy of `size` bytes from `src` to host memory.
///
/// # Safety
/// `dst` must be valid for writes of `size` bytes until [`oclcDeviceSynchronize`].
#[no_mangle]
pub unsafe extern "C" fn oclcMemcpyDeviceToHost(
    ctx: *const Context,
    dst: *mut c_void,
    src: *const c_void,
    size: usize,
) -> c_int {
    unsafe { oclcMemcpy(ctx, dst, src, size, CopyKind::DeviceToHost as c_int) }
}

/// Enqueues a copy, `kind` is 0 for host to device and 1 for device to host.
///
/// # Safety
/// See [`oclcMemcpyHostToDevice`] and [`oclcMemcpyDeviceToHost`].
#[no_mangle]
pub unsafe extern "C" fn oclcMemcpy(
    ctx: *const Context,
    dst: *mut c_void,
    src: *const c_void,
    size: usize,
    kind: c_int,
) -> c_int {
    let context = match unsafe { context(ctx) } {
        Ok(context) => context,
        Err(status) => return status,
    };
    let kind = match kind {
        0 => CopyKind::HostToDevice,
        1 => CopyKind::DeviceToHost,
        _ => return status(context.check(Err(RuntimeError::native(CL_INVALID_VALUE)))),
    };
    status(unsafe { context.copy(dst, src, size, kind) })
}

/// Blocks until queued work has completed.
///
/// # Safety
/// See [`oclcRelease`].
#[no_mangle]
pub unsafe extern "C" fn oclcDeviceSynchronize(ctx: *const Context) -> c_int {
    match unsafe { context(ctx) } {
        Ok(context) => status(context.synchronize()),
        Err(status) => status,
    }
}

/// # Safety
/// `bin` must be null or point to `size` bytes that live until the context is released.
unsafe fn binary(context: &Context, bin: *const u8, size: usize) -> Result<&'static [u8]> {
    if bin.is_null() {
        return context.check(Err(RuntimeError::NullPointer));
    }
    Ok(unsafe { std::slice::from_raw_parts(bin, size) })
}

/// Builds the program embedded in `bin` unless it is already built.
///
/// # Safety
/// `bin` must point to `size` bytes that live until the context is released, typically a static
/// array.
#[no_mangle]
pub unsafe extern "C" fn oclcBuildProgram(
    ctx: *const Context,
    bin: *const u8,
    size: usize,
) -> c_int {
    let context = match unsafe { context(ctx) } {
        Ok(context) => context,
        Err(status) => return status,
    };
    let result = unsafe { binary(context, bin, size) }
        .and_then(|binary| context.build_program(binary).map(|_| ()));
    status(result)
}

/** Validates a launch, writing the work dimension and the global and local sizes.

Does not require a context and never crashes.

# Safety
`work_dim` must be valid for writes, `global` and `local` for writes of 3 elements. */
#[no_mangle]
pub unsafe extern "C" fn oclcValidateWorkDims(
    grid: Dim3,
    block: Dim3,
    work_dim: *mut c_uint,
    global: *mut usize,
    local: *mut usize,
) -> c_int {
    if work_dim.is_null() || global.is_null() || local.is_null() {
        return OCLC_NULL_POINTER;
    }
    match dim::validate(grid, block) {
        Ok(work_dims) => {
            unsafe {
                work_dim.write(work_dims.work_dim());
                ptr::copy_nonoverlapping(work_dims.global().as_ptr(), global, 3);
                ptr::copy_nonoverlapping(work_dims.local().as_ptr(), local, 3);
            }
            CL_SUCCESS
        }
        Err(e) => {
            tracing::debug!("{e}");
            RuntimeError::from(e).code()
        }
    }
}

/** Dispatches the kernel `name` of the program embedded in `bin`.

# Safety
- `bin` see [`oclcBuildProgram`].
- `name` must be a nul terminated string.
- `args` must point to `num_args` arguments, or may be null if `num_args` is 0. */
#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub unsafe extern "C" fn oclcDispatch(
    ctx: *const Context,
    bin: *const u8,
    size: usize,
    name: *const c_char,
    grid: Dim3,
    block: Dim3,
    args: *const OclcArg,
    num_args: usize,
) -> c_int {
    let context = match unsafe { context(ctx) } {
        Ok(context) => context,
        Err(status) => return status,
    };
    let binary = match unsafe { binary(context, bin, size) } {
        Ok(binary) => binary,
        Err(e) => return e.code(),
    };
    if name.is_null() || (args.is_null() && num_args > 0) {
        return status(context.check(Err(RuntimeError::NullPointer)));
    }
    let name = match unsafe { CStr::from_ptr(name) }.to_str() {
        Ok(name) => name,
        Err(_) => return status(context.check(Err(RuntimeError::native(CL_INVALID_KERNEL_NAME)))),
    };
    let args: &[OclcArg] = if num_args == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(args, num_args) }
    };
    let args: Result<Vec<KernelArg>> = args
        .iter()
        .map(|arg| unsafe { arg.to_kernel_arg() })
        .collect();
    let args = match context.check(args) {
        Ok(args) => args,
        Err(e) => return e.code(),
    };
    status(context.dispatch(binary, name, grid, block, &args))
}

/// A buffer argument.
#[no_mangle]
pub extern "C" fn oclcArgBuffer(mem: *mut c_void) -> OclcArg {
    OclcArg {
        kind: ARG_BUFFER,
        size: std::mem::size_of::<*mut c_void>(),
        value: mem.cast_const(),
    }
}

/// A scalar argument of `size` bytes at `value`.
#[no_mangle]
pub extern "C" fn oclcArgValue(value: *const c_void, size: usize) -> OclcArg {
    OclcArg {
        kind: ARG_VALUE,
        size,
        value,
    }
}

static ERROR_CSTRINGS: Lazy<HashMap<&'static str, CString>> = Lazy::new(|| {
    error_strings()
        .filter_map(|name| Some((name, CString::new(name).ok()?)))
        .collect()
});

/// The name of an error code, a static string.
#[no_mangle]
pub extern "C" fn oclcErrorString(code: c_int) -> *const c_char {
    ERROR_CSTRINGS
        .get(error_string(code))
        .map_or(ptr::null(), |name| name.as_ptr())
}
