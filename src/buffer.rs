/*!
Device memory and transfers.

A [`DeviceBuffer`] is a handle to memory allocated by a [`Context`]. Buffers are not freed
automatically, the caller releases them with [`Context::release()`].

Copies are enqueued without blocking. The host memory of a copy must stay valid, and for a
download must not be read, until [`Context::synchronize()`] returns.

```
# use oclc::device::Context;
# fn main() -> oclc::error::Result<()> {
let context = Context::host();
let x = [1u32, 2, 3, 4];
let mut y = [0u32; 4];
let buffer = context.allocate(16)?;
unsafe {
    context.copy_host_to_device(buffer, x.as_ptr().cast(), 16)?;
    context.copy_device_to_host(y.as_mut_ptr().cast(), buffer, 16)?;
}
context.synchronize()?;
assert_eq!(x, y);
context.release(buffer)?;
# Ok(())
# }
```
*/

use crate::{
    device::{Context, DeviceEngine},
    error::{Result, RuntimeError},
};
use std::{ffi::c_void, num::NonZeroU64};

/// A handle to device memory.
///
/// Handles are unique within a context and are never 0, so a null `oclc_mem` can signal failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DeviceBuffer(NonZeroU64);

impl DeviceBuffer {
    pub(crate) fn from_id(id: NonZeroU64) -> Self {
        Self(id)
    }
    pub(crate) fn id(&self) -> u64 {
        self.0.get()
    }
    /// Converts a C `oclc_mem`, None if null.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonZeroU64::new(ptr as usize as u64).map(Self)
    }
    /// Converts to a C `oclc_mem`.
    pub fn as_raw(&self) -> *mut c_void {
        self.0.get() as usize as *mut c_void
    }
}

/// The direction of a copy, see [`Context::copy()`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyKind {
    HostToDevice = 0,
    DeviceToHost = 1,
}

impl Context {
    /// Allocates `size` bytes of device memory.
    ///
    /// **errors**
    /// - [`ZeroSizedAllocation`](RuntimeError::ZeroSizedAllocation) if `size` is 0.
    /// - The device could not allocate the memory.
    pub fn allocate(&self, size: usize) -> Result<DeviceBuffer> {
        let result = if size == 0 {
            Err(RuntimeError::ZeroSizedAllocation)
        } else {
            self.engine().allocate(size)
        };
        if let Ok(buffer) = &result {
            tracing::trace!("allocated {size} bytes as {buffer:?}");
            self.record(|metrics| metrics.allocations += 1);
        }
        self.check(result)
    }
    /// Releases `buffer`.
    ///
    /// The buffer may not be used afterwards, releasing it twice is an error when the runtime can
    /// detect it.
    pub fn release(&self, buffer: DeviceBuffer) -> Result<()> {
        let result = self.engine().release(buffer);
        if result.is_ok() {
            self.record(|metrics| metrics.releases += 1);
        }
        self.check(result)
    }
    /** Enqueues a copy of `size` bytes from `src` to `dst`.

    A copy of 0 bytes does nothing.

    **errors**
    - [`NullPointer`](RuntimeError::NullPointer) if `src` is null.
    - [`CopyOutOfBounds`](RuntimeError::CopyOutOfBounds) if `size` exceeds the buffer.

    # Safety
    `src` must be valid for reads of `size` bytes until [`.synchronize()`](Context::synchronize)
    returns. */
    pub unsafe fn copy_host_to_device(
        &self,
        dst: DeviceBuffer,
        src: *const u8,
        size: usize,
    ) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let result = if src.is_null() {
            Err(RuntimeError::NullPointer)
        } else {
            check_bounds(self.engine(), dst, size)
                .and_then(|_| unsafe { self.engine().upload(dst, src, size) })
        };
        if result.is_ok() {
            self.record(|metrics| {
                metrics.uploads += 1;
                metrics.upload_bytes += size;
            });
        }
        self.check(result)
    }
    /** Enqueues a copy of `size` bytes from `src` to `dst`.

    A copy of 0 bytes does nothing.

    **errors**
    - [`NullPointer`](RuntimeError::NullPointer) if `dst` is null.
    - [`CopyOutOfBounds`](RuntimeError::CopyOutOfBounds) if `size` exceeds the buffer.

    # Safety
    `dst` must be valid for writes of `size` bytes until [`.synchronize()`](Context::synchronize)
    returns. */
    pub unsafe fn copy_device_to_host(
        &self,
        dst: *mut u8,
        src: DeviceBuffer,
        size: usize,
    ) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let result = if dst.is_null() {
            Err(RuntimeError::NullPointer)
        } else {
            check_bounds(self.engine(), src, size)
                .and_then(|_| unsafe { self.engine().download(src, dst, size) })
        };
        if result.is_ok() {
            self.record(|metrics| {
                metrics.downloads += 1;
                metrics.download_bytes += size;
            });
        }
        self.check(result)
    }
    /** Enqueues a copy in the direction given by `kind`.

    `dst` and `src` are a host pointer and a buffer handle, as converted by
    [`DeviceBuffer::as_raw()`]. A copy of 0 bytes does nothing, even if either is null.

    # Safety
    See [`.copy_host_to_device()`](Context::copy_host_to_device) and
    [`.copy_device_to_host()`](Context::copy_device_to_host). */
    pub unsafe fn copy(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        size: usize,
        kind: CopyKind,
    ) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        match kind {
            CopyKind::HostToDevice => {
                let dst = self.check(
                    DeviceBuffer::from_raw(dst).ok_or(RuntimeError::NullPointer),
                )?;
                unsafe { self.copy_host_to_device(dst, src.cast(), size) }
            }
            CopyKind::DeviceToHost => {
                let src = self.check(
                    DeviceBuffer::from_raw(src.cast_mut()).ok_or(RuntimeError::NullPointer),
                )?;
                unsafe { self.copy_device_to_host(dst.cast(), src, size) }
            }
        }
    }
}

fn check_bounds(engine: &dyn DeviceEngine, buffer: DeviceBuffer, size: usize) -> Result<()> {
    let len = engine.buffer_size(buffer)?;
    if size > len {
        return Err(RuntimeError::CopyOutOfBounds { size, len });
    }
    Ok(())
}
