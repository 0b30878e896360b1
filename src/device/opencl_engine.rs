use super::{DeviceEngine, DeviceInfo, EngineKernel, EngineProgram};
use crate::{
    buffer::DeviceBuffer,
    error::{codes::*, Result, RuntimeError},
    kernel::KernelArg,
};
use oclc_core::{dim::WorkDims, version::Version};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU},
    kernel::Kernel,
    memory::{Buffer, ClMem, CL_MEM_READ_WRITE},
    platform::get_platforms,
    program::Program,
    types::{cl_device_id, CL_NON_BLOCKING},
};
use parking_lot::Mutex;
use std::{collections::HashMap, ffi::c_void, num::NonZeroU64, ptr, sync::Arc};

pub(super) struct OpenClEngine {
    info: DeviceInfo,
    shared: Arc<Shared>,
}

struct Shared {
    device: Device,
    context: Context,
    queue: CommandQueue,
    buffers: Mutex<Buffers>,
}

#[derive(Default)]
struct Buffers {
    next_id: u64,
    buffers: HashMap<u64, Buffer<u8>>,
}

// OpenCL objects may be used from any thread, except for setting kernel arguments which is done
// under the lock of the program cache.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

fn devices() -> Result<Vec<cl_device_id>> {
    let mut devices = Vec::new();
    for platform in get_platforms()? {
        match platform.get_devices(CL_DEVICE_TYPE_ALL) {
            Ok(ids) => devices.extend(ids),
            Err(e) if e.0 == CL_DEVICE_NOT_FOUND => (),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(devices)
}

fn is_gpu(device: &Device) -> bool {
    device
        .dev_type()
        .map_or(false, |ty| ty & CL_DEVICE_TYPE_GPU != 0)
}

fn opencl_version(device: &Device) -> Option<Version> {
    Version::from_opencl_version(&device.version().ok()?)
}

/// The first GPU with OpenCL 3, then the first GPU, then the first device.
fn select(devices: &[Device]) -> Option<usize> {
    let opencl3 = |device: &Device| opencl_version(device).map_or(false, |x| x.major == 3);
    devices
        .iter()
        .position(|x| is_gpu(x) && opencl3(x))
        .or_else(|| devices.iter().position(is_gpu))
        .or_else(|| (!devices.is_empty()).then_some(0))
}

impl OpenClEngine {
    pub(super) fn new(index: Option<usize>) -> Result<Self> {
        let devices: Vec<Device> = devices()?.into_iter().map(Device::new).collect();
        let index = match index {
            Some(index) if index < devices.len() => index,
            Some(index) => {
                return Err(RuntimeError::DeviceIndexOutOfRange {
                    index,
                    devices: devices.len(),
                })
            }
            None => select(&devices).ok_or(RuntimeError::DeviceUnavailable)?,
        };
        let device = Device::new(devices[index].id());
        let version = opencl_version(&device);
        if version.map_or(true, |x| x.major != 3) {
            tracing::warn!(
                "device {index} reports {:?}, kernels require OpenCL 3",
                device.version().unwrap_or_default()
            );
        }
        let info = DeviceInfo {
            index,
            name: device.name()?,
            version,
        };
        let context = Context::from_device(&device)?;
        let queue = CommandQueue::create_default_with_properties(&context, 0, 0)?;
        Ok(Self {
            info,
            shared: Arc::new(Shared {
                device,
                context,
                queue,
                buffers: Mutex::default(),
            }),
        })
    }
}

impl Drop for OpenClEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shared.queue.finish() {
            tracing::warn!("{}", RuntimeError::from(e));
        }
    }
}

impl Shared {
    fn with_buffer<T>(
        &self,
        buffer: DeviceBuffer,
        f: impl FnOnce(&mut Buffer<u8>) -> T,
    ) -> Result<T> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .buffers
            .get_mut(&buffer.id())
            .ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT))?;
        Ok(f(buffer))
    }
}

impl DeviceEngine for OpenClEngine {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }
    fn allocate(&self, size: usize) -> Result<DeviceBuffer> {
        let buffer = unsafe {
            Buffer::<u8>::create(
                &self.shared.context,
                CL_MEM_READ_WRITE,
                size,
                ptr::null_mut(),
            )?
        };
        let mut buffers = self.shared.buffers.lock();
        let id = buffers
            .next_id
            .checked_add(1)
            .and_then(NonZeroU64::new)
            .ok_or(RuntimeError::native(CL_OUT_OF_RESOURCES))?;
        buffers.next_id = id.get();
        buffers.buffers.insert(id.get(), buffer);
        Ok(DeviceBuffer::from_id(id))
    }
    fn release(&self, buffer: DeviceBuffer) -> Result<()> {
        // Released by drop, OpenCL keeps the memory alive until queued commands complete.
        self.shared
            .buffers
            .lock()
            .buffers
            .remove(&buffer.id())
            .map(|_| ())
            .ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT))
    }
    fn buffer_size(&self, buffer: DeviceBuffer) -> Result<usize> {
        self.shared
            .with_buffer(buffer, |buffer| buffer.size())?
            .map_err(Into::into)
    }
    unsafe fn upload(&self, dst: DeviceBuffer, src: *const u8, size: usize) -> Result<()> {
        // Safety: `src` is valid until the queue is synchronized.
        let data = unsafe { std::slice::from_raw_parts(src, size) };
        self.shared.with_buffer(dst, |dst| {
            unsafe {
                self.shared
                    .queue
                    .enqueue_write_buffer(dst, CL_NON_BLOCKING, 0, data, &[])
            }
            .map(|_event| ())
        })??;
        Ok(())
    }
    unsafe fn download(&self, src: DeviceBuffer, dst: *mut u8, size: usize) -> Result<()> {
        // Safety: `dst` is valid until the queue is synchronized.
        let data = unsafe { std::slice::from_raw_parts_mut(dst, size) };
        self.shared.with_buffer(src, |src| {
            unsafe {
                self.shared
                    .queue
                    .enqueue_read_buffer(src, CL_NON_BLOCKING, 0, data, &[])
            }
            .map(|_event| ())
        })??;
        Ok(())
    }
    fn synchronize(&self) -> Result<()> {
        Ok(self.shared.queue.finish()?)
    }
    fn build_program(&self, binary: &[u8]) -> Result<Arc<dyn EngineProgram>> {
        let mut program = Program::create_from_il(&self.shared.context, binary)?;
        if let Err(e) = program.build(self.shared.context.devices(), "") {
            let log = program
                .get_build_log(self.shared.device.id())
                .unwrap_or_else(|_| RuntimeError::from(e).to_string());
            return Err(RuntimeError::BuildFailed { log });
        }
        Ok(Arc::new(OpenClProgram {
            program,
            shared: self.shared.clone(),
        }))
    }
}

struct OpenClProgram {
    program: Program,
    shared: Arc<Shared>,
}

unsafe impl Send for OpenClProgram {}
unsafe impl Sync for OpenClProgram {}

impl EngineProgram for OpenClProgram {
    fn create_kernel(&self, name: &str) -> Result<Box<dyn EngineKernel>> {
        let kernel = Kernel::create(&self.program, name)?;
        Ok(Box::new(OpenClKernel {
            kernel,
            shared: self.shared.clone(),
        }))
    }
}

struct OpenClKernel {
    kernel: Kernel,
    shared: Arc<Shared>,
}

unsafe impl Send for OpenClKernel {}

impl EngineKernel for OpenClKernel {
    fn set_arg(&mut self, index: u32, arg: &KernelArg) -> Result<()> {
        match arg {
            KernelArg::Buffer(buffer) => {
                let mem = self.shared.with_buffer(*buffer, |buffer| buffer.get())?;
                unsafe { self.kernel.set_arg(index, &mem)? };
            }
            KernelArg::Value(value) => unsafe {
                cl3::kernel::set_kernel_arg(
                    self.kernel.get(),
                    index,
                    value.len(),
                    value.as_ptr() as *const c_void,
                )
                .map_err(RuntimeError::native)?;
            },
        }
        Ok(())
    }
    fn enqueue(&mut self, work_dims: &WorkDims) -> Result<()> {
        unsafe {
            self.shared.queue.enqueue_nd_range_kernel(
                self.kernel.get(),
                work_dims.work_dim(),
                ptr::null(),
                work_dims.global().as_ptr(),
                work_dims.local().as_ptr(),
                &[],
            )?;
        }
        Ok(())
    }
}
