use super::{DeviceEngine, DeviceInfo, EngineKernel, EngineProgram};
use crate::{
    buffer::DeviceBuffer,
    error::{codes::*, Result, RuntimeError},
    kernel::KernelArg,
};
use oclc_core::dim::WorkDims;
use parking_lot::Mutex;
use rspirv::{
    dr::{Module, Operand},
    spirv::ExecutionModel,
};
use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroU64,
    sync::Arc,
};

/// Emulates a device in host memory.
pub(super) struct HostEngine {
    info: DeviceInfo,
    state: Arc<Mutex<HostState>>,
}

impl HostEngine {
    pub(super) fn new() -> Self {
        Self {
            info: DeviceInfo {
                index: 0,
                name: "host".to_string(),
                version: None,
            },
            state: Arc::default(),
        }
    }
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    queue: VecDeque<Command>,
}

#[derive(Clone, Copy)]
struct HostPtr(*mut u8);

// Host pointers are only dereferenced by `flush`, callers of upload / download guarantee that the
// memory is valid until then.
unsafe impl Send for HostPtr {}

enum Command {
    Upload {
        dst: u64,
        src: HostPtr,
        size: usize,
    },
    Download {
        src: u64,
        dst: HostPtr,
        size: usize,
    },
    Dispatch {
        kernel: String,
        work_dims: WorkDims,
    },
}

impl HostState {
    fn buffer(&self, buffer: DeviceBuffer) -> Result<&Vec<u8>> {
        self.buffers
            .get(&buffer.id())
            .ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT))
    }
    /// Executes queued commands in order.
    fn flush(&mut self) -> Result<()> {
        while let Some(command) = self.queue.pop_front() {
            match command {
                Command::Upload { dst, src, size } => {
                    let dst = self
                        .buffers
                        .get_mut(&dst)
                        .ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT))?;
                    // Safety: `src` is valid for reads of `size` bytes and `size` was checked
                    // against the buffer when the command was queued.
                    unsafe {
                        std::ptr::copy_nonoverlapping(src.0.cast_const(), dst.as_mut_ptr(), size);
                    }
                }
                Command::Download { src, dst, size } => {
                    let src = self
                        .buffers
                        .get(&src)
                        .ok_or(RuntimeError::native(CL_INVALID_MEM_OBJECT))?;
                    // Safety: `dst` is valid for writes of `size` bytes.
                    unsafe {
                        std::ptr::copy_nonoverlapping(src.as_ptr(), dst.0, size);
                    }
                }
                Command::Dispatch { kernel, work_dims } => {
                    tracing::trace!(
                        "host: {kernel} work_dim = {} global = {:?} local = {:?}",
                        work_dims.work_dim(),
                        work_dims.global(),
                        work_dims.local(),
                    );
                }
            }
        }
        Ok(())
    }
}

impl DeviceEngine for HostEngine {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }
    fn allocate(&self, size: usize) -> Result<DeviceBuffer> {
        let mut state = self.state.lock();
        let id = state
            .next_id
            .checked_add(1)
            .and_then(NonZeroU64::new)
            .ok_or(RuntimeError::native(CL_OUT_OF_RESOURCES))?;
        state.next_id = id.get();
        state.buffers.insert(id.get(), vec![0; size]);
        Ok(DeviceBuffer::from_id(id))
    }
    fn release(&self, buffer: DeviceBuffer) -> Result<()> {
        let mut state = self.state.lock();
        state.buffer(buffer)?;
        // Commands queued before the release still see the buffer.
        state.flush()?;
        state.buffers.remove(&buffer.id());
        Ok(())
    }
    fn buffer_size(&self, buffer: DeviceBuffer) -> Result<usize> {
        Ok(self.state.lock().buffer(buffer)?.len())
    }
    unsafe fn upload(&self, dst: DeviceBuffer, src: *const u8, size: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.buffer(dst)?;
        state.queue.push_back(Command::Upload {
            dst: dst.id(),
            src: HostPtr(src.cast_mut()),
            size,
        });
        Ok(())
    }
    unsafe fn download(&self, src: DeviceBuffer, dst: *mut u8, size: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.buffer(src)?;
        state.queue.push_back(Command::Download {
            src: src.id(),
            dst: HostPtr(dst),
            size,
        });
        Ok(())
    }
    fn synchronize(&self) -> Result<()> {
        self.state.lock().flush()
    }
    fn build_program(&self, binary: &[u8]) -> Result<Arc<dyn EngineProgram>> {
        let module = rspirv::dr::load_bytes(binary).map_err(|e| RuntimeError::BuildFailed {
            log: format!("invalid SPIR-V module: {e}"),
        })?;
        Ok(Arc::new(HostProgram {
            entry_points: entry_points(&module),
            state: self.state.clone(),
        }))
    }
}

/// The names of the kernels of a module.
fn entry_points(module: &Module) -> Vec<String> {
    module
        .entry_points
        .iter()
        .filter_map(|inst| match inst.operands.as_slice() {
            [
                Operand::ExecutionModel(ExecutionModel::Kernel),
                Operand::IdRef(_),
                Operand::LiteralString(name),
                ..,
            ] => Some(name.clone()),
            _ => None,
        })
        .collect()
}

struct HostProgram {
    entry_points: Vec<String>,
    state: Arc<Mutex<HostState>>,
}

impl EngineProgram for HostProgram {
    fn create_kernel(&self, name: &str) -> Result<Box<dyn EngineKernel>> {
        if !self.entry_points.iter().any(|x| x == name) {
            return Err(RuntimeError::native(CL_INVALID_KERNEL_NAME));
        }
        Ok(Box::new(HostKernel {
            name: name.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct HostKernel {
    name: String,
    state: Arc<Mutex<HostState>>,
}

impl EngineKernel for HostKernel {
    fn set_arg(&mut self, _index: u32, arg: &KernelArg) -> Result<()> {
        match arg {
            KernelArg::Buffer(buffer) => self.state.lock().buffer(*buffer).map(|_| ()),
            KernelArg::Value(value) if value.is_empty() => {
                Err(RuntimeError::native(CL_INVALID_ARG_SIZE))
            }
            KernelArg::Value(_) => Ok(()),
        }
    }
    fn enqueue(&mut self, work_dims: &WorkDims) -> Result<()> {
        self.state.lock().queue.push_back(Command::Dispatch {
            kernel: self.name.clone(),
            work_dims: *work_dims,
        });
        Ok(())
    }
}
