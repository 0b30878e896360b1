/*!
Errors.

Runtime failures carry an OpenCL error code, see [`RuntimeError::code`]. Failures detected by the
runtime itself use codes from -9999 up, outside of the range used by OpenCL. Every code maps to its
name with [`error_string`].
*/

use oclc_core::dim::error::WorkDimError;

/// OpenCL error codes.
pub mod codes {
    pub const CL_SUCCESS: i32 = 0;
    pub const CL_DEVICE_NOT_FOUND: i32 = -1;
    pub const CL_DEVICE_NOT_AVAILABLE: i32 = -2;
    pub const CL_OUT_OF_RESOURCES: i32 = -5;
    pub const CL_BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const CL_INVALID_VALUE: i32 = -30;
    pub const CL_INVALID_CONTEXT: i32 = -34;
    pub const CL_INVALID_MEM_OBJECT: i32 = -38;
    pub const CL_INVALID_BINARY: i32 = -42;
    pub const CL_INVALID_KERNEL_NAME: i32 = -46;
    pub const CL_INVALID_ARG_INDEX: i32 = -49;
    pub const CL_INVALID_ARG_VALUE: i32 = -50;
    pub const CL_INVALID_ARG_SIZE: i32 = -51;
    pub const CL_INVALID_BUFFER_SIZE: i32 = -61;
    /// A null host pointer was supplied.
    pub const OCLC_NULL_POINTER: i32 = -9999;
    /// An allocation of zero bytes was requested.
    pub const OCLC_ZERO_SIZED_ALLOCATION: i32 = -9998;
    /// A grid / block pair failed validation.
    pub const OCLC_INVALID_WORK_DIMS: i32 = -9997;
    /// A null context was supplied.
    pub const OCLC_NULL_CONTEXT: i32 = -9996;
}
use codes::*;

const ERROR_STRINGS: &[(i32, &str)] = &[
    (0, "CL_SUCCESS"),
    (-1, "CL_DEVICE_NOT_FOUND"),
    (-2, "CL_DEVICE_NOT_AVAILABLE"),
    (-3, "CL_COMPILER_NOT_AVAILABLE"),
    (-4, "CL_MEM_OBJECT_ALLOCATION_FAILURE"),
    (-5, "CL_OUT_OF_RESOURCES"),
    (-6, "CL_OUT_OF_HOST_MEMORY"),
    (-7, "CL_PROFILING_INFO_NOT_AVAILABLE"),
    (-8, "CL_MEM_COPY_OVERLAP"),
    (-9, "CL_IMAGE_FORMAT_MISMATCH"),
    (-10, "CL_IMAGE_FORMAT_NOT_SUPPORTED"),
    (-11, "CL_BUILD_PROGRAM_FAILURE"),
    (-12, "CL_MAP_FAILURE"),
    (-13, "CL_MISALIGNED_SUB_BUFFER_OFFSET"),
    (-14, "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST"),
    (-15, "CL_COMPILE_PROGRAM_FAILURE"),
    (-16, "CL_LINKER_NOT_AVAILABLE"),
    (-17, "CL_LINK_PROGRAM_FAILURE"),
    (-18, "CL_DEVICE_PARTITION_FAILED"),
    (-19, "CL_KERNEL_ARG_INFO_NOT_AVAILABLE"),
    (-30, "CL_INVALID_VALUE"),
    (-31, "CL_INVALID_DEVICE_TYPE"),
    (-32, "CL_INVALID_PLATFORM"),
    (-33, "CL_INVALID_DEVICE"),
    (-34, "CL_INVALID_CONTEXT"),
    (-35, "CL_INVALID_QUEUE_PROPERTIES"),
    (-36, "CL_INVALID_COMMAND_QUEUE"),
    (-37, "CL_INVALID_HOST_PTR"),
    (-38, "CL_INVALID_MEM_OBJECT"),
    (-39, "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR"),
    (-40, "CL_INVALID_IMAGE_SIZE"),
    (-41, "CL_INVALID_SAMPLER"),
    (-42, "CL_INVALID_BINARY"),
    (-43, "CL_INVALID_BUILD_OPTIONS"),
    (-44, "CL_INVALID_PROGRAM"),
    (-45, "CL_INVALID_PROGRAM_EXECUTABLE"),
    (-46, "CL_INVALID_KERNEL_NAME"),
    (-47, "CL_INVALID_KERNEL_DEFINITION"),
    (-48, "CL_INVALID_KERNEL"),
    (-49, "CL_INVALID_ARG_INDEX"),
    (-50, "CL_INVALID_ARG_VALUE"),
    (-51, "CL_INVALID_ARG_SIZE"),
    (-52, "CL_INVALID_KERNEL_ARGS"),
    (-53, "CL_INVALID_WORK_DIMENSION"),
    (-54, "CL_INVALID_WORK_GROUP_SIZE"),
    (-55, "CL_INVALID_WORK_ITEM_SIZE"),
    (-56, "CL_INVALID_GLOBAL_OFFSET"),
    (-57, "CL_INVALID_EVENT_WAIT_LIST"),
    (-58, "CL_INVALID_EVENT"),
    (-59, "CL_INVALID_OPERATION"),
    (-60, "CL_INVALID_GL_OBJECT"),
    (-61, "CL_INVALID_BUFFER_SIZE"),
    (-62, "CL_INVALID_MIP_LEVEL"),
    (-63, "CL_INVALID_GLOBAL_WORK_SIZE"),
    (-64, "CL_INVALID_PROPERTY"),
    (-65, "CL_INVALID_IMAGE_DESCRIPTOR"),
    (-66, "CL_INVALID_COMPILER_OPTIONS"),
    (-67, "CL_INVALID_LINKER_OPTIONS"),
    (-68, "CL_INVALID_DEVICE_PARTITION_COUNT"),
    (-69, "CL_INVALID_PIPE_SIZE"),
    (-70, "CL_INVALID_DEVICE_QUEUE"),
    (-71, "CL_INVALID_SPEC_ID"),
    (-72, "CL_MAX_SIZE_RESTRICTION_EXCEEDED"),
    (-1000, "CL_INVALID_GL_SHAREGROUP_REFERENCE_KHR"),
    (-1001, "CL_PLATFORM_NOT_FOUND_KHR"),
    (-1002, "CL_INVALID_D3D10_DEVICE_KHR"),
    (-1003, "CL_INVALID_D3D10_RESOURCE_KHR"),
    (-1004, "CL_D3D10_RESOURCE_ALREADY_ACQUIRED_KHR"),
    (-1005, "CL_D3D10_RESOURCE_NOT_ACQUIRED_KHR"),
    (-1057, "CL_DEVICE_PARTITION_FAILED_EXT"),
    (-1058, "CL_INVALID_PARTITION_COUNT_EXT"),
    (-1059, "CL_INVALID_PARTITION_NAME_EXT"),
    (-1092, "CL_EGL_RESOURCE_NOT_ACQUIRED_KHR"),
    (-1093, "CL_INVALID_EGL_OBJECT_KHR"),
    (-1094, "CL_INVALID_ACCELERATOR_INTEL"),
    (-1095, "CL_INVALID_ACCELERATOR_TYPE_INTEL"),
    (-1096, "CL_INVALID_ACCELERATOR_DESCRIPTOR_INTEL"),
    (-1097, "CL_ACCELERATOR_TYPE_NOT_SUPPORTED_INTEL"),
    (-1098, "CL_INVALID_VA_API_MEDIA_ADAPTER_INTEL"),
    (-1099, "CL_INVALID_VA_API_MEDIA_SURFACE_INTEL"),
    (-1100, "CL_VA_API_MEDIA_SURFACE_ALREADY_ACQUIRED_INTEL"),
    (-1101, "CL_VA_API_MEDIA_SURFACE_NOT_ACQUIRED_INTEL"),
    (-9996, "OCLC_NULL_CONTEXT"),
    (-9997, "OCLC_INVALID_WORK_DIMS"),
    (-9998, "OCLC_ZERO_SIZED_ALLOCATION"),
    (-9999, "OCLC_NULL_POINTER"),
];

const UNKNOWN_ERROR: &str = "Unknown OpenCL error code";

/// The name of an OpenCL error code, or "Unknown OpenCL error code".
pub fn error_string(code: i32) -> &'static str {
    ERROR_STRINGS
        .iter()
        .find(|(x, _)| *x == code)
        .map_or(UNKNOWN_ERROR, |(_, name)| name)
}

/// Every string returned by [`error_string`].
pub(crate) fn error_strings() -> impl Iterator<Item = &'static str> {
    ERROR_STRINGS
        .iter()
        .map(|(_, name)| *name)
        .chain([UNKNOWN_ERROR])
}

/// Runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No device could be selected.
    #[error("no OpenCL 3.0 capable device found")]
    DeviceUnavailable,
    /// Device index is not less than the number of devices.
    #[error("device index {index} is out of range 0..{devices}")]
    DeviceIndexOutOfRange { index: usize, devices: usize },
    #[error("cannot allocate zero bytes")]
    ZeroSizedAllocation,
    #[error("null pointer supplied to copy")]
    NullPointer,
    #[error("context is null or not initialized")]
    NullContext,
    /// A copy exceeds the bounds of its buffer.
    #[error("copy of {size} bytes exceeds buffer of {len} bytes")]
    CopyOutOfBounds { size: usize, len: usize },
    #[error(transparent)]
    WorkDims(#[from] WorkDimError),
    /// The device compiler rejected the program.
    #[error("OpenCL build failed:\n\n{log}")]
    BuildFailed { log: String },
    /// A native call failed.
    #[error("OpenCL error code {code}: '{}'", error_string(*.code))]
    Native { code: i32 },
}

impl RuntimeError {
    pub(crate) fn native(code: i32) -> Self {
        Self::Native { code }
    }
    /// The OpenCL error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::DeviceUnavailable | Self::DeviceIndexOutOfRange { .. } => CL_DEVICE_NOT_FOUND,
            Self::ZeroSizedAllocation => OCLC_ZERO_SIZED_ALLOCATION,
            Self::NullPointer => OCLC_NULL_POINTER,
            Self::NullContext => OCLC_NULL_CONTEXT,
            Self::CopyOutOfBounds { .. } => CL_INVALID_VALUE,
            Self::WorkDims(_) => OCLC_INVALID_WORK_DIMS,
            Self::BuildFailed { .. } => CL_BUILD_PROGRAM_FAILURE,
            Self::Native { code } => *code,
        }
    }
}

#[cfg(feature = "device")]
impl From<opencl3::error_codes::ClError> for RuntimeError {
    fn from(error: opencl3::error_codes::ClError) -> Self {
        Self::native(error.0)
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
