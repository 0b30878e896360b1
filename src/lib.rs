/*!
Runtime for kernels lowered by `openclc`.

Sources compiled with `openclc` embed a SPIR-V module and call this runtime through its C ABI,
see [`capi`] and `include/oclc_rt.h`. The same functionality is available from Rust:

- [`device`]: execution contexts.
- [`buffer`]: device memory and transfers.
- [`kernel`]: the program build cache and kernel dispatch.
- [`error`]: errors and OpenCL error codes.

# Features
- "device": Enables the OpenCL engine. Without it only the host engine is available, which
queues transfers in host memory and records dispatches without running them.
*/

#![forbid(unsafe_op_in_unsafe_fn)]

pub use oclc_core;

pub mod buffer;
pub mod capi;
pub mod device;
pub mod error;
pub mod kernel;
