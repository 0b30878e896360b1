#![forbid(unsafe_op_in_unsafe_fn)]
/*!
Types and algorithms shared by the `openclc` compiler driver and the `oclc` runtime.

- [`dim`]: launch dimensions and the work-dimension validator run before every dispatch.
- [`source`]: source locations, the per-file line index and declaration spans.
- [`kernel`]: kernel declarations extracted from mixed host / device source.
- [`embed`]: the byte array literal used to embed SPIR-V in generated sources.
*/

pub mod dim;
pub mod embed;
pub mod kernel;
pub mod source;
pub mod version;
