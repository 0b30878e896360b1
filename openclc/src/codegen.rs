/*!
Host code generation.

Every kernel definition is replaced by a stub with the same name that forwards the launch
dimensions and arguments to `oclcDispatch`:

```c
int add(oclc_context* __oclc_ctx, dim3 __oclc_grid, dim3 __oclc_block, float *a, uint n)
{
    const oclc_arg __oclc_args[2] = {
        oclcArgBuffer((oclc_mem)a),
        oclcArgValue(&n, sizeof(n)),
    };
    return oclcDispatch(__oclc_ctx, __oclc_spv_bin, sizeof(__oclc_spv_bin), "add", __oclc_grid, __oclc_block, __oclc_args, 2);
}
```
*/

use oclc_core::{embed, kernel::KernelDeclaration, source::SourceSpan};

/// The array holding the SPIR-V module of a generated source.
pub const BINARY_IDENT: &str = "__oclc_spv_bin";

/// The runtime header included by generated sources.
pub const RUNTIME_HEADER_NAME: &str = "oclc_rt.h";

/// The host function dispatching `kernel`.
pub fn stub(kernel: &KernelDeclaration) -> String {
    let mut stub = kernel.stub_signature();
    stub.push_str("\n{\n");
    let params = kernel.params();
    let (args, num_args) = if params.is_empty() {
        ("NULL", 0)
    } else {
        stub.push_str(&format!(
            "    const oclc_arg __oclc_args[{}] = {{\n",
            params.len()
        ));
        for param in params {
            let name = param.name();
            if param.is_buffer() {
                stub.push_str(&format!("        oclcArgBuffer((oclc_mem){name}),\n"));
            } else {
                stub.push_str(&format!("        oclcArgValue(&{name}, sizeof({name})),\n"));
            }
        }
        stub.push_str("    };\n");
        ("__oclc_args", params.len())
    };
    stub.push_str(&format!(
        "    return oclcDispatch(__oclc_ctx, {BINARY_IDENT}, sizeof({BINARY_IDENT}), \"{}\", __oclc_grid, __oclc_block, {args}, {num_args});\n}}",
        kernel.name()
    ));
    stub
}

/// Replaces the span of each kernel in `source` with its stub.
///
/// `spans` are sorted and disjoint, as returned by [`isolate`](crate::isolate::isolate).
pub fn splice(source: &str, kernels: &[KernelDeclaration], spans: &[SourceSpan]) -> String {
    let mut output = String::with_capacity(source.len() + kernels.len() * 256);
    let mut offset = 0;
    for (kernel, span) in kernels.iter().zip(spans) {
        output.push_str(&source[offset..span.begin]);
        output.push_str(&stub(kernel));
        offset = span.end + 1;
    }
    output.push_str(&source[offset..]);
    output
}

/// The generated host source: the runtime include, the embedded module, then `source` with each
/// kernel replaced by its stub.
pub fn host_source(
    input: &str,
    source: &str,
    kernels: &[KernelDeclaration],
    spans: &[SourceSpan],
    spirv: &[u32],
) -> String {
    let mut output = format!(
        "/* Generated by openclc {} from {input}. */\n#include \"{RUNTIME_HEADER_NAME}\"\n",
        env!("CARGO_PKG_VERSION")
    );
    if !kernels.is_empty() {
        output.push_str(&embed::encode_words(BINARY_IDENT, spirv));
    }
    output.push_str(&splice(source, kernels, spans));
    output
}

/// A header declaring the stubs of `kernels`, for use by other host sources.
pub fn prototypes(stem: &str, kernels: &[KernelDeclaration]) -> String {
    let guard: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    let mut header = format!(
        "/* Generated by openclc {}. */\n#ifndef OCLC_{guard}_H\n#define OCLC_{guard}_H\n\n#include \"{RUNTIME_HEADER_NAME}\"\n\n",
        env!("CARGO_PKG_VERSION")
    );
    for kernel in kernels {
        header.push_str(&kernel.stub_signature());
        header.push_str(";\n");
    }
    header.push_str("\n#endif\n");
    header
}
