use crate::error::CompileError;
use oclc_core::{
    kernel::KernelDeclaration,
    source::{LineIndex, SourceSpan},
};

/// The device code of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCode {
    /// The span of each kernel, in source order.
    pub spans: Vec<SourceSpan>,
    /// The text of every span, separated by newlines.
    pub text: String,
}

/// Cuts the text of `kernels` out of `source`.
///
/// **errors**
///
/// - A location is not within `source`, or a span is reversed.
/// - A span overlaps or precedes the span of the previous kernel.
pub fn isolate(
    source: &str,
    index: &LineIndex,
    kernels: &[KernelDeclaration],
) -> Result<DeviceCode, CompileError> {
    let mut spans = Vec::<SourceSpan>::with_capacity(kernels.len());
    let mut text = String::new();
    for (i, kernel) in kernels.iter().enumerate() {
        let span = kernel
            .span(index)
            .map_err(|source| CompileError::InvalidSpan {
                kernel: kernel.name().to_string(),
                source,
            })?;
        if let Some(previous) = spans.last() {
            if span.begin <= previous.end {
                return Err(CompileError::OverlappingSpans {
                    kernel: kernel.name().to_string(),
                    previous: kernels[i - 1].name().to_string(),
                });
            }
        }
        let device = source
            .get(span.range())
            .ok_or_else(|| CompileError::InvalidSpan {
                kernel: kernel.name().to_string(),
                source: oclc_core::source::error::SpanError::OutOfBounds {
                    location: kernel.end(),
                },
            })?;
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(device);
        spans.push(span);
    }
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(DeviceCode { spans, text })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use oclc_core::source::{error::SpanError, SourceLocation};

    pub(crate) const SOURCE: &str = "\
#include <stdio.h>

__kernel void add(__global float* a, __global const float* b)
{
    a[get_global_id(0)] += b[get_global_id(0)];
}

int helper(void) { return 1; }

__kernel void fill(__global int* x, int v) { x[get_global_id(0)] = v; }
";

    pub(crate) fn kernels() -> Vec<KernelDeclaration> {
        vec![
            KernelDeclaration::new(
                "add",
                Vec::new(),
                SourceLocation::new(3, 1),
                SourceLocation::new(6, 1),
            )
            .unwrap(),
            KernelDeclaration::new(
                "fill",
                Vec::new(),
                SourceLocation::new(10, 1),
                SourceLocation::new(10, 71),
            )
            .unwrap(),
        ]
    }

    #[test]
    fn device_code() {
        let index = LineIndex::new(SOURCE);
        let kernels = kernels();
        let device = isolate(SOURCE, &index, &kernels).unwrap();
        assert_eq!(device.spans.len(), 2);
        assert_eq!(
            device.spans[0].slice(SOURCE),
            "__kernel void add(__global float* a, __global const float* b)\n{\n    a[get_global_id(0)] += b[get_global_id(0)];\n}"
        );
        assert_eq!(
            device.spans[1].slice(SOURCE),
            "__kernel void fill(__global int* x, int v) { x[get_global_id(0)] = v; }"
        );
        for (kernel, span) in kernels.iter().zip(device.spans.iter()) {
            assert_eq!(index.location(span.begin), Some(kernel.begin()));
            assert_eq!(index.location(span.end), Some(kernel.end()));
        }
        assert_eq!(
            device.text,
            format!(
                "{}\n{}\n",
                device.spans[0].slice(SOURCE),
                device.spans[1].slice(SOURCE)
            )
        );
        assert!(!device.text.contains("helper"));
    }

    #[test]
    fn no_kernels() {
        let index = LineIndex::new(SOURCE);
        let device = isolate(SOURCE, &index, &[]).unwrap();
        assert!(device.spans.is_empty());
        assert!(device.text.is_empty());
    }

    #[test]
    fn invalid_span() {
        let index = LineIndex::new(SOURCE);
        let kernel = KernelDeclaration::new(
            "k",
            Vec::new(),
            SourceLocation::new(10, 1),
            SourceLocation::new(40, 1),
        )
        .unwrap();
        let error = isolate(SOURCE, &index, &[kernel]).unwrap_err();
        assert!(matches!(
            error,
            CompileError::InvalidSpan {
                source: SpanError::OutOfBounds { .. },
                ..
            }
        ));
    }

    #[test]
    fn overlapping_spans() {
        let index = LineIndex::new(SOURCE);
        let mut kernels = kernels();
        kernels.reverse();
        let error = isolate(SOURCE, &index, &kernels).unwrap_err();
        assert!(matches!(
            error,
            CompileError::OverlappingSpans { kernel, previous } if kernel == "add" && previous == "fill"
        ));
    }
}
