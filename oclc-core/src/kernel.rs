/*!
Kernel declarations.

A [`KernelDeclaration`] describes one kernel found in a source file: its name, its parameters in
declaration order, and where its text begins and ends.
*/

use crate::source::{LineIndex, SourceLocation, SourceSpan};

/// Errors.
pub mod error {
    use crate::source::SourceLocation;

    /// The end of a declaration does not follow its beginning.
    #[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
    #[error("kernel `{kernel}` ends at {end}, before it begins at {begin}")]
    pub struct DeclarationOrderError {
        pub(super) kernel: String,
        pub(super) begin: SourceLocation,
        pub(super) end: SourceLocation,
    }
}
use error::DeclarationOrderError;

/// A kernel parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelParam {
    ty: String,
    name: String,
}

impl KernelParam {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
    /// The type as spelled, without an address space qualifier.
    pub fn ty(&self) -> &str {
        &self.ty
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Pointer parameters are passed as device buffers.
    pub fn is_buffer(&self) -> bool {
        self.ty.contains('*')
    }
}

/// A kernel declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelDeclaration {
    name: String,
    params: Vec<KernelParam>,
    begin: SourceLocation,
    end: SourceLocation,
}

impl KernelDeclaration {
    /// Creates a declaration spanning `begin` to `end` (inclusive).
    ///
    /// **errors**
    ///
    /// [`DeclarationOrderError`] if `end` does not follow `begin`.
    pub fn new(
        name: impl Into<String>,
        params: Vec<KernelParam>,
        begin: SourceLocation,
        end: SourceLocation,
    ) -> Result<Self, DeclarationOrderError> {
        let name = name.into();
        if end <= begin {
            return Err(DeclarationOrderError {
                kernel: name,
                begin,
                end,
            });
        }
        Ok(Self {
            name,
            params,
            begin,
            end,
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn params(&self) -> &[KernelParam] {
        &self.params
    }
    pub fn begin(&self) -> SourceLocation {
        self.begin
    }
    pub fn end(&self) -> SourceLocation {
        self.end
    }
    /// The declaration of the host function that dispatches this kernel.
    ///
    /// The launch context and dimensions come first, followed by the kernel's parameters.
    pub fn stub_signature(&self) -> String {
        let mut signature = format!(
            "int {}(oclc_context* __oclc_ctx, dim3 __oclc_grid, dim3 __oclc_block",
            self.name
        );
        for param in self.params.iter() {
            signature.push_str(", ");
            signature.push_str(&param.ty);
            if !param.ty.ends_with('*') {
                signature.push(' ');
            }
            signature.push_str(&param.name);
        }
        signature.push(')');
        signature
    }
    /// The byte span of the declaration in the text indexed by `index`.
    pub fn span(&self, index: &LineIndex) -> Result<SourceSpan, crate::source::error::SpanError> {
        index.span(self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_order() {
        let begin = SourceLocation::new(3, 1);
        assert!(KernelDeclaration::new("k", Vec::new(), begin, SourceLocation::new(3, 2)).is_ok());
        assert!(KernelDeclaration::new("k", Vec::new(), begin, begin).is_err());
        assert!(KernelDeclaration::new("k", Vec::new(), begin, SourceLocation::new(2, 9)).is_err());
    }

    #[test]
    fn stub_signature() {
        let params = vec![
            KernelParam::new("float *", "a"),
            KernelParam::new("const float *", "b"),
            KernelParam::new("uint", "n"),
        ];
        let kernel = KernelDeclaration::new(
            "add",
            params,
            SourceLocation::new(1, 1),
            SourceLocation::new(4, 1),
        )
        .unwrap();
        assert_eq!(
            kernel.stub_signature(),
            "int add(oclc_context* __oclc_ctx, dim3 __oclc_grid, dim3 __oclc_block, float *a, const float *b, uint n)"
        );
        let kernel = KernelDeclaration::new(
            "k",
            Vec::new(),
            SourceLocation::new(1, 1),
            SourceLocation::new(1, 9),
        )
        .unwrap();
        assert_eq!(
            kernel.stub_signature(),
            "int k(oclc_context* __oclc_ctx, dim3 __oclc_grid, dim3 __oclc_block)"
        );
    }

    #[test]
    fn buffer_params() {
        assert!(KernelParam::new("float *", "a").is_buffer());
        assert!(KernelParam::new("const int *", "a").is_buffer());
        assert!(!KernelParam::new("int", "n").is_buffer());
    }
}
