/*!
Function declarations from clang's JSON AST dump.

`clang -Xclang -ast-dump=json -fsyntax-only` prints every declaration with its location and
range. To keep the output small clang omits the `file` and `line` of a location when they did
not change since the previously printed location, so the tree is walked in print order (`loc`,
`range.begin`, `range.end`, then `inner`), carrying both forward. Locations inside macro
expansions are split into a `spellingLoc` and an `expansionLoc`, printed in that order.
*/

use oclc_core::source::SourceLocation;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct Node {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    loc: Option<Loc>,
    #[serde(default)]
    range: Option<Range>,
    #[serde(default, rename = "type")]
    ty: Option<Type>,
    #[serde(default, rename = "isImplicit")]
    is_implicit: bool,
    #[serde(default)]
    inner: Vec<Node>,
}

#[derive(Debug, Default, Deserialize)]
struct Loc {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line: Option<usize>,
    #[serde(default)]
    col: Option<usize>,
    #[serde(default, rename = "includedFrom")]
    included_from: Option<serde_json::Value>,
    #[serde(default, rename = "spellingLoc")]
    spelling_loc: Option<Box<Loc>>,
    #[serde(default, rename = "expansionLoc")]
    expansion_loc: Option<Box<Loc>>,
}

#[derive(Debug, Default, Deserialize)]
struct Range {
    #[serde(default)]
    begin: Loc,
    #[serde(default)]
    end: Loc,
}

#[derive(Debug, Default, Deserialize)]
struct Type {
    #[serde(default, rename = "qualType")]
    qual_type: String,
}

/// A parameter of a [`FunctionDecl`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDecl {
    /// The type as spelled, including address space qualifiers.
    pub ty: String,
    /// Empty for unnamed parameters.
    pub name: String,
}

/// A function declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub return_type: String,
    /// Declared with the kernel calling convention (`__kernel`).
    pub is_kernel: bool,
    /// Declared in an included or system header rather than the input file.
    pub in_header: bool,
    /// A template specialization or instantiation.
    pub is_specialization: bool,
    pub params: Vec<ParamDecl>,
    /// Spelling location of the first token.
    pub begin: Option<SourceLocation>,
    /// Spelling location of the last token.
    pub end: Option<SourceLocation>,
}

/// The function declarations of a translation unit, in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDecl>,
}

impl TranslationUnit {
    /// Parses the output of `-ast-dump=json`.
    ///
    /// `main_file` is the input file as passed to clang, functions from other files are flagged as
    /// [`in_header`](FunctionDecl::in_header).
    pub fn from_json(json: &[u8], main_file: &str) -> serde_json::Result<Self> {
        let root: Node = serde_json::from_slice(json)?;
        let mut walker = Walker {
            main_file,
            file: None,
            included: false,
            line: 0,
            functions: Vec::new(),
        };
        walker.node(&root, false);
        Ok(Self {
            functions: walker.functions,
        })
    }
}

struct Walker<'a> {
    main_file: &'a str,
    file: Option<String>,
    included: bool,
    line: usize,
    functions: Vec<FunctionDecl>,
}

/// A resolved location.
#[derive(Clone, Copy)]
struct Resolved {
    location: SourceLocation,
    in_header: bool,
}

impl Walker<'_> {
    fn in_header(&self) -> bool {
        self.included
            || self
                .file
                .as_deref()
                .map_or(false, |file| file != self.main_file)
    }
    /// Updates the carried file and line, returning the spelling location.
    fn loc(&mut self, loc: &Loc) -> Option<Resolved> {
        if loc.spelling_loc.is_some() || loc.expansion_loc.is_some() {
            let spelling = loc.spelling_loc.as_deref().and_then(|x| self.loc(x));
            if let Some(expansion) = loc.expansion_loc.as_deref() {
                self.loc(expansion);
            }
            return spelling;
        }
        if let Some(file) = loc.file.as_ref() {
            self.file.replace(file.clone());
            self.included = loc.included_from.is_some();
        }
        if let Some(line) = loc.line {
            self.line = line;
        }
        let column = loc.col?;
        Some(Resolved {
            location: SourceLocation::new(self.line, column),
            in_header: self.in_header(),
        })
    }
    fn node(&mut self, node: &Node, in_template: bool) {
        let loc = node.loc.as_ref().and_then(|x| self.loc(x));
        let (begin, end) = match node.range.as_ref() {
            Some(range) => (self.loc(&range.begin), self.loc(&range.end)),
            None => (None, None),
        };
        let in_template = in_template
            || matches!(
                node.kind.as_str(),
                "FunctionTemplateDecl"
                    | "ClassTemplateDecl"
                    | "ClassTemplateSpecializationDecl"
                    | "ClassTemplatePartialSpecializationDecl"
            );
        let nested_start = self.functions.len();
        for inner in node.inner.iter() {
            self.node(inner, in_template);
        }
        if node.kind == "FunctionDecl" && !node.is_implicit {
            // Nested declarations come after the function in source order.
            let nested = self.functions.split_off(nested_start);
            let function = FunctionDecl {
                name: node.name.clone().unwrap_or_default(),
                return_type: node
                    .ty
                    .as_ref()
                    .map(|ty| return_type(&ty.qual_type))
                    .unwrap_or_default(),
                is_kernel: node
                    .inner
                    .iter()
                    .any(|x| matches!(x.kind.as_str(), "OpenCLKernelAttr" | "DeviceKernelAttr")),
                in_header: loc.or(begin).map_or(true, |x| x.in_header),
                is_specialization: in_template,
                params: node
                    .inner
                    .iter()
                    .filter(|x| x.kind == "ParmVarDecl")
                    .map(|x| ParamDecl {
                        ty: x.ty.as_ref().map(|ty| ty.qual_type.clone()).unwrap_or_default(),
                        name: x.name.clone().unwrap_or_default(),
                    })
                    .collect(),
                begin: begin.map(|x| x.location),
                end: end.map(|x| x.location),
            };
            self.functions.push(function);
            self.functions.extend(nested);
        }
    }
}

/// The return type of a function type such as `void (__global float *, int)`.
fn return_type(function_type: &str) -> String {
    function_type
        .split_once('(')
        .map_or(function_type, |(ret, _)| ret)
        .trim()
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Abridged output of `clang -x cl -Xclang -ast-dump=json -fsyntax-only add.cl`.
    pub(crate) const ADD_CL_JSON: &str = r#"{
  "id": "0x1",
  "kind": "TranslationUnitDecl",
  "loc": {},
  "range": { "begin": {}, "end": {} },
  "inner": [
    {
      "id": "0x2",
      "kind": "TypedefDecl",
      "loc": {},
      "range": { "begin": {}, "end": {} },
      "isImplicit": true,
      "name": "__builtin_va_list",
      "type": { "qualType": "char *" }
    },
    {
      "id": "0x3",
      "kind": "FunctionDecl",
      "loc": {
        "offset": 120,
        "file": "/usr/lib/clang/16/include/opencl-c-base.h",
        "line": 10,
        "col": 22,
        "tokLen": 9,
        "includedFrom": { "file": "<built-in>" }
      },
      "range": {
        "begin": { "offset": 99, "col": 1, "tokLen": 8 },
        "end": { "offset": 140, "col": 42, "tokLen": 1 }
      },
      "name": "get_global_id",
      "type": { "qualType": "size_t (uint)" },
      "inner": [
        { "id": "0x4", "kind": "ParmVarDecl", "loc": { "offset": 136, "col": 38, "tokLen": 1 }, "range": { "begin": { "offset": 131, "col": 33, "tokLen": 4 }, "end": { "offset": 136, "col": 38, "tokLen": 1 } }, "name": "d", "type": { "qualType": "uint" } }
      ]
    },
    {
      "id": "0x5",
      "kind": "FunctionDecl",
      "loc": {
        "offset": 35,
        "file": "add.cl",
        "line": 3,
        "col": 13,
        "tokLen": 3
      },
      "range": {
        "begin": { "offset": 23, "col": 1, "tokLen": 8 },
        "end": { "offset": 141, "line": 7, "col": 1, "tokLen": 1 }
      },
      "name": "add",
      "type": { "qualType": "void (__global float *, __global const float *, uint)" },
      "inner": [
        {
          "id": "0x6",
          "kind": "ParmVarDecl",
          "loc": { "offset": 56, "line": 3, "col": 34, "tokLen": 1 },
          "range": { "begin": { "offset": 39, "col": 17, "tokLen": 8 }, "end": { "offset": 56, "col": 34, "tokLen": 1 } },
          "name": "a",
          "type": { "qualType": "__global float *" }
        },
        {
          "id": "0x7",
          "kind": "ParmVarDecl",
          "loc": { "offset": 82, "line": 4, "col": 24, "tokLen": 1 },
          "range": { "begin": { "offset": 59, "col": 1, "tokLen": 8 }, "end": { "offset": 82, "col": 24, "tokLen": 1 } },
          "name": "b",
          "type": { "qualType": "__global const float *" }
        },
        {
          "id": "0x8",
          "kind": "ParmVarDecl",
          "loc": { "offset": 90, "col": 32, "tokLen": 1 },
          "range": { "begin": { "offset": 85, "col": 27, "tokLen": 4 }, "end": { "offset": 90, "col": 32, "tokLen": 1 } },
          "name": "n",
          "type": { "qualType": "uint" }
        },
        {
          "id": "0x9",
          "kind": "CompoundStmt",
          "range": { "begin": { "offset": 93, "line": 5, "col": 1, "tokLen": 1 }, "end": { "offset": 141, "line": 7, "col": 1, "tokLen": 1 } }
        },
        {
          "id": "0xa",
          "kind": "OpenCLKernelAttr",
          "range": { "begin": { "offset": 23, "line": 3, "col": 1, "tokLen": 8 }, "end": { "offset": 23, "col": 1, "tokLen": 8 } }
        }
      ]
    },
    {
      "id": "0xb",
      "kind": "FunctionDecl",
      "loc": { "offset": 148, "line": 9, "col": 5, "tokLen": 4 },
      "range": {
        "begin": { "offset": 144, "col": 1, "tokLen": 3 },
        "end": { "offset": 170, "line": 11, "col": 1, "tokLen": 1 }
      },
      "name": "host",
      "type": { "qualType": "int (void)" },
      "inner": [
        {
          "id": "0xc",
          "kind": "CompoundStmt",
          "range": { "begin": { "offset": 155, "line": 10, "col": 1, "tokLen": 1 }, "end": { "offset": 170, "line": 11, "col": 1, "tokLen": 1 } }
        }
      ]
    },
    {
      "id": "0xd",
      "kind": "FunctionDecl",
      "loc": {
        "spellingLoc": { "offset": 200, "line": 13, "col": 13, "tokLen": 4 },
        "expansionLoc": { "offset": 230, "line": 15, "col": 1, "tokLen": 6 }
      },
      "range": {
        "begin": {
          "spellingLoc": { "offset": 188, "line": 13, "col": 1, "tokLen": 8 },
          "expansionLoc": { "offset": 230, "line": 15, "col": 1, "tokLen": 6 }
        },
        "end": {
          "spellingLoc": { "offset": 220, "line": 13, "col": 33, "tokLen": 1 },
          "expansionLoc": { "offset": 230, "line": 15, "col": 1, "tokLen": 6 }
        }
      },
      "name": "fill",
      "type": { "qualType": "void (__global int *)" },
      "inner": [
        { "id": "0xe", "kind": "ParmVarDecl", "loc": { "offset": 215, "line": 13, "col": 28, "tokLen": 1 }, "range": { "begin": { "offset": 201, "col": 14, "tokLen": 8 }, "end": { "offset": 215, "col": 28, "tokLen": 1 } }, "type": { "qualType": "__global int *" } },
        { "id": "0xf", "kind": "OpenCLKernelAttr", "range": { "begin": { "offset": 188, "col": 1, "tokLen": 8 }, "end": { "offset": 188, "col": 1, "tokLen": 8 } } }
      ]
    }
  ]
}"#;

    #[test]
    fn functions_from_json() {
        let unit = TranslationUnit::from_json(ADD_CL_JSON.as_bytes(), "add.cl").unwrap();
        let names: Vec<_> = unit.functions.iter().map(|x| x.name.as_str()).collect();
        assert_eq!(names, ["get_global_id", "add", "host", "fill"]);

        let builtin = &unit.functions[0];
        assert!(builtin.in_header);
        assert!(!builtin.is_kernel);
        assert_eq!(builtin.return_type, "size_t");

        let add = &unit.functions[1];
        assert!(add.is_kernel);
        assert!(!add.in_header);
        assert!(!add.is_specialization);
        assert_eq!(add.return_type, "void");
        assert_eq!(add.begin, Some(SourceLocation::new(3, 1)));
        assert_eq!(add.end, Some(SourceLocation::new(7, 1)));
        assert_eq!(
            add.params,
            [
                ParamDecl {
                    ty: "__global float *".to_string(),
                    name: "a".to_string()
                },
                ParamDecl {
                    ty: "__global const float *".to_string(),
                    name: "b".to_string()
                },
                ParamDecl {
                    ty: "uint".to_string(),
                    name: "n".to_string()
                },
            ]
        );

        let host = &unit.functions[2];
        assert!(!host.is_kernel);
        assert_eq!(host.return_type, "int");
        assert_eq!(host.begin, Some(SourceLocation::new(9, 1)));
        assert_eq!(host.end, Some(SourceLocation::new(11, 1)));
    }

    #[test]
    fn macro_locations_use_spelling() {
        let unit = TranslationUnit::from_json(ADD_CL_JSON.as_bytes(), "add.cl").unwrap();
        let fill = &unit.functions[3];
        assert!(fill.is_kernel);
        assert_eq!(fill.begin, Some(SourceLocation::new(13, 1)));
        assert_eq!(fill.end, Some(SourceLocation::new(13, 33)));
        assert_eq!(fill.params.len(), 1);
        assert_eq!(fill.params[0].name, "");
    }

    #[test]
    fn template_specializations() {
        let json = r#"{
  "kind": "TranslationUnitDecl",
  "inner": [
    {
      "kind": "FunctionTemplateDecl",
      "loc": { "file": "a.clcpp", "line": 1, "col": 31 },
      "range": { "begin": { "col": 1 }, "end": { "line": 2, "col": 1 } },
      "name": "scale",
      "inner": [
        {
          "kind": "FunctionDecl",
          "loc": { "line": 1, "col": 31 },
          "range": { "begin": { "line": 1, "col": 21 }, "end": { "line": 2, "col": 1 } },
          "name": "scale",
          "type": { "qualType": "void (T *)" },
          "inner": [ { "kind": "OpenCLKernelAttr" } ]
        }
      ]
    }
  ]
}"#;
        let unit = TranslationUnit::from_json(json.as_bytes(), "a.clcpp").unwrap();
        assert_eq!(unit.functions.len(), 1);
        assert!(unit.functions[0].is_specialization);
        assert!(!unit.functions[0].in_header);
    }

    #[test]
    fn return_types() {
        assert_eq!(return_type("void (int)"), "void");
        assert_eq!(return_type("const char *(void)"), "const char *");
        assert_eq!(return_type("int"), "int");
    }
}
