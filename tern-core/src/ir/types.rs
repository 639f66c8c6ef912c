//! Shader types for the IR.
//!
//! A `Type` is an immutable tree. Variables, derefs and signatures share types
//! through `TypeRef` handles; equality is structural, so two separately built
//! `vec3` handles compare equal.

use std::fmt;
use std::sync::Arc;

/// Shared handle to an immutable type.
pub type TypeRef = Arc<Type>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
        }
    }

    /// Prefix used for vector type names (`bvec3`, `ivec2`, ...).
    fn vector_prefix(self) -> &'static str {
        match self {
            ScalarKind::Bool => "b",
            ScalarKind::Int => "i",
            ScalarKind::UInt => "u",
            ScalarKind::Float => "",
        }
    }
}

/// A named member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: TypeRef,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        StructField {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarKind),
    Vector {
        elem: ScalarKind,
        size: u32,
    },
    /// Float matrix, stored column-major. Indexing yields a column vector.
    Matrix {
        columns: u32,
        rows: u32,
    },
    Array {
        elem: TypeRef,
        len: u32,
    },
    Struct {
        name: String,
        fields: Vec<StructField>,
    },
    /// Subroutine interface. A variable of this type holds a runtime handle
    /// selecting one of the implementations registered for the interface.
    Subroutine {
        name: String,
    },
}

impl Type {
    pub fn scalar(kind: ScalarKind) -> TypeRef {
        Arc::new(Type::Scalar(kind))
    }

    pub fn bool() -> TypeRef {
        Type::scalar(ScalarKind::Bool)
    }

    pub fn int() -> TypeRef {
        Type::scalar(ScalarKind::Int)
    }

    pub fn uint() -> TypeRef {
        Type::scalar(ScalarKind::UInt)
    }

    pub fn float() -> TypeRef {
        Type::scalar(ScalarKind::Float)
    }

    pub fn vector(elem: ScalarKind, size: u32) -> TypeRef {
        assert!((2..=4).contains(&size), "vector size {} out of range", size);
        Arc::new(Type::Vector { elem, size })
    }

    /// Float vector (`vec2`..`vec4`).
    pub fn vec(size: u32) -> TypeRef {
        Type::vector(ScalarKind::Float, size)
    }

    pub fn matrix(columns: u32, rows: u32) -> TypeRef {
        assert!(
            (2..=4).contains(&columns) && (2..=4).contains(&rows),
            "matrix shape {}x{} out of range",
            columns,
            rows
        );
        Arc::new(Type::Matrix { columns, rows })
    }

    pub fn array(elem: TypeRef, len: u32) -> TypeRef {
        Arc::new(Type::Array { elem, len })
    }

    pub fn structure(name: impl Into<String>, fields: Vec<StructField>) -> TypeRef {
        Arc::new(Type::Struct {
            name: name.into(),
            fields,
        })
    }

    pub fn subroutine(name: impl Into<String>) -> TypeRef {
        Arc::new(Type::Subroutine { name: name.into() })
    }

    /// Scalars, vectors and subroutine handles have no decomposable structure.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Type::Scalar(_) | Type::Vector { .. } | Type::Subroutine { .. })
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Scalar(ScalarKind::Bool))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Scalar(ScalarKind::Int | ScalarKind::UInt))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_subroutine(&self) -> bool {
        matches!(self, Type::Subroutine { .. })
    }

    /// Strip every enclosing array level.
    pub fn without_array(&self) -> &Type {
        let mut ty = self;
        while let Type::Array { elem, .. } = ty {
            ty = elem;
        }
        ty
    }

    /// Struct member by index.
    pub fn field(&self, index: u32) -> Option<&StructField> {
        match self {
            Type::Struct { fields, .. } => fields.get(index as usize),
            _ => None,
        }
    }

    /// Index of the struct member called `name`.
    pub fn field_index(&self, name: &str) -> Option<u32> {
        match self {
            Type::Struct { fields, .. } => fields.iter().position(|f| f.name == name).map(|i| i as u32),
            _ => None,
        }
    }

    /// Type produced by indexing: array element, matrix column, vector component.
    pub fn element_type(&self) -> Option<TypeRef> {
        match self {
            Type::Array { elem, .. } => Some(elem.clone()),
            Type::Matrix { rows, .. } => Some(Type::vec(*rows)),
            Type::Vector { elem, .. } => Some(Type::scalar(*elem)),
            _ => None,
        }
    }

    /// Whether a wildcard step may be applied: arrays and matrices only.
    pub fn accepts_wildcard(&self) -> bool {
        matches!(self, Type::Array { .. } | Type::Matrix { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(kind) => write!(f, "{}", kind.name()),
            Type::Vector { elem, size } => write!(f, "{}vec{}", elem.vector_prefix(), size),
            Type::Matrix { columns, rows } if columns == rows => write!(f, "mat{}", columns),
            Type::Matrix { columns, rows } => write!(f, "mat{}x{}", columns, rows),
            Type::Array { elem, len } => write!(f, "{}[{}]", elem, len),
            Type::Struct { name, .. } | Type::Subroutine { name } => write!(f, "{}", name),
        }
    }
}
