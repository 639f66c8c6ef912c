//! Syntax tree of textual IR, before name and type resolution.

/// Source location span tracking (line, column) start and end positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Span {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Span covering columns `start_col..end_col` of a single line.
    pub fn line(line: usize, start_col: usize, end_col: usize) -> Self {
        Span::new(line, start_col, line, end_col)
    }

    /// Create a dummy/generated span (all zeros) for test code
    #[cfg(test)]
    pub fn dummy() -> Self {
        Span::new(0, 0, 0, 0)
    }

    /// Check if this is a generated/dummy span (all zeros)
    pub fn is_generated(&self) -> bool {
        self.start_line == 0 && self.start_col == 0 && self.end_line == 0 && self.end_col == 0
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}..{}", self.start_line, self.start_col, self.end_col)
        } else {
            write!(
                f,
                "{}:{}..{}:{}",
                self.start_line, self.start_col, self.end_line, self.end_col
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Struct(StructDecl),
    Subroutine(SubroutineDecl),
    Global(VarDecl),
    Function(FunctionDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<(String, TypeExpr)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubroutineDecl {
    pub name: String,
    pub span: Span,
}

/// Storage keyword of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKeyword {
    Uniform,
    In,
    Out,
    Shared,
    Global,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub storage: StorageKeyword,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// Builtin or declared type name.
    Named(String, Span),
    /// `elem[len]`
    Array(Box<TypeExpr>, u32),
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named(_, span) => *span,
            TypeExpr::Array(elem, _) => elem.span(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// Subroutine interfaces listed after `:`.
    pub interfaces: Vec<(String, Span)>,
    pub locals: Vec<VarDecl>,
    /// `None` for a prototype without a body.
    pub body: Option<Vec<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Copy {
        dst: PathExpr,
        src: PathExpr,
    },
    Call {
        target: CallTarget,
        args: Vec<Expr>,
        ret: Option<PathExpr>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Direct(String),
    Indirect { binding: String, index: Option<Expr> },
}

/// `root.field[index][*]...`
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub root: String,
    pub steps: Vec<PathStep>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// Member name, or a numeric member index.
    Field(String),
    Index(Expr),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    UInt(u32),
    Float(f32),
    Bool(bool),
    Path(PathExpr),
    SubroutineIndex(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}
