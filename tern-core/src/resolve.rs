//! Name and type resolution: syntax tree to IR program.
//!
//! Runs in phases so that items may refer to each other regardless of order
//! in the source, except that a struct may only use types declared before it:
//! 1. Named types (structs, subroutine interfaces)
//! 2. Global variables
//! 3. Function signatures (same-named `fn` items become overloads)
//! 4. Function bodies

use std::collections::HashMap;

use log::debug;

use crate::ast::{
    CallTarget, Expr, FunctionDecl, Item, Module, PathExpr, PathStep, Span, Stmt, StmtKind, StorageKeyword,
    TypeExpr,
};
use crate::error::Result;
use crate::ir::builder::{Builder, Cursor};
use crate::ir::types::{ScalarKind, StructField, Type, TypeRef};
use crate::ir::{
    BinOp, Callee, Constant, Deref, DerefStep, FuncBody, FuncId, Function, Program, SigRef, Signature, Value,
    VarId, Variable, VariableMode,
};
use crate::{bail_type_at, err_type_at, err_undef_at};

/// Resolve a parsed module into an IR program.
pub fn resolve(module: &Module) -> Result<Program> {
    let mut resolver = Resolver::default();
    resolver.declare_types(module)?;
    resolver.declare_globals(module)?;
    let pending = resolver.declare_functions(module)?;
    for (sig, decl) in pending {
        resolver.resolve_body(sig, decl)?;
    }
    Ok(resolver.program)
}

/// Builtin type for a name like `float`, `ivec3`, `mat4` or `mat2x3`.
pub fn builtin_type(name: &str) -> Option<TypeRef> {
    let scalar = match name {
        "bool" => Some(ScalarKind::Bool),
        "int" => Some(ScalarKind::Int),
        "uint" => Some(ScalarKind::UInt),
        "float" => Some(ScalarKind::Float),
        _ => None,
    };
    if let Some(kind) = scalar {
        return Some(Type::scalar(kind));
    }

    let dim = |s: &str| s.parse::<u32>().ok().filter(|n| (2..=4).contains(n));

    if let Some(rest) = name.strip_prefix("mat") {
        return match rest.split_once('x') {
            Some((c, r)) => Some(Type::matrix(dim(c)?, dim(r)?)),
            None => dim(rest).map(|n| Type::matrix(n, n)),
        };
    }

    let (kind, rest) = match name.as_bytes().first() {
        Some(b'b') => (ScalarKind::Bool, &name[1..]),
        Some(b'i') => (ScalarKind::Int, &name[1..]),
        Some(b'u') => (ScalarKind::UInt, &name[1..]),
        _ => (ScalarKind::Float, name),
    };
    let size = dim(rest.strip_prefix("vec")?)?;
    Some(Type::vector(kind, size))
}

#[derive(Default)]
struct Resolver {
    program: Program,
    types: HashMap<String, TypeRef>,
    globals: HashMap<String, VarId>,
    function_ids: HashMap<String, FuncId>,
}

impl Resolver {
    fn resolve_type(&self, ty: &TypeExpr) -> Result<TypeRef> {
        match ty {
            TypeExpr::Named(name, span) => match builtin_type(name).or_else(|| self.types.get(name).cloned()) {
                Some(ty) => Ok(ty),
                None => bail_type_at!(*span, "Unknown type '{}'", name),
            },
            TypeExpr::Array(elem, len) => {
                if *len == 0 {
                    bail_type_at!(ty.span(), "Array length must be positive");
                }
                Ok(Type::array(self.resolve_type(elem)?, *len))
            }
        }
    }

    fn declare_type(&mut self, name: &str, ty: TypeRef, span: Span) -> Result<()> {
        if builtin_type(name).is_some() || self.types.contains_key(name) {
            bail_type_at!(span, "Type '{}' is already defined", name);
        }
        debug!("Declaring type {}", name);
        self.types.insert(name.to_string(), ty.clone());
        self.program.declare_type(ty);
        Ok(())
    }

    fn declare_types(&mut self, module: &Module) -> Result<()> {
        for item in &module.items {
            match item {
                Item::Struct(decl) => {
                    let mut fields: Vec<StructField> = Vec::new();
                    for (name, ty) in &decl.fields {
                        if fields.iter().any(|f| f.name == *name) {
                            bail_type_at!(decl.span, "Duplicate field '{}' in struct {}", name, decl.name);
                        }
                        fields.push(StructField::new(name.clone(), self.resolve_type(ty)?));
                    }
                    if fields.is_empty() {
                        bail_type_at!(decl.span, "Struct {} has no fields", decl.name);
                    }
                    self.declare_type(&decl.name, Type::structure(decl.name.clone(), fields), decl.span)?;
                }
                Item::Subroutine(decl) => {
                    self.declare_type(&decl.name, Type::subroutine(decl.name.clone()), decl.span)?;
                }
                Item::Global(_) | Item::Function(_) => {}
            }
        }
        Ok(())
    }

    fn declare_globals(&mut self, module: &Module) -> Result<()> {
        for item in &module.items {
            let Item::Global(decl) = item else { continue };
            if self.globals.contains_key(&decl.name) {
                bail_type_at!(decl.span, "Global '{}' is already defined", decl.name);
            }
            let mode = match decl.storage {
                StorageKeyword::Uniform => VariableMode::Uniform,
                StorageKeyword::In => VariableMode::ShaderIn,
                StorageKeyword::Out => VariableMode::ShaderOut,
                StorageKeyword::Shared => VariableMode::Shared,
                StorageKeyword::Global => VariableMode::Global,
                StorageKeyword::Local => bail_type_at!(decl.span, "'local' is not a global storage class"),
            };
            let ty = self.resolve_type(&decl.ty)?;
            let id = self.program.add_variable(Variable::new(decl.name.clone(), ty, mode));
            self.globals.insert(decl.name.clone(), id);
        }
        Ok(())
    }

    /// Create every function and overload. Returns the overloads that have bodies.
    fn declare_functions<'m>(&mut self, module: &'m Module) -> Result<Vec<(SigRef, &'m FunctionDecl)>> {
        let mut pending = Vec::new();
        for item in &module.items {
            let Item::Function(decl) = item else { continue };

            let func = match self.function_ids.get(&decl.name) {
                Some(id) => *id,
                None => {
                    let id = self.program.add_function(Function::new(decl.name.clone()));
                    self.function_ids.insert(decl.name.clone(), id);
                    id
                }
            };

            for (name, span) in &decl.interfaces {
                let interface = match self.types.get(name) {
                    Some(ty) if ty.is_subroutine() => ty.clone(),
                    Some(_) => bail_type_at!(*span, "'{}' is not a subroutine type", name),
                    None => bail_type_at!(*span, "Unknown subroutine type '{}'", name),
                };
                let interfaces = &mut self.program.functions[func].subroutine_types;
                if !interfaces.contains(&interface) {
                    interfaces.push(interface);
                }
            }

            let mut param_types = Vec::new();
            for param in &decl.params {
                if decl.params.iter().filter(|p| p.name == param.name).count() > 1 {
                    bail_type_at!(param.span, "Duplicate parameter '{}'", param.name);
                }
                param_types.push(self.resolve_type(&param.ty)?);
            }
            let return_type = decl.return_type.as_ref().map(|ty| self.resolve_type(ty)).transpose()?;

            let duplicate = self.program.functions[func]
                .overloads
                .iter()
                .any(|sig| sig.params.iter().map(|p| &self.program.variables[*p].ty).eq(param_types.iter()));
            if duplicate {
                bail_type_at!(decl.span, "Function {} already has an overload with these parameter types", decl.name);
            }

            let params = decl
                .params
                .iter()
                .zip(param_types)
                .map(|(param, ty)| self.program.add_variable(Variable::new(param.name.clone(), ty, VariableMode::Param)))
                .collect();
            let sig = self.program.add_overload(
                func,
                Signature {
                    params,
                    return_type,
                    body: None,
                },
            );
            debug!("Declared {} overload {}", decl.name, sig.overload);

            if decl.body.is_some() {
                pending.push((sig, decl));
            }
        }
        Ok(pending)
    }

    fn resolve_body(&mut self, sig: SigRef, decl: &FunctionDecl) -> Result<()> {
        let mut body = FuncBody::new();
        let mut scope = self.globals.clone();

        for param in &self.program.signature(sig).params {
            let var = &self.program.variables[*param];
            scope.insert(var.name.clone(), *param);
        }

        for local in &decl.locals {
            if body.locals.iter().any(|v| self.program.variables[*v].name == local.name) {
                bail_type_at!(local.span, "Local '{}' is already defined", local.name);
            }
            let ty = self.resolve_type(&local.ty)?;
            let id = self.program.add_variable(Variable::new(local.name.clone(), ty, VariableMode::Local));
            body.locals.push(id);
            scope.insert(local.name.clone(), id);
        }

        let stmts = decl.body.as_deref().unwrap_or(&[]);
        {
            let resolver = BodyResolver {
                program: &self.program,
                function_ids: &self.function_ids,
                scope,
                return_type: self.program.signature(sig).return_type.clone(),
            };
            let mut builder = body.builder(Cursor::AtEnd);
            resolver.stmts(&mut builder, stmts)?;
        }

        debug!("Resolved body of {} ({} instructions)", decl.name, body.root.deep_len());
        self.program.functions[sig.func].overloads[sig.overload as usize].body = Some(body);
        Ok(())
    }
}

/// Lowers the statements of one body, with every name it can see in `scope`.
struct BodyResolver<'a> {
    program: &'a Program,
    function_ids: &'a HashMap<String, FuncId>,
    scope: HashMap<String, VarId>,
    return_type: Option<TypeRef>,
}

impl<'a> BodyResolver<'a> {
    fn stmts(&self, b: &mut Builder<'_>, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.stmt(b, stmt)?;
        }
        Ok(())
    }

    fn stmt(&self, b: &mut Builder<'_>, stmt: &Stmt) -> Result<()> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Copy { dst, src } => {
                let (dst, dst_ty) = self.path(b, dst, span, true)?;
                let (src, src_ty) = self.path(b, src, span, true)?;
                if dst_ty != src_ty {
                    bail_type_at!(span, "Cannot copy {} to {}", src_ty, dst_ty);
                }
                if dst.wildcard_count() != src.wildcard_count() {
                    bail_type_at!(span, "Both sides of a copy need the same number of [*] steps");
                }
                b.copy(dst, src);
            }
            StmtKind::Call { target, args, ret } => {
                let mut values = Vec::new();
                let mut arg_types = Vec::new();
                for arg in args {
                    let (value, ty) = self.value(b, arg, span)?;
                    values.push(value);
                    arg_types.push(ty);
                }
                let ret = match ret {
                    Some(path) => Some(self.path(b, path, span, false)?),
                    None => None,
                };

                let callee = match target {
                    CallTarget::Direct(name) => {
                        let sig = self.overload(name, &arg_types, span)?;
                        let expected = &self.program.signature(sig).return_type;
                        if let Some((_, ret_ty)) = &ret {
                            match expected {
                                Some(expected) if expected == ret_ty => {}
                                Some(expected) => {
                                    bail_type_at!(span, "{} returns {}, cannot store into {}", name, expected, ret_ty)
                                }
                                None => bail_type_at!(span, "{} returns no value", name),
                            }
                        }
                        Callee::Direct(sig)
                    }
                    CallTarget::Indirect { binding, index } => {
                        let var_id = self.lookup(binding, span)?;
                        let var = &self.program.variables[var_id];
                        if !var.ty.without_array().is_subroutine() {
                            bail_type_at!(span, "'{}' has type {}, not a subroutine type", binding, var.ty);
                        }
                        let array_index = match (index, var.ty.is_array()) {
                            (Some(index), true) => Some(Box::new(self.index(b, index, span)?)),
                            (None, false) => None,
                            (Some(_), false) => bail_type_at!(span, "'{}' is not an array", binding),
                            (None, true) => bail_type_at!(span, "'{}' is an array and needs an index", binding),
                        };
                        Callee::Indirect {
                            binding: var_id,
                            array_index,
                        }
                    }
                };
                b.call(callee, values, ret.map(|(deref, _)| deref));
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let (cond, ty) = self.value(b, cond, span)?;
                if !ty.is_bool() {
                    bail_type_at!(span, "Condition has type {}, expected bool", ty);
                }
                let mut result = Ok(());
                let then_block = b.build_block(|inner| result = self.stmts(inner, then_body));
                result?;
                let mut result = Ok(());
                let else_block = b.build_block(|inner| result = self.stmts(inner, else_body));
                result?;
                b.if_else(cond, then_block, else_block);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.value(b, expr, span)?),
                    None => None,
                };
                match (&value, &self.return_type) {
                    (None, None) => {}
                    (Some((_, got)), Some(expected)) if got == expected => {}
                    (Some((_, got)), Some(expected)) => {
                        bail_type_at!(span, "Returning {} from a function returning {}", got, expected)
                    }
                    (Some(_), None) => bail_type_at!(span, "Returning a value from a function without a return type"),
                    (None, Some(expected)) => bail_type_at!(span, "Missing return value of type {}", expected),
                }
                b.ret(value.map(|(value, _)| value));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str, span: Span) -> Result<VarId> {
        self.scope.get(name).copied().ok_or_else(|| err_undef_at!(span, "{}", name))
    }

    /// The overload of `name` whose parameter types are exactly `arg_types`.
    fn overload(&self, name: &str, arg_types: &[TypeRef], span: Span) -> Result<SigRef> {
        let func = match self.function_ids.get(name) {
            Some(func) => *func,
            None => return Err(err_undef_at!(span, "{}", name)),
        };
        let function = self.program.function(func);
        for overload in 0..function.overloads.len() as u32 {
            let sig = SigRef { func, overload };
            if self.program.param_types(sig).as_slice() == arg_types {
                return Ok(sig);
            }
        }
        let types: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
        Err(err_type_at!(span, "No overload of {} takes ({})", name, types.join(", ")))
    }

    fn path(&self, b: &mut Builder<'_>, path: &PathExpr, span: Span, in_copy: bool) -> Result<(Deref, TypeRef)> {
        let var = self.lookup(&path.root, path.span)?;
        let mut ty = self.program.variables[var].ty.clone();
        let mut steps = Vec::new();
        for step in &path.steps {
            match step {
                PathStep::Field(name) => {
                    // Members may also be named by declaration index.
                    let index = name.parse::<u32>().ok().or_else(|| ty.field_index(name));
                    let Some((index, field_ty)) = index.and_then(|i| ty.field(i).map(|f| (i, f.ty.clone()))) else {
                        bail_type_at!(path.span, "Type {} has no field '{}'", ty, name);
                    };
                    steps.push(DerefStep::Field(index));
                    ty = field_ty;
                }
                PathStep::Index(expr) => {
                    let Some(elem) = ty.element_type() else {
                        bail_type_at!(path.span, "Cannot index into type {}", ty);
                    };
                    let index = self.index(b, expr, span)?;
                    steps.push(DerefStep::Index(Box::new(index)));
                    ty = elem;
                }
                PathStep::Wildcard => {
                    if !in_copy {
                        bail_type_at!(path.span, "[*] is only allowed in copy operands");
                    }
                    let elem = match ty.element_type() {
                        Some(elem) if ty.accepts_wildcard() => elem,
                        _ => bail_type_at!(path.span, "[*] cannot be applied to type {}", ty),
                    };
                    steps.push(DerefStep::Wildcard);
                    ty = elem;
                }
            }
        }
        Ok((b.alloc().deref(var, steps), ty))
    }

    fn index(&self, b: &mut Builder<'_>, expr: &Expr, span: Span) -> Result<Value> {
        let (value, ty) = self.value(b, expr, span)?;
        if !ty.is_integer() {
            bail_type_at!(span, "Index has type {}, expected int or uint", ty);
        }
        Ok(value)
    }

    fn value(&self, b: &mut Builder<'_>, expr: &Expr, span: Span) -> Result<(Value, TypeRef)> {
        match expr {
            Expr::Int(i) => Ok((Value::Const(Constant::Int(*i)), Type::int())),
            Expr::UInt(u) => Ok((Value::Const(Constant::UInt(*u)), Type::uint())),
            Expr::Float(f) => Ok((Value::Const(Constant::Float(*f)), Type::float())),
            Expr::Bool(v) => Ok((Value::bool(*v), Type::bool())),
            Expr::Path(path) => {
                let (deref, ty) = self.path(b, path, span, false)?;
                Ok((Value::Load(deref), ty))
            }
            Expr::SubroutineIndex(inner) => {
                let (inner, ty) = self.value(b, inner, span)?;
                if !ty.is_subroutine() {
                    bail_type_at!(span, "subroutine_index expects a subroutine handle, got {}", ty);
                }
                Ok((Value::SubroutineIndex(Box::new(inner)), Type::int()))
            }
            Expr::Eq(lhs, rhs) => self.compare(b, BinOp::Eq, lhs, rhs, span),
            Expr::Ne(lhs, rhs) => self.compare(b, BinOp::Ne, lhs, rhs, span),
        }
    }

    fn compare(&self, b: &mut Builder<'_>, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Result<(Value, TypeRef)> {
        let (lhs, lhs_ty) = self.value(b, lhs, span)?;
        let (rhs, rhs_ty) = self.value(b, rhs, span)?;
        if lhs_ty != rhs_ty {
            bail_type_at!(span, "Cannot compare {} with {}", lhs_ty, rhs_ty);
        }
        Ok((Value::binary(op, lhs, rhs), Type::bool()))
    }
}
