//! Textual form of the IR.
//!
//! The output is accepted by `parser::parse`, so a printed program can be
//! read back. Nested blocks are indented by two spaces per level.

use std::fmt::Write;

use super::types::{Type, TypeRef};
use super::typing::step_type;
use super::{Block, Callee, Constant, Deref, DerefStep, FuncBody, InstKind, Program, Signature, Value, Variables};

/// Print a whole program.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::new(program);
    printer.program();
    printer.out
}

/// Print the instructions of a body, starting at column zero.
pub fn print_body(program: &Program, body: &FuncBody) -> String {
    print_block(program, &body.root)
}

/// Print the instructions of a block, starting at column zero.
pub fn print_block(program: &Program, block: &Block) -> String {
    let mut printer = Printer::new(program);
    printer.block(block, 0);
    printer.out
}

pub fn print_deref(vars: &Variables, deref: &Deref) -> String {
    let var = &vars[deref.var()];
    let mut out = var.name.clone();
    let mut ty = Some(var.ty.clone());
    for step in deref.steps() {
        match step {
            DerefStep::Field(index) => match ty.as_deref().and_then(|t| t.field(*index)) {
                Some(field) => {
                    let _ = write!(out, ".{}", field.name);
                }
                None => {
                    let _ = write!(out, ".{}", index);
                }
            },
            DerefStep::Index(value) => {
                let _ = write!(out, "[{}]", print_value(vars, value));
            }
            DerefStep::Wildcard => out.push_str("[*]"),
        }
        ty = ty.and_then(|t| step_type(&t, step).ok());
    }
    out
}

pub fn print_value(vars: &Variables, value: &Value) -> String {
    match value {
        Value::Const(c) => print_constant(c),
        Value::Load(deref) => print_deref(vars, deref),
        Value::SubroutineIndex(inner) => format!("subroutine_index({})", print_value(vars, inner)),
        Value::Binary { op, lhs, rhs } => {
            format!("{} {} {}", print_operand(vars, lhs), op.symbol(), print_operand(vars, rhs))
        }
    }
}

fn print_operand(vars: &Variables, value: &Value) -> String {
    match value {
        Value::Binary { .. } => format!("({})", print_value(vars, value)),
        _ => print_value(vars, value),
    }
}

fn print_constant(c: &Constant) -> String {
    match c {
        Constant::Bool(b) => b.to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::UInt(u) => format!("{}u", u),
        // Debug keeps a decimal point so the literal reads back as a float.
        Constant::Float(f) => format!("{:?}", f),
    }
}

struct Printer<'a> {
    program: &'a Program,
    out: String,
}

impl<'a> Printer<'a> {
    fn new(program: &'a Program) -> Self {
        Printer {
            program,
            out: String::new(),
        }
    }

    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn program(&mut self) {
        let program = self.program;
        for ty in &program.types {
            match &**ty {
                Type::Struct { name, fields } => {
                    let fields: Vec<String> = fields.iter().map(|f| format!("{}: {}", f.name, f.ty)).collect();
                    self.line(0, &format!("struct {} {{ {} }}", name, fields.join(", ")));
                }
                Type::Subroutine { name } => self.line(0, &format!("subroutine {}", name)),
                _ => {}
            }
        }

        for (_, var) in program.globals() {
            self.line(0, &format!("{} {}: {}", var.mode.keyword(), var.name, var.ty));
        }

        for (_, function) in &program.functions {
            for sig in &function.overloads {
                if !self.out.is_empty() {
                    self.out.push('\n');
                }
                self.signature(&function.name, &function.subroutine_types, sig);
            }
        }
    }

    fn signature(&mut self, name: &str, interfaces: &[TypeRef], sig: &Signature) {
        let program = self.program;
        let vars = &program.variables;
        let params: Vec<String> = sig.params.iter().map(|p| format!("{}: {}", vars[*p].name, vars[*p].ty)).collect();
        let mut header = format!("fn {}({})", name, params.join(", "));
        if let Some(ret) = &sig.return_type {
            let _ = write!(header, " -> {}", ret);
        }
        if !interfaces.is_empty() {
            let names: Vec<String> = interfaces.iter().map(|i| i.to_string()).collect();
            let _ = write!(header, " : {}", names.join(", "));
        }

        match &sig.body {
            None => self.line(0, &header),
            Some(body) => {
                self.line(0, &format!("{} {{", header));
                for local in &body.locals {
                    let var = &vars[*local];
                    self.line(1, &format!("local {}: {}", var.name, var.ty));
                }
                self.block(&body.root, 1);
                self.line(0, "}");
            }
        }
    }

    fn block(&mut self, block: &Block, indent: usize) {
        let program = self.program;
        let vars = &program.variables;
        for inst in block.insts() {
            match &inst.kind {
                InstKind::Copy { dst, src } => {
                    self.line(indent, &format!("copy {}, {}", print_deref(vars, dst), print_deref(vars, src)));
                }
                InstKind::Call { callee, args, ret } => {
                    let target = match callee {
                        Callee::Direct(sig) => program.function(sig.func).name.clone(),
                        Callee::Indirect { binding, array_index } => match array_index {
                            Some(index) => format!("indirect {}[{}]", vars[*binding].name, print_value(vars, index)),
                            None => format!("indirect {}", vars[*binding].name),
                        },
                    };
                    let args: Vec<String> = args.iter().map(|a| print_value(vars, a)).collect();
                    let mut text = format!("call {}({})", target, args.join(", "));
                    if let Some(ret) = ret {
                        let _ = write!(text, " -> {}", print_deref(vars, ret));
                    }
                    self.line(indent, &text);
                }
                InstKind::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    self.line(indent, &format!("if {} {{", print_value(vars, cond)));
                    self.block(then_block, indent + 1);
                    if !else_block.is_empty() {
                        self.line(indent, "} else {");
                        self.block(else_block, indent + 1);
                    }
                    self.line(indent, "}");
                }
                InstKind::Return(value) => match value {
                    Some(value) => self.line(indent, &format!("return {}", print_value(vars, value))),
                    None => self.line(indent, "return"),
                },
            }
        }
    }
}
