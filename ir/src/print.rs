//! Diagnostic printing.
//!
//! `Display` renders symbols as `_N`; [`print_stmt`] and [`print_expr`]
//! resolve names through a [`NodeContext`]. Output is one-way, for humans and
//! test assertions.

use std::fmt::{self, Write};

use crate::expr::{Expr, ExprNode, Intrinsic};
use crate::interval::{DimExpr, IntervalExpr};
use crate::stmt::{CallTarget, LoopMode, MemoryType, Stmt, StmtNode};
use crate::symbol::{NodeContext, SymbolId};

struct Printer<'a> {
    out: String,
    ctx: Option<&'a NodeContext>,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn new(ctx: Option<&'a NodeContext>) -> Self {
        Self { out: String::new(), ctx, indent: 0 }
    }

    fn sym(&mut self, sym: SymbolId) {
        match self.ctx {
            Some(ctx) => {
                let _ = write!(self.out, "{}", ctx.name(sym));
            }
            None => {
                let _ = write!(self.out, "_{sym}");
            }
        }
    }

    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn expr(&mut self, e: &Expr) {
        let Some(node) = e.node() else {
            self.out.push_str("<>");
            return;
        };
        match node {
            ExprNode::Variable(s) => self.sym(*s),
            ExprNode::Constant(c) => {
                let _ = write!(self.out, "{c}");
            }
            ExprNode::Wildcard(s) => {
                self.out.push('$');
                self.sym(*s);
            }
            ExprNode::Let { sym, value, body } => {
                self.out.push_str("let ");
                self.sym(*sym);
                self.out.push_str(" = ");
                self.expr(value);
                self.out.push_str(" in ");
                self.expr(body);
            }
            ExprNode::Add(a, b) => self.binary(a, " + ", b),
            ExprNode::Sub(a, b) => self.binary(a, " - ", b),
            ExprNode::Mul(a, b) => self.binary(a, " * ", b),
            ExprNode::Div(a, b) => self.binary(a, " / ", b),
            ExprNode::Mod(a, b) => self.binary(a, " % ", b),
            ExprNode::Min(a, b) => self.call2("min", a, b),
            ExprNode::Max(a, b) => self.call2("max", a, b),
            ExprNode::Eq(a, b) => self.binary(a, " == ", b),
            ExprNode::Ne(a, b) => self.binary(a, " != ", b),
            ExprNode::Lt(a, b) => self.binary(a, " < ", b),
            ExprNode::Le(a, b) => self.binary(a, " <= ", b),
            ExprNode::And(a, b) => self.binary(a, " && ", b),
            ExprNode::Or(a, b) => self.binary(a, " || ", b),
            ExprNode::Not(a) => {
                self.out.push('!');
                self.expr(a);
            }
            ExprNode::Select { cond, true_value, false_value } => {
                self.out.push_str("select(");
                self.expr(cond);
                self.out.push_str(", ");
                self.expr(true_value);
                self.out.push_str(", ");
                self.expr(false_value);
                self.out.push(')');
            }
            ExprNode::Call { intrinsic, args } => {
                match intrinsic {
                    Intrinsic::PositiveInfinity => {
                        self.out.push_str("oo");
                        return;
                    }
                    Intrinsic::NegativeInfinity => {
                        self.out.push_str("-oo");
                        return;
                    }
                    Intrinsic::Indeterminate => {
                        self.out.push_str("indeterminate");
                        return;
                    }
                    _ => {}
                }
                self.out.push_str(intrinsic_name(*intrinsic));
                self.out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(a);
                }
                self.out.push(')');
            }
        }
    }

    fn binary(&mut self, a: &Expr, op: &str, b: &Expr) {
        self.out.push('(');
        self.expr(a);
        self.out.push_str(op);
        self.expr(b);
        self.out.push(')');
    }

    fn call2(&mut self, name: &str, a: &Expr, b: &Expr) {
        self.out.push_str(name);
        self.out.push('(');
        self.expr(a);
        self.out.push_str(", ");
        self.expr(b);
        self.out.push(')');
    }

    fn interval(&mut self, i: &IntervalExpr) {
        self.out.push('[');
        self.expr(&i.min);
        self.out.push_str(", ");
        self.expr(&i.max);
        self.out.push(']');
    }

    fn dims(&mut self, dims: &[DimExpr]) {
        self.out.push('{');
        for (i, d) in dims.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.interval(&d.bounds);
            self.out.push('/');
            self.expr(&d.stride);
            self.out.push('/');
            self.expr(&d.fold_factor);
        }
        self.out.push('}');
    }

    fn syms(&mut self, syms: &[SymbolId]) {
        for (i, &s) in syms.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.sym(s);
        }
    }

    fn body(&mut self, s: &Stmt) {
        self.out.push_str(" {\n");
        self.indent += 1;
        self.stmt(s);
        self.indent -= 1;
        self.line_start();
        self.out.push_str("}\n");
    }

    fn stmt(&mut self, s: &Stmt) {
        let Some(node) = s.node() else { return };
        match node {
            StmtNode::Block(op) => {
                self.stmt(&op.a);
                self.stmt(&op.b);
                return;
            }
            _ => self.line_start(),
        }
        match node {
            StmtNode::Block(_) => unreachable!(),
            StmtNode::LetStmt(op) => {
                self.out.push_str("let ");
                self.sym(op.sym);
                self.out.push_str(" = ");
                self.expr(&op.value);
                self.body(&op.body);
            }
            StmtNode::Loop(op) => {
                let mode = match op.mode {
                    LoopMode::Serial => "loop",
                    LoopMode::Parallel => "parallel loop",
                };
                self.out.push_str(mode);
                self.out.push(' ');
                self.sym(op.sym);
                self.out.push_str(" in ");
                self.interval(&op.bounds);
                self.out.push_str(" step ");
                self.expr(&op.step);
                self.body(&op.body);
            }
            StmtNode::IfThenElse(op) => {
                self.out.push_str("if ");
                self.expr(&op.condition);
                self.body(&op.then_body);
                if op.else_body.defined() {
                    self.line_start();
                    self.out.push_str("else");
                    self.body(&op.else_body);
                }
            }
            StmtNode::CallStmt(op) => {
                match &op.target {
                    CallTarget::Callback(_) => self.out.push_str("call("),
                    CallTarget::Copy { .. } => self.out.push_str("call_copy("),
                }
                self.out.push('{');
                self.syms(&op.inputs);
                self.out.push_str("}, {");
                self.syms(&op.outputs);
                self.out.push_str("})\n");
            }
            StmtNode::CopyStmt(op) => {
                self.out.push_str("copy(");
                self.sym(op.src);
                self.out.push_str(" at (");
                for (i, e) in op.src_x.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(e);
                }
                self.out.push_str(") -> ");
                self.sym(op.dst);
                self.out.push_str(")\n");
            }
            StmtNode::Allocate(op) => {
                let storage = match op.storage {
                    MemoryType::Stack => "stack",
                    MemoryType::Heap => "heap",
                };
                self.out.push_str(storage);
                self.out.push_str(" allocate ");
                self.sym(op.sym);
                let _ = write!(self.out, " : {} * ", op.elem_size);
                self.dims(&op.dims);
                self.body(&op.body);
            }
            StmtNode::MakeBuffer(op) => {
                self.out.push_str("make_buffer ");
                self.sym(op.sym);
                self.out.push_str(" at ");
                self.expr(&op.base);
                self.out.push_str(" : ");
                self.expr(&op.elem_size);
                self.out.push_str(" * ");
                self.dims(&op.dims);
                self.body(&op.body);
            }
            StmtNode::CropBuffer(op) => {
                self.out.push_str("crop ");
                self.sym(op.sym);
                self.out.push_str(" to ");
                for (i, b) in op.bounds.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(" x ");
                    }
                    self.interval(b);
                }
                self.body(&op.body);
            }
            StmtNode::CropDim(op) => {
                self.out.push_str("crop ");
                self.sym(op.sym);
                let _ = write!(self.out, " dim {} to ", op.dim);
                self.interval(&op.bounds);
                self.body(&op.body);
            }
            StmtNode::SliceBuffer(op) => {
                self.out.push_str("slice ");
                self.sym(op.sym);
                self.out.push_str(" at (");
                for (i, e) in op.at.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(e);
                }
                self.out.push(')');
                self.body(&op.body);
            }
            StmtNode::SliceDim(op) => {
                self.out.push_str("slice ");
                self.sym(op.sym);
                let _ = write!(self.out, " dim {} at ", op.dim);
                self.expr(&op.at);
                self.body(&op.body);
            }
            StmtNode::TruncateRank(op) => {
                self.out.push_str("truncate ");
                self.sym(op.sym);
                let _ = write!(self.out, " to rank {}", op.rank);
                self.body(&op.body);
            }
            StmtNode::Check(op) => {
                self.out.push_str("check ");
                self.expr(&op.condition);
                self.out.push('\n');
            }
        }
    }
}

fn intrinsic_name(i: Intrinsic) -> &'static str {
    match i {
        Intrinsic::PositiveInfinity => "oo",
        Intrinsic::NegativeInfinity => "-oo",
        Intrinsic::Indeterminate => "indeterminate",
        Intrinsic::Abs => "abs",
        Intrinsic::BufferRank => "buffer_rank",
        Intrinsic::BufferBase => "buffer_base",
        Intrinsic::BufferElemSize => "buffer_elem_size",
        Intrinsic::BufferSizeBytes => "buffer_size_bytes",
        Intrinsic::BufferMin => "buffer_min",
        Intrinsic::BufferMax => "buffer_max",
        Intrinsic::BufferStride => "buffer_stride",
        Intrinsic::BufferFoldFactor => "buffer_fold_factor",
        Intrinsic::BufferExtent => "buffer_extent",
        Intrinsic::BufferAt => "buffer_at",
    }
}

pub fn print_expr(e: &Expr, ctx: &NodeContext) -> String {
    let mut p = Printer::new(Some(ctx));
    p.expr(e);
    p.out
}

pub fn print_stmt(s: &Stmt, ctx: &NodeContext) -> String {
    let mut p = Printer::new(Some(ctx));
    p.stmt(s);
    p.out
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut p = Printer::new(None);
        p.expr(self);
        f.write_str(&p.out)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut p = Printer::new(None);
        p.stmt(self);
        f.write_str(&p.out)
    }
}
