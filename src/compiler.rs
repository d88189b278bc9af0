//! Lowers a type-checked [`Expr`] into [`bytecode`](crate::bytecode).
//!
//! Grounded in `examples/original_source/compiler.c`: a monotonic
//! per-function register allocator (no register is ever reused), a
//! lexical binding stack searched innermost-out, and closures built in the
//! *outer* function's code once the inner function body has finished
//! compiling. Free variables referenced from a nested lambda are resolved
//! by walking outward through the enclosing functions and recorded as
//! captures, propagating through as many enclosing levels as necessary —
//! the same recursive capture-propagation `_CompileIdentifierImpl` does,
//! expressed here as an explicit frame stack instead of a parent pointer
//! chain.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::bytecode::{ClosureDescriptor, CompiledFunction, Module, OpCode};
use crate::diagnostics::Diagnostics;
use crate::lexer::MillieTokens;
use crate::symbol::Symbol;

struct Frame {
    code: Vec<u8>,
    next_register: u8,
    /// `(name, register)`, innermost binding last; `let`/`let rec` push and
    /// truncate this like a stack, matching `_PushBinding`/`_PopBinding`.
    bindings: Vec<(Symbol, u8)>,
    /// Free variables captured from an enclosing function, in allocation
    /// order; `closure[i+1]` holds `captures[i]` at runtime.
    captures: Vec<Symbol>,
}

impl Frame {
    fn new() -> Self {
        Frame {
            code: Vec::new(),
            next_register: 2, // r0 = closure, r1 = argument
            bindings: Vec::new(),
            captures: Vec::new(),
        }
    }

    fn alloc_register(&mut self) -> u8 {
        let reg = self.next_register;
        self.next_register = self
            .next_register
            .checked_add(1)
            .expect("register allocator overflowed a function's register file");
        reg
    }
}

struct Compiler<'a> {
    module: Module,
    frames: Vec<Frame>,
    tokens: &'a MillieTokens,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Compiler<'a> {
    fn current(&self) -> usize {
        self.frames.len() - 1
    }

    fn emit_u8(&mut self, frame: usize, v: u8) {
        self.frames[frame].code.push(v);
    }

    fn emit_u16(&mut self, frame: usize, v: u16) {
        self.frames[frame].code.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_u32(&mut self, frame: usize, v: u32) {
        self.frames[frame].code.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_u64(&mut self, frame: usize, v: u64) {
        self.frames[frame].code.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_op(&mut self, frame: usize, op: OpCode) {
        self.emit_u8(frame, op as u8);
    }

    fn emit_hole(&mut self, frame: usize) -> usize {
        let pos = self.frames[frame].code.len();
        self.emit_u16(frame, 0);
        pos
    }

    fn patch_hole(&mut self, frame: usize, hole_pos: usize, target_pos: usize) {
        let offset = target_pos as i32 - hole_pos as i32 - 2;
        let offset: i16 = offset
            .try_into()
            .expect("jump target out of range of a 16-bit relative offset");
        self.frames[frame].code[hole_pos..hole_pos + 2].copy_from_slice(&offset.to_le_bytes());
    }

    fn report(&mut self, expr: &Expr, message: &str) {
        let (start, end) = self.tokens.byte_range(expr.start_token, expr.end_token);
        self.diagnostics.report(start, end, message.to_owned());
    }

    /// Resolve `sym` to a register holding its value in the current frame,
    /// capturing it from an enclosing frame (recursively) if needed.
    fn resolve(&mut self, sym: Symbol) -> u8 {
        self.resolve_at(sym, self.current())
    }

    fn resolve_at(&mut self, sym: Symbol, frame_idx: usize) -> u8 {
        if let Some(&(_, reg)) = self.frames[frame_idx].bindings.iter().rev().find(|(s, _)| *s == sym) {
            return reg;
        }
        if let Some(capture_idx) = self.frames[frame_idx].captures.iter().position(|s| *s == sym) {
            return self.emit_load_capture(frame_idx, capture_idx);
        }
        if frame_idx == 0 {
            panic!("unresolved free variable escaped type checking: {sym}");
        }
        // Make sure an ancestor can supply it; this may itself add `sym` as
        // a capture of an intermediate frame.
        self.resolve_at(sym, frame_idx - 1);
        let capture_idx = self.frames[frame_idx].captures.len();
        self.frames[frame_idx].captures.push(sym);
        self.emit_load_capture(frame_idx, capture_idx)
    }

    fn emit_load_capture(&mut self, frame_idx: usize, capture_idx: usize) -> u8 {
        let dst = self.frames[frame_idx].alloc_register();
        self.emit_op(frame_idx, OpCode::LoadA64);
        self.emit_u8(frame_idx, 0); // r0 always holds this function's own closure
        self.emit_u8(frame_idx, (capture_idx + 1) as u8);
        self.emit_u8(frame_idx, dst);
        dst
    }

    fn compile_int_literal(&mut self, value: u64) -> u8 {
        let frame = self.current();
        let dst = self.frames[frame].alloc_register();
        if let Ok(v) = u8::try_from(value) {
            self.emit_op(frame, OpCode::LoadI8);
            self.emit_u8(frame, v);
        } else if let Ok(v) = u16::try_from(value) {
            self.emit_op(frame, OpCode::LoadI16);
            self.emit_u16(frame, v);
        } else if let Ok(v) = u32::try_from(value) {
            self.emit_op(frame, OpCode::LoadI32);
            self.emit_u32(frame, v);
        } else {
            self.emit_op(frame, OpCode::LoadI64);
            self.emit_u64(frame, value);
        }
        self.emit_u8(frame, dst);
        dst
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> u8 {
        let rl = self.compile_expr(left);
        let rr = self.compile_expr(right);
        let frame = self.current();
        let dst = self.frames[frame].alloc_register();
        let opcode = match op {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Eq => OpCode::Eq,
        };
        self.emit_op(frame, opcode);
        self.emit_u8(frame, rl);
        self.emit_u8(frame, rr);
        self.emit_u8(frame, dst);
        dst
    }

    fn compile_unary(&mut self, op: UnaryOp, arg: &Expr, expr: &Expr) -> u8 {
        let rarg = self.compile_expr(arg);
        match op {
            UnaryOp::Neg => {
                let frame = self.current();
                let dst = self.frames[frame].alloc_register();
                self.emit_op(frame, OpCode::Neg);
                self.emit_u8(frame, rarg);
                self.emit_u8(frame, dst);
                dst
            }
            UnaryOp::Plus => {
                self.report(expr, "unsupported unary operator '+'");
                rarg
            }
        }
    }

    fn compile_if(&mut self, test: &Expr, then_branch: &Expr, else_branch: &Expr) -> u8 {
        let rtest = self.compile_expr(test);
        let frame = self.current();
        let result = self.frames[frame].alloc_register();

        self.emit_op(frame, OpCode::Jz);
        self.emit_u8(frame, rtest);
        let else_hole = self.emit_hole(frame);

        let rthen = self.compile_expr(then_branch);
        let frame = self.current();
        self.emit_op(frame, OpCode::Mov);
        self.emit_u8(frame, rthen);
        self.emit_u8(frame, result);
        self.emit_op(frame, OpCode::Jmp);
        let end_hole = self.emit_hole(frame);

        let else_start = self.frames[frame].code.len();
        self.patch_hole(frame, else_hole, else_start);

        let relse = self.compile_expr(else_branch);
        let frame = self.current();
        self.emit_op(frame, OpCode::Mov);
        self.emit_u8(frame, relse);
        self.emit_u8(frame, result);

        let end = self.frames[frame].code.len();
        self.patch_hole(frame, end_hole, end);

        result
    }

    fn compile_let(&mut self, name: Symbol, value: &Expr, body: &Expr) -> u8 {
        let rvalue = self.compile_expr(value);
        let frame = self.current();
        let saved_len = self.frames[frame].bindings.len();
        self.frames[frame].bindings.push((name, rvalue));
        let result = self.compile_expr(body);
        let frame = self.current();
        self.frames[frame].bindings.truncate(saved_len);
        result
    }

    fn compile_let_rec(&mut self, name: Symbol, value: &Expr, body: &Expr, whole: &Expr) -> u8 {
        let ExprKind::Lambda { param, body: lambda_body } = &value.kind else {
            self.report(whole, "unsupported form: 'let rec' requires a lambda");
            return self.compile_int_literal(0);
        };

        let dst = self.compile_lambda(*param, lambda_body, Some(name));

        let frame = self.current();
        let saved_len = self.frames[frame].bindings.len();
        self.frames[frame].bindings.push((name, dst));
        let result = self.compile_expr(body);
        let frame = self.current();
        self.frames[frame].bindings.truncate(saved_len);
        result
    }

    /// Compiles `body` as a new function with parameter `param`, then emits
    /// the code in the (now-current) outer frame that constructs its
    /// closure value in a fresh register. Returns that register.
    ///
    /// `self_name`, for `let rec`, binds the function's own name to `r0`
    /// inside the callee's frame, so a self-reference inside `body` reads
    /// back the callee's own closure value instead of being captured.
    fn compile_lambda(&mut self, param: Symbol, body: &Expr, self_name: Option<Symbol>) -> u8 {
        let mut child = Frame::new();
        child.bindings.push((param, 1));
        if let Some(name) = self_name {
            child.bindings.push((name, 0));
        }
        self.frames.push(child);

        let result_reg = self.compile_expr(body);
        let child_frame = self.current();
        self.emit_op(child_frame, OpCode::Ret);
        self.emit_u8(child_frame, result_reg);

        let finished = self.frames.pop().expect("lambda frame was just pushed");
        let captures = finished.captures;
        let descriptor = if captures.is_empty() {
            ClosureDescriptor::Static
        } else {
            ClosureDescriptor::Dynamic(captures.clone())
        };
        let function_id = self.module.add_function(CompiledFunction {
            code: finished.code,
            register_count: finished.next_register as u32,
            closure: descriptor,
        });

        let outer = self.current();
        let dst = self.frames[outer].alloc_register();

        if captures.is_empty() {
            self.emit_op(outer, OpCode::LoadStaticClosure);
            self.emit_u32(outer, function_id);
            self.emit_u8(outer, dst);
        } else {
            self.emit_op(outer, OpCode::NewClosure);
            self.emit_u64(outer, function_id as u64);
            self.emit_u8(outer, captures.len() as u8);
            self.emit_u8(outer, dst);
            for (i, sym) in captures.iter().enumerate() {
                let src = self.resolve_at(*sym, outer);
                let outer = self.current();
                self.emit_op(outer, OpCode::StoreA64);
                self.emit_u8(outer, dst);
                self.emit_u8(outer, (i + 1) as u8);
                self.emit_u8(outer, src);
            }
        }
        dst
    }

    fn compile_apply(&mut self, func: &Expr, arg: &Expr) -> u8 {
        let rfunc = self.compile_expr(func);
        let rarg = self.compile_expr(arg);
        let frame = self.current();
        let dst = self.frames[frame].alloc_register();
        self.emit_op(frame, OpCode::Call);
        self.emit_u8(frame, rfunc);
        self.emit_u8(frame, rarg);
        self.emit_u8(frame, dst);
        dst
    }

    fn compile_expr(&mut self, expr: &Expr) -> u8 {
        match &expr.kind {
            ExprKind::Error => self.compile_int_literal(0),
            ExprKind::Int { value } => self.compile_int_literal(*value),
            ExprKind::True => self.compile_int_literal(1),
            ExprKind::False => self.compile_int_literal(0),
            ExprKind::Identifier { sym } => self.resolve(*sym),
            ExprKind::Lambda { param, body } => self.compile_lambda(*param, body, None),
            ExprKind::Apply { func, arg } => self.compile_apply(func, arg),
            ExprKind::Let { name, value, body } => self.compile_let(*name, value, body),
            ExprKind::LetRec { name, value, body } => self.compile_let_rec(*name, value, body, expr),
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => self.compile_if(test, then_branch, else_branch),
            ExprKind::Binary { op, left, right } => self.compile_binary(*op, left, right),
            ExprKind::Unary { op, arg } => self.compile_unary(*op, arg, expr),
            ExprKind::Tuple { first, rest, .. } => {
                let rfirst = self.compile_expr(first);
                let rrest = self.compile_expr(rest);
                let frame = self.current();
                let dst = self.frames[frame].alloc_register();
                self.emit_op(frame, OpCode::NewTuple);
                self.emit_u8(frame, rfirst);
                self.emit_u8(frame, rrest);
                self.emit_u8(frame, dst);
                dst
            }
            // A `TupleFinal` is the last element of a right-nested tuple
            // chain; it needs no heap cell of its own, just its value. The
            // type carried alongside it is what tells `format`/`vm` where
            // the chain ends.
            ExprKind::TupleFinal { first } => self.compile_expr(first),
        }
    }
}

/// Compiles `expr` into a [`Module`] whose function `0` is the top-level
/// program entry point, taking `(closure_word, arg_word)` per the runtime's
/// calling convention even though the top level uses neither.
pub fn compile(expr: &Expr, tokens: &MillieTokens, diagnostics: &mut Diagnostics) -> Module {
    let mut module = Module::new();
    module.add_function(CompiledFunction {
        code: Vec::new(),
        register_count: 2,
        closure: ClosureDescriptor::Static,
    });

    let mut compiler = Compiler {
        module,
        frames: vec![Frame::new()],
        tokens,
        diagnostics,
    };

    let result_reg = compiler.compile_expr(expr);
    let frame = compiler.current();
    compiler.emit_op(frame, OpCode::Ret);
    compiler.emit_u8(frame, result_reg);

    let top = compiler.frames.pop().expect("top-level frame was just pushed");
    compiler.module.functions[0] = CompiledFunction {
        code: top.code,
        register_count: top.next_register as u32,
        closure: ClosureDescriptor::Static,
    };

    compiler.module
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::symbol::SymbolTable;

    fn compile_source(source: &str) -> Module {
        let mut diagnostics = Diagnostics::new();
        let tokens = lex(source, &mut diagnostics);
        let mut symbols = SymbolTable::new();
        let expr = parse(&tokens, &mut symbols, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.reports());
        compile(&expr, &tokens, &mut diagnostics)
    }

    #[test]
    fn top_level_is_function_zero() {
        let module = compile_source("1 + 2");
        assert!(!module.functions.is_empty());
        assert!(!module.functions[0].code.is_empty());
    }

    #[test]
    fn zero_capture_lambda_is_static() {
        let module = compile_source("let f = fn x => x + 1 in f 41");
        let lambda = &module.functions[1];
        assert_eq!(lambda.closure, ClosureDescriptor::Static);
    }

    #[test]
    fn capturing_lambda_is_dynamic() {
        let module = compile_source("let x = 10 in let f = fn y => x + y in f 1");
        let lambda = &module.functions[1];
        assert!(matches!(lambda.closure, ClosureDescriptor::Dynamic(_)));
    }

    #[test]
    fn self_recursive_let_rec_does_not_capture_its_own_name() {
        let module = compile_source(
            "let rec fact = fn n => if n = 0 then 1 else n * (fact (n - 1)) in fact 5",
        );
        let lambda = &module.functions[1];
        assert_eq!(lambda.closure, ClosureDescriptor::Static);
    }

    #[test]
    fn let_rec_with_non_lambda_is_a_compile_error() {
        let mut diagnostics = Diagnostics::new();
        let source = "let rec x = 5 in x";
        let tokens = lex(source, &mut diagnostics);
        let mut symbols = SymbolTable::new();
        let expr = parse(&tokens, &mut symbols, &mut diagnostics);
        compile(&expr, &tokens, &mut diagnostics);
        assert!(diagnostics.has_errors());
    }
}
