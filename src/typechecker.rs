//! Algorithm W: Hindley-Milner type inference with let-polymorphism.
//!
//! Grounded in `examples/original_source/typecheck.c`'s `Analyze` — the
//! dispatch below mirrors its per-expression-form switch, including the
//! `LetRec` trick of unifying a fresh variable against the right-hand side
//! before generalizing it. The binding environment is a scope stack in the
//! style of the teacher's `src/typechecker/scope.rs`, rather than the
//! original's singly-linked `TypeEnvironment` list, since Rust's `HashMap`
//! stack gives the same shadowing behavior without manual list splicing.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, ExprKind};
use crate::diagnostics::Diagnostics;
use crate::format;
use crate::lexer::MillieTokens;
use crate::symbol::Symbol;
use crate::types::{NonGenericSet, TypeArena, TypeId};

/// Which inference rule rejected a program, for diagnostic messages.
#[derive(Debug, Clone, Copy)]
enum UnifyRule {
    InvalidApply,
    IfCondition,
    IfBranches,
    BinaryOperator,
    UnaryOperator,
}

impl UnifyRule {
    /// Formats the rule's message naming the two types that failed to
    /// unify, `a` and `b`, as they stood before unification touched them.
    fn message(self, a: &str, b: &str) -> String {
        match self {
            UnifyRule::InvalidApply => {
                format!("function applied to an argument of the wrong type: expected {b}, found {a}")
            }
            UnifyRule::IfCondition => format!("if condition must be bool, found {a}"),
            UnifyRule::IfBranches => format!("if branches have different types: {a} and {b}"),
            UnifyRule::BinaryOperator => {
                format!("operand has the wrong type for this operator: expected {b}, found {a}")
            }
            UnifyRule::UnaryOperator => {
                format!("operand has the wrong type for this unary operator: expected {b}, found {a}")
            }
        }
    }
}

/// A chain of scopes mapping identifiers to their (possibly generic) type.
/// Lookup instantiates a fresh copy of whatever generic variables the bound
/// type contains, exactly as `_LookupType` does in the original.
struct Environment {
    scopes: Vec<HashMap<Symbol, TypeId>>,
}

impl Environment {
    fn new() -> Self {
        Environment {
            scopes: vec![HashMap::new()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: Symbol, ty: TypeId) {
        self.scopes
            .last_mut()
            .expect("environment always has at least one scope")
            .insert(name, ty);
    }

    fn lookup(&self, name: Symbol) -> Option<TypeId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }
}

/// Infers the type of `expr`, reporting every violated rule to
/// `diagnostics` and returning the arena's `error` type wherever a rule
/// fails, so that analysis of the rest of the tree can continue.
pub fn analyze(
    expr: &Expr,
    arena: &mut TypeArena,
    tokens: &MillieTokens,
    diagnostics: &mut Diagnostics,
) -> TypeId {
    let mut env = Environment::new();
    analyze_impl(expr, &mut env, &NonGenericSet::new(), arena, tokens, diagnostics)
}

fn report(expr: &Expr, tokens: &MillieTokens, diagnostics: &mut Diagnostics, message: &str) {
    let (start, end) = tokens.byte_range(expr.start_token, expr.end_token);
    diagnostics.report(start, end, message.to_owned());
}

fn unify_or_report(
    arena: &mut TypeArena,
    a: TypeId,
    b: TypeId,
    expr: &Expr,
    tokens: &MillieTokens,
    diagnostics: &mut Diagnostics,
    rule: UnifyRule,
) {
    let a_name = format::format_type(arena, a);
    let b_name = format::format_type(arena, b);
    let mut failed = false;
    arena.unify(a, b, |_| failed = true);
    if failed {
        let message = rule.message(&a_name, &b_name);
        report(expr, tokens, diagnostics, &message);
    }
}

fn analyze_impl(
    expr: &Expr,
    env: &mut Environment,
    non_generic: &NonGenericSet,
    arena: &mut TypeArena,
    tokens: &MillieTokens,
    diagnostics: &mut Diagnostics,
) -> TypeId {
    match &expr.kind {
        ExprKind::Error => arena.error(),

        ExprKind::Int { .. } => arena.int(),
        ExprKind::True | ExprKind::False => arena.bool(),

        ExprKind::Identifier { sym } => match env.lookup(*sym) {
            Some(ty) => arena.instantiate(ty),
            None => {
                report(expr, tokens, diagnostics, "unbound identifier");
                arena.error()
            }
        },

        ExprKind::Lambda { param, body } => {
            let param_ty = arena.new_var();
            env.push();
            env.bind(*param, param_ty);
            let extended = non_generic.extended(param_ty);
            let body_ty = analyze_impl(body, env, &extended, arena, tokens, diagnostics);
            env.pop();
            arena.new_func(param_ty, body_ty)
        }

        ExprKind::Apply { func, arg } => {
            let func_ty = analyze_impl(func, env, non_generic, arena, tokens, diagnostics);
            let arg_ty = analyze_impl(arg, env, non_generic, arena, tokens, diagnostics);
            let result_ty = arena.new_var();
            let expected_func = arena.new_func(arg_ty, result_ty);
            unify_or_report(
                arena,
                func_ty,
                expected_func,
                expr,
                tokens,
                diagnostics,
                UnifyRule::InvalidApply,
            );
            result_ty
        }

        ExprKind::Let { name, value, body } => {
            let value_ty = analyze_impl(value, env, non_generic, arena, tokens, diagnostics);
            let generalized = arena.generalize(value_ty, non_generic);
            env.push();
            env.bind(*name, generalized);
            let body_ty = analyze_impl(body, env, non_generic, arena, tokens, diagnostics);
            env.pop();
            body_ty
        }

        ExprKind::LetRec { name, value, body } => {
            let placeholder = arena.new_var();
            env.push();
            env.bind(*name, placeholder);
            let extended = non_generic.extended(placeholder);
            let value_ty = analyze_impl(value, env, &extended, arena, tokens, diagnostics);
            let mut failed = false;
            arena.unify(placeholder, value_ty, |_| failed = true);
            if failed {
                report(expr, tokens, diagnostics, "inconsistent recursive definition");
            }
            env.pop();

            let generalized = arena.generalize(placeholder, non_generic);
            env.push();
            env.bind(*name, generalized);
            let body_ty = analyze_impl(body, env, non_generic, arena, tokens, diagnostics);
            env.pop();
            body_ty
        }

        ExprKind::If {
            test,
            then_branch,
            else_branch,
        } => {
            let test_ty = analyze_impl(test, env, non_generic, arena, tokens, diagnostics);
            unify_or_report(
                arena,
                test_ty,
                arena.bool(),
                test,
                tokens,
                diagnostics,
                UnifyRule::IfCondition,
            );
            let then_ty = analyze_impl(then_branch, env, non_generic, arena, tokens, diagnostics);
            let else_ty = analyze_impl(else_branch, env, non_generic, arena, tokens, diagnostics);
            unify_or_report(
                arena,
                then_ty,
                else_ty,
                expr,
                tokens,
                diagnostics,
                UnifyRule::IfBranches,
            );
            then_ty
        }

        ExprKind::Binary { op, left, right } => {
            let left_ty = analyze_impl(left, env, non_generic, arena, tokens, diagnostics);
            let right_ty = analyze_impl(right, env, non_generic, arena, tokens, diagnostics);
            unify_or_report(
                arena,
                left_ty,
                arena.int(),
                left,
                tokens,
                diagnostics,
                UnifyRule::BinaryOperator,
            );
            unify_or_report(
                arena,
                right_ty,
                arena.int(),
                right,
                tokens,
                diagnostics,
                UnifyRule::BinaryOperator,
            );
            match op {
                BinaryOp::Eq => arena.bool(),
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arena.int(),
            }
        }

        ExprKind::Unary { op, arg } => {
            let arg_ty = analyze_impl(arg, env, non_generic, arena, tokens, diagnostics);
            unify_or_report(
                arena,
                arg_ty,
                arena.int(),
                arg,
                tokens,
                diagnostics,
                UnifyRule::UnaryOperator,
            );
            let _ = op;
            arena.int()
        }

        ExprKind::Tuple { first, rest, .. } => {
            let first_ty = analyze_impl(first, env, non_generic, arena, tokens, diagnostics);
            let rest_ty = analyze_impl(rest, env, non_generic, arena, tokens, diagnostics);
            arena.new_tuple(first_ty, rest_ty)
        }

        ExprKind::TupleFinal { first } => {
            let first_ty = analyze_impl(first, env, non_generic, arena, tokens, diagnostics);
            arena.new_tuple_final(first_ty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::symbol::SymbolTable;

    fn infer(source: &str) -> (TypeArena, TypeId, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = lex(source, &mut diagnostics);
        let mut symbols = SymbolTable::new();
        let expr = parse(&tokens, &mut symbols, &mut diagnostics);
        let mut arena = TypeArena::new();
        let ty = analyze(&expr, &mut arena, &tokens, &mut diagnostics);
        (arena, ty, diagnostics)
    }

    #[test]
    fn literal_int_has_int_type() {
        let (arena, ty, diagnostics) = infer("3");
        assert!(!diagnostics.has_errors());
        assert_eq!(arena.prune(ty), arena.int());
    }

    #[test]
    fn identity_function_is_polymorphic() {
        let (arena, ty, diagnostics) = infer("let id = fn x => x in (id 1, id true)");
        assert!(!diagnostics.has_errors());
        let pruned = arena.prune(ty);
        match arena.kind(pruned).clone() {
            crate::types::TypeKind::Tuple { first, rest } => {
                assert_eq!(arena.prune(first), arena.int());
                match arena.kind(arena.prune(rest)).clone() {
                    crate::types::TypeKind::TupleFinal { first } => {
                        assert_eq!(arena.prune(first), arena.bool());
                    }
                    other => panic!("expected TupleFinal, got {other:?}"),
                }
            }
            other => panic!("expected Tuple, got {other:?}"),
        }
    }

    #[test]
    fn adding_a_bool_is_a_type_error() {
        let (_arena, _ty, diagnostics) = infer("1 + true");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn adding_a_bool_names_both_types_in_the_diagnostic() {
        let (_arena, _ty, diagnostics) = infer("1 + true");
        let reports = diagnostics.reports();
        assert!(reports.iter().any(|r| r.message.contains("int") && r.message.contains("bool")));
    }

    #[test]
    fn unbound_identifier_is_reported() {
        let (_arena, _ty, diagnostics) = infer("let x = 3 in y");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn let_rec_factorial_self_reference_is_consistent() {
        let (_arena, _ty, diagnostics) =
            infer("let rec fact = fn n => if n = 0 then 1 else n * (fact (n - 1)) in fact 5");
        assert!(!diagnostics.has_errors());
    }
}
