//! Renders inferred types and runtime values as the strings the CLI prints.
//!
//! The value formatter needs the *type* alongside the raw `u64` word: the
//! runtime has no tags, so whether a word is an integer, a boolean, a
//! closure handle, or a tuple handle is only known from the type that was
//! inferred for the expression that produced it.

use std::collections::HashMap;

use crate::types::{TypeArena, TypeId, TypeKind};
use crate::vm::Vm;

/// Formats a (possibly generic) type as e.g. `int`, `bool`, `( int -> int )`,
/// `( int * bool )`, assigning fresh names `'A, 'B, ...` to generic
/// variables in first-occurrence order.
pub fn format_type(arena: &TypeArena, ty: TypeId) -> String {
    let mut names = HashMap::new();
    format_impl(arena, ty, &mut names)
}

fn next_generic_name(names: &mut HashMap<TypeId, String>) -> String {
    let index = names.len();
    let letter = (b'A' + (index % 26) as u8) as char;
    let suffix = index / 26;
    if suffix == 0 {
        format!("'{letter}")
    } else {
        format!("'{letter}{suffix}")
    }
}

fn format_impl(arena: &TypeArena, ty: TypeId, names: &mut HashMap<TypeId, String>) -> String {
    let pruned = arena.prune(ty);
    match arena.kind(pruned) {
        TypeKind::Error => "<error>".to_owned(),
        TypeKind::Int => "int".to_owned(),
        TypeKind::Bool => "bool".to_owned(),
        TypeKind::Var { .. } | TypeKind::GenericVar => {
            if let Some(existing) = names.get(&pruned) {
                existing.clone()
            } else {
                let name = next_generic_name(names);
                names.insert(pruned, name.clone());
                name
            }
        }
        TypeKind::Func { from, to } => {
            format!("( {} -> {} )", format_impl(arena, *from, names), format_impl(arena, *to, names))
        }
        TypeKind::Tuple { first, rest } => {
            let mut parts = vec![format_impl(arena, *first, names)];
            collect_tuple_tail(arena, *rest, names, &mut parts);
            format!("( {} )", parts.join(" * "))
        }
        TypeKind::TupleFinal { first } => format!("( {} )", format_impl(arena, *first, names)),
    }
}

fn collect_tuple_tail(arena: &TypeArena, ty: TypeId, names: &mut HashMap<TypeId, String>, parts: &mut Vec<String>) {
    let pruned = arena.prune(ty);
    match arena.kind(pruned) {
        TypeKind::Tuple { first, rest } => {
            parts.push(format_impl(arena, *first, names));
            collect_tuple_tail(arena, *rest, names, parts);
        }
        TypeKind::TupleFinal { first } => parts.push(format_impl(arena, *first, names)),
        _ => parts.push(format_impl(arena, pruned, names)),
    }
}

/// Formats `value`, a runtime word produced by evaluating an expression of
/// type `ty`, recursing into tuple cells via `vm` as the type demands.
pub fn format_value(arena: &TypeArena, ty: TypeId, value: u64, vm: &Vm) -> String {
    let pruned = arena.prune(ty);
    match arena.kind(pruned) {
        TypeKind::Error => "<error>".to_owned(),
        TypeKind::Int => (value as i64).to_string(),
        TypeKind::Bool => (value != 0).to_string(),
        TypeKind::Var { .. } | TypeKind::GenericVar => value.to_string(),
        TypeKind::Func { .. } => "A FUNCTION".to_owned(),
        TypeKind::Tuple { first, rest } => {
            let (head, tail) = vm.read_tuple(value);
            let mut parts = vec![format_value(arena, *first, head, vm)];
            collect_tuple_value_tail(arena, *rest, tail, vm, &mut parts);
            format!("({})", parts.join(", "))
        }
        TypeKind::TupleFinal { first } => format!("({})", format_value(arena, *first, value, vm)),
    }
}

fn collect_tuple_value_tail(
    arena: &TypeArena,
    ty: TypeId,
    value: u64,
    vm: &Vm,
    parts: &mut Vec<String>,
) {
    let pruned = arena.prune(ty);
    match arena.kind(pruned) {
        TypeKind::Tuple { first, rest } => {
            let (head, tail) = vm.read_tuple(value);
            parts.push(format_value(arena, *first, head, vm));
            collect_tuple_value_tail(arena, *rest, tail, vm, parts);
        }
        TypeKind::TupleFinal { first } => parts.push(format_value(arena, *first, value, vm)),
        _ => parts.push(format_value(arena, pruned, value, vm)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::diagnostics::Diagnostics;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::symbol::SymbolTable;
    use crate::typechecker::analyze;

    fn run_and_format(source: &str) -> (String, String) {
        let mut diagnostics = Diagnostics::new();
        let tokens = lex(source, &mut diagnostics);
        let mut symbols = SymbolTable::new();
        let expr = parse(&tokens, &mut symbols, &mut diagnostics);
        let mut arena = TypeArena::new();
        let ty = analyze(&expr, &mut arena, &tokens, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.reports());
        let module = compile(&expr, &tokens, &mut diagnostics);
        let mut vm = Vm::new(&module);
        let value = vm.call(0, 0, 0);
        (format_type(&arena, ty), format_value(&arena, ty, value, &vm))
    }

    #[test]
    fn formats_an_integer() {
        let (ty, value) = run_and_format("let x = 3 in x + 4");
        assert_eq!(ty, "int");
        assert_eq!(value, "7");
    }

    #[test]
    fn formats_a_function_value() {
        let (ty, value) = run_and_format("fn x => x");
        assert_eq!(ty, "( 'A -> 'A )");
        assert_eq!(value, "A FUNCTION");
    }

    #[test]
    fn formats_a_polymorphic_tuple() {
        let (ty, value) = run_and_format("let id = fn x => x in (id 1, id true)");
        assert_eq!(ty, "( int * bool )");
        assert_eq!(value, "(1, true)");
    }
}
