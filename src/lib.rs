//! millie: a small statically-typed, eagerly-evaluated functional
//! expression language — lexer, parser, Hindley-Milner type inferencer,
//! bytecode compiler, and register-machine runtime.

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod diagnostics;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod symbol;
pub mod typechecker;
pub mod types;
pub mod vm;

use diagnostics::Diagnostics;
use types::{TypeArena, TypeId};

/// The outcome of running the whole pipeline on one source string up to
/// (and including) type inference: either an inferred type or a set of
/// diagnostics explaining why inference failed.
pub struct TypeCheckResult {
    pub arena: TypeArena,
    pub ty: TypeId,
    pub expr: ast::Expr,
    pub tokens: lexer::MillieTokens,
    pub symbols: symbol::SymbolTable,
}

/// Lexes, parses, and type-checks `source`. Returns `Ok` even if the
/// expression's type came out as `Error`-tainted; callers should still
/// check `diagnostics.has_errors()`.
pub fn type_check(source: &str, diagnostics: &mut Diagnostics) -> TypeCheckResult {
    let tokens = lexer::lex(source, diagnostics);
    let mut symbols = symbol::SymbolTable::new();
    let expr = parser::parse(&tokens, &mut symbols, diagnostics);
    let mut arena = TypeArena::new();
    let ty = typechecker::analyze(&expr, &mut arena, &tokens, diagnostics);
    TypeCheckResult {
        arena,
        ty,
        expr,
        tokens,
        symbols,
    }
}
