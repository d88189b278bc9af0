//! Recursive-descent parser for Millie source text.
//!
//! Implements the grammar:
//!
//! ```text
//! expr        := let ['rec'] IDENT '=' expr 'in' expr
//!              | 'if' expr 'then' expr 'else' expr
//!              | 'fn' IDENT '=>' expr
//!              | comparison
//! comparison  := term ('=' term)*
//! term        := factor (('+'|'-') factor)*
//! factor      := unary (('*'|'/') unary)*
//! unary       := ('+'|'-') unary | application
//! application := primary primary*
//! primary     := IDENT | INT | 'true' | 'false' | '(' expr (',' expr)* ')'
//! ```
//!
//! Grounded in the teacher's single hand-rolled-descent structure (one
//! function per grammar level, `peek`/`bump` on a token cursor) rather than
//! the teacher's pest-grammar-file variant, since this surface is small and
//! fixed. After a syntax error the parser discards tokens until it has
//! consumed four subsequently-valid ones before reporting another, to keep
//! cascades short (spec.md §7).

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::diagnostics::Diagnostics;
use crate::lexer::{MillieTokens, TokenKind};
use crate::symbol::SymbolTable;

const RESYNC_THRESHOLD: u32 = 4;

struct Parser<'a> {
    tokens: &'a MillieTokens,
    symbols: &'a mut SymbolTable,
    diagnostics: &'a mut Diagnostics,
    pos: usize,
    /// Valid tokens consumed since the last syntax error; suppresses
    /// cascading diagnostics until it reaches [`RESYNC_THRESHOLD`].
    resync_budget: u32,
}

impl<'a> Parser<'a> {
    fn kind(&self) -> &TokenKind {
        &self.tokens.get(self.pos).kind
    }

    fn bump(&mut self) -> usize {
        let here = self.pos;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        self.resync_budget = self.resync_budget.saturating_add(1);
        here
    }

    fn error_expr(&mut self, message: &str) -> Expr {
        let start = self.pos;
        if self.resync_budget >= RESYNC_THRESHOLD {
            let (s, e) = self.tokens.byte_range(self.pos, self.pos);
            self.diagnostics.report(s, e, message.to_owned());
        }
        self.resync_budget = 0;
        // Always make forward progress so a stray token can't loop forever.
        if !matches!(self.kind(), TokenKind::Eof) {
            self.bump();
        }
        Expr::new(ExprKind::Error, start, start)
    }

    fn expect(&mut self, expected: &TokenKind, message: &str) -> Option<usize> {
        if std::mem::discriminant(self.kind()) == std::mem::discriminant(expected) {
            Some(self.bump())
        } else {
            self.error_expr(message);
            None
        }
    }

    fn parse_expr(&mut self) -> Expr {
        match self.kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::If => self.parse_if(),
            TokenKind::Fn => self.parse_lambda(),
            _ => self.parse_comparison(),
        }
    }

    fn parse_let(&mut self) -> Expr {
        let start = self.bump(); // 'let'
        let is_rec = matches!(self.kind(), TokenKind::Rec);
        if is_rec {
            self.bump();
        }

        let name = match self.kind().clone() {
            TokenKind::Ident(text) => {
                self.bump();
                self.symbols.intern(&text)
            }
            _ => {
                self.error_expr("expected an identifier after 'let'");
                self.symbols.intern("")
            }
        };

        self.expect(&TokenKind::Equals, "expected '=' in let binding");
        let value = self.parse_expr();
        self.expect(&TokenKind::In, "expected 'in' after let binding");
        let body = self.parse_expr();
        let end = body.end_token;

        let kind = if is_rec {
            ExprKind::LetRec {
                name,
                value: Box::new(value),
                body: Box::new(body),
            }
        } else {
            ExprKind::Let {
                name,
                value: Box::new(value),
                body: Box::new(body),
            }
        };
        Expr::new(kind, start, end)
    }

    fn parse_if(&mut self) -> Expr {
        let start = self.bump(); // 'if'
        let test = self.parse_expr();
        self.expect(&TokenKind::Then, "expected 'then' after if condition");
        let then_branch = self.parse_expr();
        self.expect(&TokenKind::Else, "expected 'else' after then branch");
        let else_branch = self.parse_expr();
        let end = else_branch.end_token;
        Expr::new(
            ExprKind::If {
                test: Box::new(test),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            start,
            end,
        )
    }

    fn parse_lambda(&mut self) -> Expr {
        let start = self.bump(); // 'fn'
        let param = match self.kind().clone() {
            TokenKind::Ident(text) => {
                self.bump();
                self.symbols.intern(&text)
            }
            _ => {
                self.error_expr("expected a parameter name after 'fn'");
                self.symbols.intern("")
            }
        };
        self.expect(&TokenKind::Arrow, "expected '=>' after lambda parameter");
        let body = self.parse_expr();
        let end = body.end_token;
        Expr::new(
            ExprKind::Lambda {
                param,
                body: Box::new(body),
            },
            start,
            end,
        )
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_term();
        while matches!(self.kind(), TokenKind::Equals) {
            self.bump();
            let right = self.parse_term();
            let start = left.start_token;
            let end = right.end_token;
            left = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Eq,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start,
                end,
            );
        }
        left
    }

    fn parse_term(&mut self) -> Expr {
        let mut left = self.parse_factor();
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_factor();
            let start = left.start_token;
            let end = right.end_token;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start,
                end,
            );
        }
        left
    }

    fn parse_factor(&mut self) -> Expr {
        let mut left = self.parse_unary();
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary();
            let start = left.start_token;
            let end = right.end_token;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start,
                end,
            );
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        let op = match self.kind() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                let start = self.bump();
                let arg = self.parse_unary();
                let end = arg.end_token;
                Expr::new(ExprKind::Unary { op, arg: Box::new(arg) }, start, end)
            }
            None => self.parse_application(),
        }
    }

    fn starts_primary(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
        )
    }

    fn parse_application(&mut self) -> Expr {
        let mut func = self.parse_primary();
        while Self::starts_primary(self.kind()) {
            let arg = self.parse_primary();
            let start = func.start_token;
            let end = arg.end_token;
            func = Expr::new(
                ExprKind::Apply {
                    func: Box::new(func),
                    arg: Box::new(arg),
                },
                start,
                end,
            );
        }
        func
    }

    fn parse_primary(&mut self) -> Expr {
        let start = self.pos;
        match self.kind().clone() {
            TokenKind::Ident(text) => {
                self.bump();
                let sym = self.symbols.intern(&text);
                Expr::new(ExprKind::Identifier { sym }, start, start)
            }
            TokenKind::Int(value) => {
                self.bump();
                Expr::new(ExprKind::Int { value }, start, start)
            }
            TokenKind::True => {
                self.bump();
                Expr::new(ExprKind::True, start, start)
            }
            TokenKind::False => {
                self.bump();
                Expr::new(ExprKind::False, start, start)
            }
            TokenKind::LParen => {
                self.bump();
                let mut elements = vec![self.parse_expr()];
                while matches!(self.kind(), TokenKind::Comma) {
                    self.bump();
                    elements.push(self.parse_expr());
                }
                let close = self.expect(&TokenKind::RParen, "expected ')'").unwrap_or(self.pos);

                if elements.len() == 1 {
                    let mut only = elements.pop().unwrap();
                    only.start_token = start;
                    only.end_token = close;
                    only
                } else {
                    let length = elements.len();
                    let last = elements.pop().unwrap();
                    let mut tail = Expr::new(
                        ExprKind::TupleFinal {
                            first: Box::new(last),
                        },
                        start,
                        close,
                    );
                    while elements.len() > 1 {
                        let next = elements.pop().unwrap();
                        tail = Expr::new(
                            ExprKind::Tuple {
                                first: Box::new(next),
                                rest: Box::new(tail),
                                length,
                            },
                            start,
                            close,
                        );
                    }
                    let first = elements.pop().unwrap();
                    Expr::new(
                        ExprKind::Tuple {
                            first: Box::new(first),
                            rest: Box::new(tail),
                            length,
                        },
                        start,
                        close,
                    )
                }
            }
            _ => self.error_expr("expected an expression"),
        }
    }
}

/// Parses the full token stream into one expression. Interns every
/// identifier it sees via `symbols`, and reports syntax errors (coalesced
/// via a resync counter) to `diagnostics`.
pub fn parse(tokens: &MillieTokens, symbols: &mut SymbolTable, diagnostics: &mut Diagnostics) -> Expr {
    let mut parser = Parser {
        tokens,
        symbols,
        diagnostics,
        pos: 0,
        resync_budget: RESYNC_THRESHOLD,
    };
    let expr = parser.parse_expr();
    if !matches!(parser.kind(), TokenKind::Eof) {
        parser.error_expr("expected end of input");
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> (Expr, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = lex(source, &mut diagnostics);
        let mut symbols = SymbolTable::new();
        let expr = parse(&tokens, &mut symbols, &mut diagnostics);
        (expr, diagnostics)
    }

    #[test]
    fn parses_simple_let() {
        let (expr, diagnostics) = parse_source("let x = 3 in x + 4");
        assert!(!diagnostics.has_errors());
        assert!(matches!(expr.kind, ExprKind::Let { .. }));
    }

    #[test]
    fn parses_let_rec() {
        let (expr, diagnostics) = parse_source("let rec f = fn x => x in f");
        assert!(!diagnostics.has_errors());
        assert!(matches!(expr.kind, ExprKind::LetRec { .. }));
    }

    #[test]
    fn application_is_left_associative() {
        let (expr, diagnostics) = parse_source("f x y");
        assert!(!diagnostics.has_errors());
        match expr.kind {
            ExprKind::Apply { func, .. } => {
                assert!(matches!(func.kind, ExprKind::Apply { .. }));
            }
            other => panic!("expected Apply, got {other:?}"),
        }
    }

    #[test]
    fn single_parenthesized_expr_is_not_a_tuple() {
        let (expr, diagnostics) = parse_source("(1 + 2)");
        assert!(!diagnostics.has_errors());
        assert!(matches!(expr.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn comma_list_builds_tuple_chain() {
        let (expr, diagnostics) = parse_source("(1, true, 2)");
        assert!(!diagnostics.has_errors());
        match expr.kind {
            ExprKind::Tuple { length, rest, .. } => {
                assert_eq!(length, 3);
                assert!(matches!(rest.kind, ExprKind::Tuple { .. }));
            }
            other => panic!("expected Tuple, got {other:?}"),
        }
    }

    #[test]
    fn missing_closing_paren_is_reported() {
        let (_expr, diagnostics) = parse_source("(1 + 2");
        assert!(diagnostics.has_errors());
    }
}
