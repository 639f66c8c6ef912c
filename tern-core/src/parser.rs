//! Recursive-descent parser for textual IR.
//!
//! Works on the token stream produced by `lexer::tokenize`. The grammar is
//! small enough that statements are self-delimiting: every statement starts
//! with a keyword and blocks are braced, so line breaks carry no meaning.

use crate::ast::*;
use crate::bail_parse_at;
use crate::err_parse_at;
use crate::error::Result;
use crate::lexer::{self, LocatedToken, Token};
use log::trace;

/// Parse a whole textual IR module.
pub fn parse(source: &str) -> Result<Module> {
    let tokens = lexer::tokenize(source).map_err(|(msg, span)| err_parse_at!(span, "{}", msg))?;
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<LocatedToken>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<LocatedToken>) -> Self {
        Parser { tokens, current: 0 }
    }

    /// Get the span of the current token, or of the end of input.
    fn current_span(&self) -> Span {
        match self.tokens.get(self.current) {
            Some(t) => t.span,
            None => self.previous_span(),
        }
    }

    fn previous_span(&self) -> Span {
        if self.current > 0 {
            self.tokens.get(self.current - 1).map(|t| t.span).unwrap_or(Span::new(0, 0, 0, 0))
        } else {
            Span::new(0, 0, 0, 0)
        }
    }

    /// Span from `start` to the end of the previous token.
    fn span_from(&self, start: Span) -> Span {
        let end = self.previous_span();
        Span::new(start.start_line, start.start_col, end.end_line, end.end_col)
    }

    pub fn parse(&mut self) -> Result<Module> {
        let mut items = Vec::new();
        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }
        Ok(Module { items })
    }

    fn parse_item(&mut self) -> Result<Item> {
        trace!("parse_item: next token = {:?}", self.peek());
        match self.peek() {
            Some(Token::Struct) => self.parse_struct().map(Item::Struct),
            Some(Token::Subroutine) => {
                let start = self.current_span();
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Item::Subroutine(SubroutineDecl {
                    name,
                    span: self.span_from(start),
                }))
            }
            Some(Token::Fn) => self.parse_function().map(Item::Function),
            Some(Token::Local) => {
                bail_parse_at!(self.current_span(), "'local' declarations are only allowed inside a function body")
            }
            Some(token) => match storage_keyword(token) {
                Some(storage) => self.parse_var_decl(storage).map(Item::Global),
                None => Err(err_parse_at!(
                    self.current_span(),
                    "Expected declaration, got {:?}",
                    self.peek()
                )),
            },
            None => bail_parse_at!(self.current_span(), "Expected declaration"),
        }
    }

    fn parse_struct(&mut self) -> Result<StructDecl> {
        let start = self.current_span();
        self.expect(Token::Struct)?;
        let name = self.expect_identifier()?;
        self.expect(Token::LeftBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RightBrace) {
            let field = self.expect_identifier()?;
            self.expect(Token::Colon)?;
            let ty = self.parse_type()?;
            fields.push((field, ty));
            if !self.check(&Token::RightBrace) {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::RightBrace)?;
        Ok(StructDecl {
            name,
            fields,
            span: self.span_from(start),
        })
    }

    /// `<storage> name: type`
    fn parse_var_decl(&mut self, storage: StorageKeyword) -> Result<VarDecl> {
        let start = self.current_span();
        self.advance();
        let name = self.expect_identifier()?;
        self.expect(Token::Colon)?;
        let ty = self.parse_type()?;
        Ok(VarDecl {
            storage,
            name,
            ty,
            span: self.span_from(start),
        })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl> {
        let start = self.current_span();
        self.expect(Token::Fn)?;
        let name = self.expect_identifier()?;

        self.expect(Token::LeftParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RightParen) {
            let param_start = self.current_span();
            let param = self.expect_identifier()?;
            self.expect(Token::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                name: param,
                ty,
                span: self.span_from(param_start),
            });
            if !self.check(&Token::RightParen) {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::RightParen)?;

        let return_type = if self.check(&Token::Arrow) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        let mut interfaces = Vec::new();
        if self.check(&Token::Colon) {
            self.advance();
            loop {
                let span = self.current_span();
                interfaces.push((self.expect_identifier()?, span));
                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }

        let span = self.span_from(start);
        if !self.check(&Token::LeftBrace) {
            return Ok(FunctionDecl {
                name,
                params,
                return_type,
                interfaces,
                locals: Vec::new(),
                body: None,
                span,
            });
        }

        self.expect(Token::LeftBrace)?;
        let mut locals = Vec::new();
        let mut body = Vec::new();
        while !self.check(&Token::RightBrace) {
            if self.check(&Token::Local) {
                locals.push(self.parse_var_decl(StorageKeyword::Local)?);
            } else {
                body.push(self.parse_stmt()?);
            }
        }
        self.expect(Token::RightBrace)?;

        Ok(FunctionDecl {
            name,
            params,
            return_type,
            interfaces,
            locals,
            body: Some(body),
            span,
        })
    }

    /// Statements up to, and including, the closing brace.
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LeftBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RightBrace) {
            if self.check(&Token::Local) {
                bail_parse_at!(self.current_span(), "'local' declarations must be at function scope");
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RightBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        trace!("parse_stmt: next token = {:?}", self.peek());
        let start = self.current_span();
        let kind = match self.peek() {
            Some(Token::Copy) => {
                self.advance();
                let dst = self.parse_path()?;
                self.expect(Token::Comma)?;
                let src = self.parse_path()?;
                StmtKind::Copy { dst, src }
            }
            Some(Token::Call) => {
                self.advance();
                let target = if self.check(&Token::Indirect) {
                    self.advance();
                    let binding = self.expect_identifier()?;
                    let index = if self.check(&Token::LeftBracket) {
                        self.advance();
                        let index = self.parse_expr()?;
                        self.expect(Token::RightBracket)?;
                        Some(index)
                    } else {
                        None
                    };
                    CallTarget::Indirect { binding, index }
                } else {
                    CallTarget::Direct(self.expect_identifier()?)
                };

                self.expect(Token::LeftParen)?;
                let mut args = Vec::new();
                while !self.check(&Token::RightParen) {
                    args.push(self.parse_expr()?);
                    if !self.check(&Token::RightParen) {
                        self.expect(Token::Comma)?;
                    }
                }
                self.expect(Token::RightParen)?;

                let ret = if self.check(&Token::Arrow) {
                    self.advance();
                    Some(self.parse_path()?)
                } else {
                    None
                };
                StmtKind::Call { target, args, ret }
            }
            Some(Token::If) => {
                self.advance();
                let cond = self.parse_expr()?;
                let then_body = self.parse_block()?;
                let else_body = if self.check(&Token::Else) {
                    self.advance();
                    self.parse_block()?
                } else {
                    Vec::new()
                };
                StmtKind::If {
                    cond,
                    then_body,
                    else_body,
                }
            }
            Some(Token::Return) => {
                self.advance();
                let value = if self.starts_expr() { Some(self.parse_expr()?) } else { None };
                StmtKind::Return(value)
            }
            _ => bail_parse_at!(start, "Expected statement, got {:?}", self.peek()),
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    /// `name ([len])*`
    fn parse_type(&mut self) -> Result<TypeExpr> {
        let span = self.current_span();
        let name = self.expect_identifier()?;
        let mut ty = TypeExpr::Named(name, span);
        while self.check(&Token::LeftBracket) {
            self.advance();
            let len = self.expect_integer()?;
            self.expect(Token::RightBracket)?;
            ty = TypeExpr::Array(Box::new(ty), len);
        }
        Ok(ty)
    }

    /// `root (.field | [expr] | [*])*`
    fn parse_path(&mut self) -> Result<PathExpr> {
        let start = self.current_span();
        let root = self.expect_identifier()?;
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let span = self.current_span();
                    match self.advance() {
                        Some(Token::Identifier(field)) => steps.push(PathStep::Field(field.clone())),
                        Some(Token::IntLiteral(index)) => steps.push(PathStep::Field(index.to_string())),
                        _ => bail_parse_at!(span, "Expected field name after '.'"),
                    }
                }
                Some(Token::LeftBracket) => {
                    self.advance();
                    if self.check(&Token::Star) {
                        self.advance();
                        steps.push(PathStep::Wildcard);
                    } else {
                        steps.push(PathStep::Index(self.parse_expr()?));
                    }
                    self.expect(Token::RightBracket)?;
                }
                _ => break,
            }
        }
        Ok(PathExpr {
            root,
            steps,
            span: self.span_from(start),
        })
    }

    fn starts_expr(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::IntLiteral(_)
                    | Token::UIntLiteral(_)
                    | Token::FloatLiteral(_)
                    | Token::True
                    | Token::False
                    | Token::Identifier(_)
                    | Token::SubroutineIndex
                    | Token::LeftParen
            )
        )
    }

    /// `primary (('==' | '!=') primary)?`
    ///
    /// Comparisons do not chain; nested comparisons need parentheses.
    fn parse_expr(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::EqEq) => {
                self.advance();
                let rhs = self.parse_primary()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::NotEq) => {
                self.advance();
                let rhs = self.parse_primary()?;
                Ok(Expr::Ne(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.current_span();
        match self.peek() {
            Some(Token::IntLiteral(n)) => {
                let n = *n;
                self.advance();
                i32::try_from(n).map(Expr::Int).map_err(|_| err_parse_at!(span, "Integer literal {} out of range", n))
            }
            Some(Token::UIntLiteral(n)) => {
                let n = *n;
                self.advance();
                u32::try_from(n)
                    .map(Expr::UInt)
                    .map_err(|_| err_parse_at!(span, "Unsigned literal {} out of range", n))
            }
            Some(Token::FloatLiteral(f)) => {
                let f = *f;
                self.advance();
                Ok(Expr::Float(f))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Some(Token::SubroutineIndex) => {
                self.advance();
                self.expect(Token::LeftParen)?;
                let inner = self.parse_expr()?;
                self.expect(Token::RightParen)?;
                Ok(Expr::SubroutineIndex(Box::new(inner)))
            }
            Some(Token::LeftParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Some(Token::Identifier(_)) => self.parse_path().map(Expr::Path),
            _ => Err(err_parse_at!(span, "Expected expression, got {:?}", self.peek())),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current).map(|lt| &lt.token)
    }

    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.current += 1;
            self.tokens.get(self.current - 1).map(|lt| &lt.token)
        } else {
            None
        }
    }

    fn check(&self, token: &Token) -> bool {
        if let Some(t) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(token)
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            let span = self.current_span();
            Err(err_parse_at!(span, "Expected {:?}, got {:?}", token, self.peek()))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        let span = self.current_span();
        match self.advance() {
            Some(Token::Identifier(name)) => Ok(name.clone()),
            other => Err(err_parse_at!(span, "Expected identifier, got {:?}", other)),
        }
    }

    fn expect_integer(&mut self) -> Result<u32> {
        let span = self.current_span();
        match self.advance() {
            Some(Token::IntLiteral(n)) => {
                let n = *n;
                u32::try_from(n).map_err(|_| err_parse_at!(span, "Invalid array length {}", n))
            }
            _ => Err(err_parse_at!(span, "Expected integer")),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }
}

fn storage_keyword(token: &Token) -> Option<StorageKeyword> {
    match token {
        Token::Uniform => Some(StorageKeyword::Uniform),
        Token::In => Some(StorageKeyword::In),
        Token::Out => Some(StorageKeyword::Out),
        Token::Shared => Some(StorageKeyword::Shared),
        Token::Global => Some(StorageKeyword::Global),
        _ => None,
    }
}
