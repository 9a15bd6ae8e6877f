use crate::ast::*;
use crate::lexer::tokens::{Token, TokenType};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

const MAX_PARSER_DEPTH: usize = 256;

/// Recursive-descent parser. Function and class declarations are collected
/// wherever they appear; everything else becomes the program body.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    filename: String,
    depth: usize,
    functions: Vec<FunctionDecl>,
    classes: Vec<ClassDecl>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            filename: filename.to_string(),
            depth: 0,
            functions: Vec::new(),
            classes: Vec::new(),
        }
    }

    fn enter_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            Err(self.error(format!(
                "Maximum nesting depth ({}) exceeded",
                MAX_PARSER_DEPTH
            )))
        } else {
            Ok(())
        }
    }

    fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    // ── Public API ──────────────────────────────────────────────────────

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let body = self.parse_statement_list(TokenType::Eof)?;
        if !self.at_end() {
            let tok = self.current();
            return Err(self.error(format!("Unexpected {:?} ({:?})", tok.token_type, tok.value)));
        }

        debug!(
            file = %self.filename,
            functions = self.functions.len(),
            classes = self.classes.len(),
            statements = body.len(),
            "parsed"
        );
        Ok(Program {
            functions: std::mem::take(&mut self.functions),
            classes: std::mem::take(&mut self.classes),
            body: Node::op(Operation::Sequence(body)),
        })
    }

    // ── Statements ──────────────────────────────────────────────────────

    /// Statements up to (not including) `terminator`. Script tags between
    /// statements are skipped; inline text becomes an echo.
    fn parse_statement_list(&mut self, terminator: TokenType) -> Result<Vec<Node>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.current().token_type {
                t if t == terminator => break,
                TokenType::Eof => break,
                TokenType::OpenTag | TokenType::CloseTag => {
                    self.advance();
                }
                _ => {
                    if let Some(stmt) = self.parse_statement()? {
                        stmts.push(stmt);
                    }
                }
            }
        }
        Ok(stmts)
    }

    /// One statement. Declarations and empty statements produce no node.
    fn parse_statement(&mut self) -> Result<Option<Node>, ParseError> {
        self.enter_depth()?;
        let result = self.parse_statement_inner();
        self.exit_depth();
        result
    }

    fn parse_statement_inner(&mut self) -> Result<Option<Node>, ParseError> {
        match self.current().token_type {
            TokenType::Function => {
                let function = self.parse_function_decl()?;
                self.functions.push(function);
                Ok(None)
            }
            TokenType::Class => {
                let class = self.parse_class_decl()?;
                self.classes.push(class);
                Ok(None)
            }
            TokenType::Semicolon => {
                self.advance();
                Ok(None)
            }
            TokenType::InlineHtml => {
                let text = self.advance().value.clone();
                Ok(Some(Node::op(Operation::Echo(Node::Constant(text)))))
            }
            TokenType::LBrace => {
                self.advance();
                let stmts = self.parse_statement_list(TokenType::RBrace)?;
                self.expect(TokenType::RBrace)?;
                Ok(Some(Node::op(Operation::Sequence(stmts))))
            }
            TokenType::If => self.parse_if_stmt().map(Some),
            TokenType::While => self.parse_while_stmt().map(Some),
            TokenType::Do => self.parse_do_while_stmt().map(Some),
            TokenType::Echo => self.parse_echo_stmt().map(Some),
            TokenType::Return => self.parse_return_stmt().map(Some),
            _ => self.parse_expression_stmt().map(Some),
        }
    }

    /// Body of `if`/`while`/`do`: always a node, possibly an empty sequence.
    fn parse_body(&mut self) -> Result<Node, ParseError> {
        while self.check(TokenType::OpenTag) || self.check(TokenType::CloseTag) {
            self.advance();
        }
        Ok(self
            .parse_statement()?
            .unwrap_or_else(|| Node::op(Operation::Sequence(Vec::new()))))
    }

    fn parse_expression_stmt(&mut self) -> Result<Node, ParseError> {
        let expr = self.parse_expression()?;

        if self.check(TokenType::Assign) {
            let assign_tok = self.advance().clone();
            let value = self.parse_expression()?;
            let node = Self::expr_to_assignment(expr, value, &assign_tok)?;
            self.expect_terminator()?;
            return Ok(node);
        }

        self.expect_terminator()?;
        Ok(expr)
    }

    fn expr_to_assignment(target: Node, value: Node, at: &Token) -> Result<Node, ParseError> {
        let invalid = || ParseError {
            message: "Invalid assignment target".to_string(),
            line: at.line,
            column: at.column,
            file: at.file.clone(),
        };
        match target {
            Node::Variable(name) => Ok(Node::op(Operation::Assign {
                target: name,
                value,
            })),
            Node::Operation(op) => match *op {
                Operation::ArrayFetch { variable, index } => Ok(Node::op(Operation::ArrayAssign {
                    variable,
                    index,
                    value,
                })),
                Operation::AttributeFetch { target, attribute } => {
                    Ok(Node::op(Operation::AttributeAssign {
                        target,
                        attribute,
                        value,
                    }))
                }
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }

    fn parse_if_stmt(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::If)?;
        let condition = self.parse_condition()?;
        let then_branch = self.parse_body()?;

        if self.check(TokenType::Else) {
            self.advance();
            let else_branch = self.parse_body()?;
            return Ok(Node::op(Operation::IfElse {
                condition,
                then_branch,
                else_branch,
            }));
        }

        Ok(Node::op(Operation::If {
            condition,
            then_branch,
        }))
    }

    fn parse_while_stmt(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::While)?;
        let condition = self.parse_condition()?;
        let body = self.parse_body()?;
        Ok(Node::op(Operation::WhileDo { condition, body }))
    }

    fn parse_do_while_stmt(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::Do)?;
        let body = self.parse_body()?;
        self.expect(TokenType::While)?;
        let condition = self.parse_condition()?;
        self.expect_terminator()?;
        Ok(Node::op(Operation::DoWhile { body, condition }))
    }

    fn parse_condition(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::RParen)?;
        Ok(condition)
    }

    /// `echo a, b;` prints each operand in turn.
    fn parse_echo_stmt(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::Echo)?;
        let mut echoes = vec![Node::op(Operation::Echo(self.parse_expression()?))];
        while self.check(TokenType::Comma) {
            self.advance();
            echoes.push(Node::op(Operation::Echo(self.parse_expression()?)));
        }
        self.expect_terminator()?;

        if echoes.len() == 1 {
            Ok(echoes.remove(0))
        } else {
            Ok(Node::op(Operation::Sequence(echoes)))
        }
    }

    fn parse_return_stmt(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::Return)?;
        let value = if self.at_terminator() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_terminator()?;
        Ok(Node::op(Operation::Return(value)))
    }

    // ── Declarations ────────────────────────────────────────────────────

    fn parse_function_decl(&mut self) -> Result<FunctionDecl, ParseError> {
        self.expect(TokenType::Function)?;
        let name = self.expect(TokenType::Identifier)?.value.clone();

        self.expect(TokenType::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                params.push(self.expect(TokenType::Variable)?.value.clone());
                if !self.check(TokenType::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenType::RParen)?;

        self.expect(TokenType::LBrace)?;
        let body = self.parse_statement_list(TokenType::RBrace)?;
        self.expect(TokenType::RBrace)?;

        Ok(FunctionDecl { name, params, body })
    }

    fn parse_class_decl(&mut self) -> Result<ClassDecl, ParseError> {
        self.expect(TokenType::Class)?;
        let name = self.expect(TokenType::Identifier)?.value.clone();
        self.expect(TokenType::LBrace)?;

        let mut attributes = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenType::RBrace) && !self.at_end() {
            let modifier = self.parse_modifier();
            if self.check(TokenType::Function) {
                let function = self.parse_function_decl()?;
                methods.push(MethodDecl {
                    modifier: modifier.unwrap_or(Modifier::Public),
                    function,
                });
                continue;
            }

            let Some(modifier) = modifier else {
                let tok = self.current();
                return Err(self.error(format!(
                    "Expected attribute or method declaration, got {:?} ({:?})",
                    tok.token_type, tok.value
                )));
            };
            let attr_name = self.expect(TokenType::Variable)?.value.clone();
            let init = if self.check(TokenType::Assign) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(TokenType::Semicolon)?;
            attributes.push(AttributeDecl {
                modifier,
                name: attr_name,
                init,
            });
        }
        self.expect(TokenType::RBrace)?;

        Ok(ClassDecl {
            modifier: Modifier::Public,
            name,
            attributes,
            methods,
        })
    }

    /// `var` is the old spelling of `public`.
    fn parse_modifier(&mut self) -> Option<Modifier> {
        let modifier = match self.current().token_type {
            TokenType::Public | TokenType::Var => Modifier::Public,
            TokenType::Protected => Modifier::Protected,
            TokenType::Private => Modifier::Private,
            _ => return None,
        };
        self.advance();
        Some(modifier)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        self.enter_depth()?;
        let result = self.parse_comparison();
        self.exit_depth();
        result
    }

    /// Comparison and concatenation share the lowest binary precedence.
    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Equals => Some(CompareOp::Equal),
                TokenType::NotEquals => Some(CompareOp::NotEqual),
                TokenType::LessThan => Some(CompareOp::Less),
                TokenType::LessEqual => Some(CompareOp::LessEqual),
                TokenType::GreaterThan => Some(CompareOp::Greater),
                TokenType::GreaterEqual => Some(CompareOp::GreaterEqual),
                TokenType::Dot => None,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = match op {
                Some(op) => Node::op(Operation::Compare { op, left, right }),
                None => Node::op(Operation::Concat { left, right }),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_multiplicative()?;
        while self.check(TokenType::Plus) || self.check(TokenType::Minus) {
            let op = if self.current().token_type == TokenType::Plus {
                ArithmeticOp::Add
            } else {
                ArithmeticOp::Subtract
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Node::op(Operation::Arithmetic { op, left, right });
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;
        while self.check(TokenType::Star) || self.check(TokenType::Slash) {
            let op = if self.current().token_type == TokenType::Star {
                ArithmeticOp::Multiply
            } else {
                ArithmeticOp::Divide
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Node::op(Operation::Arithmetic { op, left, right });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        if self.check(TokenType::Minus) {
            self.advance();
            self.enter_depth()?;
            let operand = self.parse_unary();
            self.exit_depth();
            return Ok(Node::op(Operation::Negate(operand?)));
        }
        self.parse_postfix()
    }

    /// `->member` and `->method(args)` chains.
    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_primary()?;

        while self.check(TokenType::Arrow) {
            self.advance();
            let tok = self.current().clone();
            let member = match tok.token_type {
                TokenType::Variable => Name::Dynamic(Node::Variable(tok.value)),
                _ if tok.token_type == TokenType::Identifier || keyword_as_member(&tok) => {
                    Name::Static(tok.value)
                }
                _ => {
                    return Err(self.error(format!(
                        "Expected member name after '->', got {:?} ({:?})",
                        tok.token_type, tok.value
                    )))
                }
            };
            self.advance();

            if self.check(TokenType::LParen) {
                let args = self.parse_argument_list()?;
                expr = Node::op(Operation::MethodCall {
                    target: expr,
                    method: member,
                    args,
                });
            } else {
                expr = Node::op(Operation::AttributeFetch {
                    target: expr,
                    attribute: member,
                });
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let tok = self.current().clone();

        match tok.token_type {
            TokenType::Variable => {
                self.advance();
                if self.check(TokenType::LBracket) {
                    let index = self.parse_index()?;
                    return Ok(Node::op(Operation::ArrayFetch {
                        variable: tok.value,
                        index,
                    }));
                }
                if self.check(TokenType::LParen) {
                    let args = self.parse_argument_list()?;
                    return Ok(Node::op(Operation::Call {
                        function: Name::Dynamic(Node::Variable(tok.value)),
                        args,
                    }));
                }
                Ok(Node::Variable(tok.value))
            }
            TokenType::Identifier => {
                self.advance();
                if self.check(TokenType::LParen) {
                    let args = self.parse_argument_list()?;
                    return Ok(Node::op(Operation::Call {
                        function: Name::Static(tok.value),
                        args,
                    }));
                }
                match tok.value.to_ascii_lowercase().as_str() {
                    "true" => Ok(Node::Integer(1)),
                    "false" | "null" => Ok(Node::Constant(String::new())),
                    _ => Err(ParseError {
                        message: format!("Undefined constant {}", tok.value),
                        line: tok.line,
                        column: tok.column,
                        file: tok.file,
                    }),
                }
            }
            TokenType::StringLit => {
                self.advance();
                Ok(Node::Constant(tok.value))
            }
            TokenType::Integer => {
                self.advance();
                let n: i64 = tok.value.parse().map_err(|_| ParseError {
                    message: format!("Integer literal out of range: {}", tok.value),
                    line: tok.line,
                    column: tok.column,
                    file: tok.file.clone(),
                })?;
                Ok(Node::Integer(n))
            }
            TokenType::Float => {
                self.advance();
                let n: f64 = tok.value.parse().map_err(|_| ParseError {
                    message: format!("Invalid float literal: {}", tok.value),
                    line: tok.line,
                    column: tok.column,
                    file: tok.file.clone(),
                })?;
                Ok(Node::Float(n))
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }
            TokenType::New => self.parse_new(),
            _ => Err(ParseError {
                message: format!("Unexpected {:?} ({:?})", tok.token_type, tok.value),
                line: tok.line,
                column: tok.column,
                file: tok.file,
            }),
        }
    }

    /// `new Name`, `new $var`, each with optional constructor arguments.
    fn parse_new(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenType::New)?;
        let tok = self.current().clone();
        let class = match tok.token_type {
            TokenType::Identifier => Name::Static(tok.value),
            TokenType::Variable => Name::Dynamic(Node::Variable(tok.value)),
            _ => {
                return Err(self.error(format!(
                    "Expected class name after 'new', got {:?} ({:?})",
                    tok.token_type, tok.value
                )))
            }
        };
        self.advance();

        let args = if self.check(TokenType::LParen) {
            self.parse_argument_list()?
        } else {
            Vec::new()
        };
        Ok(Node::op(Operation::New { class, args }))
    }

    /// `[k]` yields a single key, `[k1][k2]…` a path.
    fn parse_index(&mut self) -> Result<Index, ParseError> {
        let mut keys = Vec::new();
        while self.check(TokenType::LBracket) {
            self.advance();
            keys.push(self.parse_expression()?);
            self.expect(TokenType::RBracket)?;
        }
        if keys.len() == 1 {
            Ok(Index::Key(keys.remove(0)))
        } else {
            Ok(Index::Path(keys))
        }
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Node>, ParseError> {
        self.expect(TokenType::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.check(TokenType::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(args)
    }

    // ── Token stream helpers ────────────────────────────────────────────

    fn current(&self) -> &Token {
        if self.pos >= self.tokens.len() {
            &self.tokens[self.tokens.len() - 1] // EOF
        } else {
            &self.tokens[self.pos]
        }
    }

    fn advance(&mut self) -> &Token {
        let pos = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[pos]
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn expect(&mut self, token_type: TokenType) -> Result<&Token, ParseError> {
        let tok = self.current();
        if tok.token_type != token_type {
            return Err(self.error(format!(
                "Expected {:?}, got {:?} ({:?})",
                token_type, tok.token_type, tok.value
            )));
        }
        Ok(self.advance())
    }

    /// A statement ends with `;`, or implicitly at `?>` or end of input.
    fn at_terminator(&self) -> bool {
        matches!(
            self.current().token_type,
            TokenType::Semicolon | TokenType::CloseTag | TokenType::Eof
        )
    }

    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        if self.check(TokenType::Semicolon) {
            self.advance();
            return Ok(());
        }
        if self.at_terminator() {
            return Ok(());
        }
        let tok = self.current();
        Err(self.error(format!(
            "Expected ';', got {:?} ({:?})",
            tok.token_type, tok.value
        )))
    }

    fn at_end(&self) -> bool {
        self.current().token_type == TokenType::Eof
    }

    fn error(&self, message: String) -> ParseError {
        let tok = self.current();
        ParseError {
            message,
            line: tok.line,
            column: tok.column,
            file: tok.file.clone(),
        }
    }
}

/// Keywords are fine as member names after `->` (`$list->new()`).
fn keyword_as_member(tok: &Token) -> bool {
    !matches!(
        tok.token_type,
        TokenType::Variable
            | TokenType::StringLit
            | TokenType::Integer
            | TokenType::Float
            | TokenType::InlineHtml
            | TokenType::OpenTag
            | TokenType::CloseTag
            | TokenType::Eof
    ) && tok.value.chars().next().map_or(false, |c| c.is_alphabetic() || c == '_')
}
