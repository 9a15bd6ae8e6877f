pub mod tokens;

use thiserror::Error;
use tokens::{keyword_type, Token, TokenType};

#[derive(Debug, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

/// Splits a source text into tokens. Text outside `<? … ?>` becomes
/// `InlineHtml` tokens; everything between the tags is script.
pub struct Lexer {
    source: Vec<char>,
    filename: String,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            source: source.chars().collect(),
            filename: filename.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        while !self.at_end() {
            self.scan_inline_html();
            if self.at_end() {
                break;
            }
            self.scan_script()?;
        }

        self.tokens.push(self.make_token(TokenType::Eof, ""));
        Ok(self.tokens)
    }

    /// Consumes literal text up to the next open tag, and the tag itself.
    fn scan_inline_html(&mut self) {
        let start_line = self.line;
        let start_col = self.column;
        let mut text = String::new();

        while !self.at_end() && !self.at_open_tag() {
            text.push(self.advance());
        }

        if !text.is_empty() {
            self.tokens.push(Token {
                token_type: TokenType::InlineHtml,
                value: text,
                line: start_line,
                column: start_col,
                file: self.filename.clone(),
            });
        }

        if self.at_open_tag() {
            self.tokens.push(self.make_token(TokenType::OpenTag, "<?"));
            self.advance();
            self.advance();
            // `<?php` is accepted as a synonym for `<?`.
            let word: String = self.source[self.pos..].iter().take(3).collect();
            if word.eq_ignore_ascii_case("php")
                && self.peek_ahead(3).map_or(true, |c| c.is_whitespace())
            {
                for _ in 0..3 {
                    self.advance();
                }
            }
        }
    }

    /// Scans script tokens until the close tag (inclusive) or end of input.
    fn scan_script(&mut self) -> Result<(), LexerError> {
        loop {
            self.skip_whitespace_and_comments()?;
            if self.at_end() {
                return Ok(());
            }
            if self.peek() == '?' && self.peek_ahead(1) == Some('>') {
                self.tokens.push(self.make_token(TokenType::CloseTag, "?>"));
                self.advance();
                self.advance();
                // A single newline directly after the close tag is swallowed.
                if !self.at_end() && self.peek() == '\n' {
                    self.advance();
                } else if !self.at_end() && self.peek() == '\r' && self.peek_ahead(1) == Some('\n') {
                    self.advance();
                    self.advance();
                }
                return Ok(());
            }
            self.scan_token()?;
        }
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let ch = self.peek();

        if ch == '\'' || ch == '"' {
            return self.scan_string(ch);
        }

        if ch.is_ascii_digit() {
            return self.scan_number();
        }

        if ch == '$' {
            return self.scan_variable();
        }

        // Two-character operators
        let two = match (ch, self.peek_ahead(1)) {
            ('-', Some('>')) => Some((TokenType::Arrow, "->")),
            ('=', Some('=')) => Some((TokenType::Equals, "==")),
            ('!', Some('=')) => Some((TokenType::NotEquals, "!=")),
            ('<', Some('>')) => Some((TokenType::NotEquals, "<>")),
            ('<', Some('=')) => Some((TokenType::LessEqual, "<=")),
            ('>', Some('=')) => Some((TokenType::GreaterEqual, ">=")),
            _ => None,
        };
        if let Some((tt, text)) = two {
            self.tokens.push(self.make_token(tt, text));
            self.advance();
            self.advance();
            return Ok(());
        }

        // Single-character tokens
        let single = match ch {
            '{' => Some(TokenType::LBrace),
            '}' => Some(TokenType::RBrace),
            '(' => Some(TokenType::LParen),
            ')' => Some(TokenType::RParen),
            '[' => Some(TokenType::LBracket),
            ']' => Some(TokenType::RBracket),
            ';' => Some(TokenType::Semicolon),
            ',' => Some(TokenType::Comma),
            '.' => Some(TokenType::Dot),
            '+' => Some(TokenType::Plus),
            '-' => Some(TokenType::Minus),
            '*' => Some(TokenType::Star),
            '/' => Some(TokenType::Slash),
            '<' => Some(TokenType::LessThan),
            '>' => Some(TokenType::GreaterThan),
            '=' => Some(TokenType::Assign),
            _ => None,
        };

        if let Some(tt) = single {
            let s = ch.to_string();
            self.tokens.push(self.make_token(tt, &s));
            self.advance();
            return Ok(());
        }

        if is_name_start(ch) {
            return self.scan_identifier();
        }

        Err(self.error(format!("Unexpected character: {:?}", ch)))
    }

    fn scan_string(&mut self, quote: char) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        self.advance(); // consume opening quote
        let mut chars = String::new();

        while !self.at_end() && self.peek() != quote {
            if self.peek() == '\\' && self.peek_ahead(1).is_some() {
                self.advance(); // consume backslash
                let escaped = self.peek();
                match (quote, escaped) {
                    (_, '\\') => chars.push('\\'),
                    (q, c) if c == q => chars.push(c),
                    ('"', 'n') => chars.push('\n'),
                    ('"', 't') => chars.push('\t'),
                    ('"', 'r') => chars.push('\r'),
                    ('"', '$') => chars.push('$'),
                    (_, other) => {
                        chars.push('\\');
                        chars.push(other);
                    }
                }
            } else {
                chars.push(self.peek());
            }
            self.advance();
        }

        if self.at_end() {
            return Err(LexerError {
                message: "Unterminated string literal".to_string(),
                line: start_line,
                column: start_col,
                file: self.filename.clone(),
            });
        }

        self.advance(); // consume closing quote
        self.tokens.push(Token {
            token_type: TokenType::StringLit,
            value: chars,
            line: start_line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), LexerError> {
        let start_col = self.column;
        let mut num_chars = String::new();

        while !self.at_end() && self.peek().is_ascii_digit() {
            num_chars.push(self.advance());
        }

        // Only consume a dot followed by a digit; otherwise it's concatenation.
        let mut tt = TokenType::Integer;
        if !self.at_end()
            && self.peek() == '.'
            && self.peek_ahead(1).map_or(false, |c| c.is_ascii_digit())
        {
            tt = TokenType::Float;
            num_chars.push(self.advance());
            while !self.at_end() && self.peek().is_ascii_digit() {
                num_chars.push(self.advance());
            }
        }

        self.tokens.push(Token {
            token_type: tt,
            value: num_chars,
            line: self.line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    /// `$name` yields `name`; `$$name` yields `$name` (a variable-variable).
    fn scan_variable(&mut self) -> Result<(), LexerError> {
        let start_col = self.column;
        self.advance(); // consume `$`
        let mut name = String::new();

        while !self.at_end() && self.peek() == '$' {
            name.push(self.advance());
        }

        if self.at_end() || !is_name_start(self.peek()) {
            return Err(self.error("Expected variable name after '$'".to_string()));
        }

        while !self.at_end() && is_name_char(self.peek()) {
            name.push(self.advance());
        }

        self.tokens.push(Token {
            token_type: TokenType::Variable,
            value: name,
            line: self.line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    fn scan_identifier(&mut self) -> Result<(), LexerError> {
        let start_col = self.column;
        let mut word = String::new();

        while !self.at_end() && is_name_char(self.peek()) {
            word.push(self.advance());
        }

        let tt = keyword_type(&word).unwrap_or(TokenType::Identifier);
        self.tokens.push(Token {
            token_type: tt,
            value: word,
            line: self.line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexerError> {
        loop {
            while !self.at_end() && self.peek().is_whitespace() {
                self.advance();
            }
            if self.at_end() {
                return Ok(());
            }
            let line_comment = self.peek() == '#'
                || (self.peek() == '/' && self.peek_ahead(1) == Some('/'));
            if line_comment {
                // Line comments end at a newline or right before a close tag.
                while !self.at_end()
                    && self.peek() != '\n'
                    && !(self.peek() == '?' && self.peek_ahead(1) == Some('>'))
                {
                    self.advance();
                }
                continue;
            }
            if self.peek() == '/' && self.peek_ahead(1) == Some('*') {
                let line = self.line;
                let column = self.column;
                self.advance();
                self.advance();
                loop {
                    if self.at_end() {
                        return Err(LexerError {
                            message: "Unterminated block comment".to_string(),
                            line,
                            column,
                            file: self.filename.clone(),
                        });
                    }
                    if self.peek() == '*' && self.peek_ahead(1) == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            return Ok(());
        }
    }

    fn at_open_tag(&self) -> bool {
        !self.at_end() && self.peek() == '<' && self.peek_ahead(1) == Some('?')
    }

    fn peek(&self) -> char {
        self.source[self.pos]
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.pos];
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn make_token(&self, token_type: TokenType, value: &str) -> Token {
        Token {
            token_type,
            value: value.to_string(),
            line: self.line,
            column: self.column,
            file: self.filename.clone(),
        }
    }

    fn error(&self, message: String) -> LexerError {
        LexerError {
            message,
            line: self.line,
            column: self.column,
            file: self.filename.clone(),
        }
    }
}

fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || !ch.is_ascii()
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || !ch.is_ascii()
}
