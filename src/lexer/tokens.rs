use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Script structure
    InlineHtml,
    OpenTag,
    CloseTag,
    Eof,

    // Literals
    StringLit,
    Integer,
    Float,

    // Names
    Variable,
    Identifier,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Arrow,
    Assign,

    // Comparison / arithmetic
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,

    // Keywords — control flow
    If,
    Else,
    While,
    Do,
    Echo,
    Return,

    // Keywords — declarations
    Function,
    Class,
    New,
    Public,
    Protected,
    Private,
    Var,
}

impl TokenType {
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            TokenType::Public | TokenType::Protected | TokenType::Private | TokenType::Var
        )
    }
}

/// Look up a keyword (case-insensitively) and return its TokenType, or None
/// if it's a plain identifier.
pub fn keyword_type(word: &str) -> Option<TokenType> {
    match word.to_ascii_lowercase().as_str() {
        "if" => Some(TokenType::If),
        "else" => Some(TokenType::Else),
        "while" => Some(TokenType::While),
        "do" => Some(TokenType::Do),
        "echo" => Some(TokenType::Echo),
        "return" => Some(TokenType::Return),
        "function" => Some(TokenType::Function),
        "class" => Some(TokenType::Class),
        "new" => Some(TokenType::New),
        "public" => Some(TokenType::Public),
        "protected" => Some(TokenType::Protected),
        "private" => Some(TokenType::Private),
        "var" => Some(TokenType::Var),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::OpenTag | TokenType::CloseTag | TokenType::Eof => {
                write!(f, "Token({:?}, {}:{})", self.token_type, self.line, self.column)
            }
            _ => {
                write!(
                    f,
                    "Token({:?}, {:?}, {}:{})",
                    self.token_type, self.value, self.line, self.column
                )
            }
        }
    }
}
