// Scanner interface: token kinds and the tokens themselves.
//
// Several kinds (REPEAT, FOREACH, FUNCTION, ...) are reserved words for
// planned language features; the scanner recognizes them but the compiler
// has no rules for them, so using one is an "Expect expression." error.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals.
    Integer,
    Real,
    Str,
    Identifier,

    // Operators and punctuation.
    Plus,
    Minus,
    Times,
    Divide,
    Mod,
    Die,
    ZeroDie,
    Union,
    And,
    Hash,
    Question,
    Sample,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    Comma,
    Semicolon,
    Tilde,
    Bang,
    DotDot,
    HConc,
    VConcL,
    VConcR,
    VConcC,
    First,
    Second,
    Assign,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    SetMinus,

    // Keywords.
    Sum,
    Sgn,
    Least,
    Largest,
    Count,
    Drop,
    Keep,
    Pick,
    Median,
    In,
    Repeat,
    Accumulate,
    While,
    Until,
    Foreach,
    Do,
    If,
    Then,
    Else,
    Min,
    Max,
    Minimal,
    Maximal,
    Choose,
    Different,
    Function,
    Call,
    Compositional,

    Error,
    Eof,
}

// For error tokens the lexeme is the error message rather than source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: i32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: &str, line: i32) -> Token {
        Token {
            kind,
            lexeme: String::from(lexeme),
            line,
        }
    }

    // Placeholder used to prime the parser before the first advance().
    pub fn empty() -> Token {
        Token::new(TokenKind::Eof, "", 0)
    }
}
