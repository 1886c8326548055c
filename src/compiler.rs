// (C) 2020 Brandon Lewis
//
// Single-pass compiler for Troll expressions.
//
// There is no AST: the compiler drains the token stream and appends
// bytecode straight into a chunk. Parsing is precedence climbing over a
// static rule table indexed by token kind; each rule optionally supplies a
// prefix parser, an infix parser, and the infix operator's binding power.
// Infix rules recurse one level tighter than their own precedence, which is
// what makes every operator left-associative.
//
// *Errors*
//
// The first error prints "[line N] Error at '<lexeme>': <msg>" to stderr
// and sets panic mode; further errors are suppressed until a sync point.
// The only sync point is end of input, since the language has no
// statements. A failed compile leaves the chunk partially filled; the
// caller must not execute it.

use crate::chunk::{Chunk, OpCode};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use crate::value::Value;

// Loosest to tightest. Top-level expressions parse at Concat: everything
// short of the sequencing rungs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Semicolon,
    Else,
    Concat,     // || <| |> <>
    Range,      // ..
    Drop,       // drop keep pick --
    Union,      // U &
    Term,       // + -
    Factor,     // * / mod
    UnaryMinus, // prefix operators
    Aggregate,  // %1 %2
    Relational, // = =/= < > <= >=
    MultiDie,   // infix D, infix Z
    Die,        // prefix D, prefix Z
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Semicolon,
            Semicolon => Else,
            Else => Concat,
            Concat => Range,
            Range => Drop,
            Drop => Union,
            Union => Term,
            Term => Factor,
            Factor => UnaryMinus,
            UnaryMinus => Aggregate,
            Aggregate => Relational,
            Relational => MultiDie,
            MultiDie => Die,
            Die => Primary,
            Primary => Primary,
        }
    }
}

// Tagged parser dispatch: each rule names one of the parse methods below.
#[derive(Debug, Clone, Copy)]
enum PrefixRule {
    Integer,
    Grouping,
    Unary,
    DieRoll,
    Selector,
    Question,
    Collection,
    Pair,
    PairSelector,
    StrLiteral,
    Variable,
}

#[derive(Debug, Clone, Copy)]
enum InfixRule {
    Binary,
    PostfixSelector,
}

struct ParseRule {
    prefix: Option<PrefixRule>,
    infix: Option<InfixRule>,
    precedence: Precedence,
}

fn rule(
    prefix: Option<PrefixRule>,
    infix: Option<InfixRule>,
    precedence: Precedence,
) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

// The precedence table. Token kinds without a row parse as nothing at all:
// no prefix rule ("Expect expression.") and no binding power.
fn rule_for(kind: TokenKind) -> ParseRule {
    use Precedence as P;
    use TokenKind::*;
    match kind {
        Die | ZeroDie => rule(
            Some(PrefixRule::DieRoll),
            Some(InfixRule::Binary),
            P::MultiDie,
        ),
        Union | And => rule(None, Some(InfixRule::Binary), P::Union),
        Plus => rule(None, Some(InfixRule::Binary), P::Term),
        Minus => rule(Some(PrefixRule::Unary), Some(InfixRule::Binary), P::Term),
        Times | Divide | Mod => rule(None, Some(InfixRule::Binary), P::Factor),
        SetMinus | Drop | Keep | Pick => rule(None, Some(InfixRule::Binary), P::Drop),
        DotDot => rule(None, Some(InfixRule::Binary), P::Range),
        HConc | VConcL | VConcR | VConcC => rule(None, Some(InfixRule::Binary), P::Concat),
        Eq | Neq | Lt | Gt | Le | Ge => rule(None, Some(InfixRule::Binary), P::Relational),
        LParen => rule(Some(PrefixRule::Grouping), None, P::None),
        LBrace => rule(Some(PrefixRule::Collection), None, P::None),
        LBrack => rule(Some(PrefixRule::Pair), None, P::None),
        Question => rule(Some(PrefixRule::Question), None, P::None),
        // Pair selectors read both ways: '%1 p' and 'p %1'.
        First | Second => rule(
            Some(PrefixRule::PairSelector),
            Some(InfixRule::PostfixSelector),
            P::Aggregate,
        ),
        Largest | Least => rule(Some(PrefixRule::Selector), None, P::None),
        Sum | Sgn | Min | Max | Minimal | Maximal | Median | Choose | Different | Count
        | Bang => rule(Some(PrefixRule::Unary), None, P::None),
        Integer => rule(Some(PrefixRule::Integer), None, P::None),
        Str => rule(Some(PrefixRule::StrLiteral), None, P::None),
        Identifier => rule(Some(PrefixRule::Variable), None, P::None),
        _ => rule(None, None, P::None),
    }
}

pub struct Parser<'s, 'c> {
    scanner: Scanner<'s>,
    chunk: &'c mut Chunk,
    current: Token,
    previous: Token,
    had_error: bool,
    panic_mode: bool,
}

/// Compile `source` into `chunk`. Returns false if any error was reported;
/// the chunk is then partially populated and must not be executed.
pub fn compile(source: &str, chunk: &mut Chunk) -> bool {
    let mut parser = Parser {
        scanner: Scanner::new(source),
        chunk,
        current: Token::empty(),
        previous: Token::empty(),
        had_error: false,
        panic_mode: false,
    };

    parser.advance();
    parser.expression();
    parser.consume(TokenKind::Eof, "Expected end of expression.");
    parser.emit_op(OpCode::Return);
    !parser.had_error
}

impl<'s, 'c> Parser<'s, 'c> {
    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::empty());
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.current.kind != kind {
            return false;
        }
        self.advance();
        true
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        eprint!("[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => eprint!(" at end"),
            TokenKind::Error => {}
            _ => eprint!(" at '{}'", token.lexeme),
        }
        eprintln!(": {}", message);

        self.had_error = true;
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_ops(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_ops(OpCode::Constant, index);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk.add_constant(value);
        if index > u8::max_value() as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Concat);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        match rule_for(self.previous.kind).prefix {
            Some(prefix) => self.run_prefix(prefix),
            None => {
                self.error("Expect expression.");
                return;
            }
        }

        while precedence <= rule_for(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule_for(self.previous.kind).infix {
                self.run_infix(infix);
            }
        }
    }

    fn run_prefix(&mut self, rule: PrefixRule) {
        match rule {
            PrefixRule::Integer => self.integer(),
            PrefixRule::Grouping => self.grouping(),
            PrefixRule::Unary => self.unary(),
            PrefixRule::DieRoll => self.dieroll(),
            PrefixRule::Selector => self.selector(),
            PrefixRule::Question => self.question(),
            PrefixRule::Collection => self.collection(),
            PrefixRule::Pair => self.pair(),
            PrefixRule::PairSelector => self.pair_selector(),
            PrefixRule::StrLiteral => self.string(),
            PrefixRule::Variable => self.variable(),
        }
    }

    fn run_infix(&mut self, rule: InfixRule) {
        match rule {
            InfixRule::Binary => self.binary(),
            InfixRule::PostfixSelector => self.postfix_selector(),
        }
    }

    fn integer(&mut self) {
        match self.previous.lexeme.parse::<i32>() {
            Ok(value) => self.emit_constant(Value::Integer(value)),
            Err(_) => self.error("Integer constant too large."),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;

        self.parse_precedence(Precedence::UnaryMinus);

        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Choose => self.emit_op(OpCode::Choose),
            TokenKind::Sum => self.emit_op(OpCode::Sum),
            TokenKind::Count => self.emit_op(OpCode::Count),
            TokenKind::Min => self.emit_op(OpCode::Min),
            TokenKind::Max => self.emit_op(OpCode::Max),
            TokenKind::Sgn => self.emit_op(OpCode::Sgn),
            TokenKind::Different => self.emit_op(OpCode::Different),
            TokenKind::Minimal => self.emit_op(OpCode::Minimal),
            TokenKind::Maximal => self.emit_op(OpCode::Maximal),
            TokenKind::Median => self.emit_op(OpCode::Median),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => (),
        }
    }

    fn dieroll(&mut self) {
        let operator = self.previous.kind;

        self.parse_precedence(Precedence::Die);

        match operator {
            TokenKind::Die => self.emit_op(OpCode::Die),
            TokenKind::ZeroDie => self.emit_op(OpCode::ZeroDie),
            _ => (),
        }
    }

    // 'largest n e' / 'least n e'. The count binds only a primary; the
    // operand binds like any other prefix operator's.
    fn selector(&mut self) {
        let operator = self.previous.kind;

        self.parse_precedence(Precedence::Die);
        self.parse_precedence(Precedence::UnaryMinus);

        match operator {
            TokenKind::Largest => self.emit_op(OpCode::Largest),
            TokenKind::Least => self.emit_op(OpCode::Least),
            _ => (),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        let precedence = rule_for(operator).precedence;

        self.parse_precedence(precedence.next());

        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Mod => self.emit_op(OpCode::Mod),
            TokenKind::Times => self.emit_op(OpCode::Multiply),
            TokenKind::Divide => self.emit_op(OpCode::Divide),
            TokenKind::HConc => self.emit_op(OpCode::HConc),
            TokenKind::VConcL => self.emit_op(OpCode::VConcL),
            TokenKind::VConcR => self.emit_op(OpCode::VConcR),
            TokenKind::VConcC => self.emit_op(OpCode::VConcC),
            TokenKind::Die => self.emit_op(OpCode::MDie),
            TokenKind::ZeroDie => self.emit_op(OpCode::MZDie),
            TokenKind::Union => self.emit_op(OpCode::Union),
            TokenKind::DotDot => self.emit_op(OpCode::Range),
            TokenKind::Eq => self.emit_op(OpCode::Eq),
            TokenKind::Neq => self.emit_op(OpCode::Neq),
            TokenKind::Lt => self.emit_op(OpCode::Lt),
            TokenKind::Gt => self.emit_op(OpCode::Gt),
            TokenKind::Le => self.emit_op(OpCode::Le),
            TokenKind::Ge => self.emit_op(OpCode::Ge),
            TokenKind::And => self.emit_op(OpCode::And),
            TokenKind::Drop => self.emit_op(OpCode::Drop),
            TokenKind::Keep => self.emit_op(OpCode::Keep),
            TokenKind::Pick => self.emit_op(OpCode::Pick),
            TokenKind::SetMinus => self.emit_op(OpCode::SetMinus),
            _ => (),
        }
    }

    fn question(&mut self) {
        self.consume(
            TokenKind::Real,
            "Expect number in range (0, 1.0) after '?'.",
        );
        let value = self.previous.lexeme.parse::<f64>().unwrap_or(0.0);
        if value <= 0.0 || value >= 1.0 {
            self.error("Expect number in range (0, 1.0) after '?'.");
        }
        self.emit_constant(Value::Real(value));
        self.emit_op(OpCode::Question);
    }

    fn collection(&mut self) {
        let mut count: usize = 0;

        self.emit_op(OpCode::MkCollection);

        if self.current.kind != TokenKind::RBrace {
            loop {
                if count == 255 {
                    self.error_at_current("Collections cannot contain more than 256 expressions.");
                }
                self.expression();
                count += 1;

                if self.current.kind == TokenKind::RBrace {
                    break;
                }
                self.consume(
                    TokenKind::Comma,
                    "Expecting ',' between expressions in a collection.",
                );
                if self.panic_mode {
                    break;
                }
            }
        }

        self.consume(TokenKind::RBrace, "Expecting '}' at end of collection.");

        if count > 0 {
            self.emit_ops(OpCode::Add2Collection, count.min(255) as u8);
        }
    }

    fn pair(&mut self) {
        self.expression();
        self.consume(
            TokenKind::Comma,
            "Pair expressions must be separated by ','.",
        );
        self.expression();
        self.consume(TokenKind::RBrack, "Pair must be closed with a ']'.");
        self.emit_op(OpCode::MkPair);
    }

    fn pair_selector(&mut self) {
        let operator = self.previous.kind;

        self.parse_precedence(Precedence::Aggregate);

        match operator {
            TokenKind::First => self.emit_op(OpCode::First),
            TokenKind::Second => self.emit_op(OpCode::Second),
            _ => (),
        }
    }

    // The postfix reading of '%1'/'%2': the pair is already on the stack.
    fn postfix_selector(&mut self) {
        match self.previous.kind {
            TokenKind::First => self.emit_op(OpCode::First),
            TokenKind::Second => self.emit_op(OpCode::Second),
            _ => (),
        }
    }

    fn string(&mut self) {
        let interior = &self.previous.lexeme[1..self.previous.lexeme.len() - 1];
        let value = Value::string(interior);
        self.emit_constant(value);
    }

    // A bare name loads a global; 'name := e ; body' defines one for the
    // duration of body and evaluates to body's value.
    fn variable(&mut self) {
        let name = self.previous.lexeme.clone();
        let index = self.make_constant(Value::string(&name));

        if self.matches(TokenKind::Assign) {
            self.expression();
            self.emit_ops(OpCode::DefineGlobal, index);
            self.consume(TokenKind::Semicolon, "Expect ';' after definition.");
            self.expression();
        } else {
            self.emit_ops(OpCode::GetGlobal, index);
        }
    }
}
