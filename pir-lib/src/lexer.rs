use std::collections::HashMap;
use utils::DiagnosticEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(pub usize);

#[derive(Clone, Debug, Copy, Eq, PartialEq, Hash)]
pub struct Location(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValue {
    Local(Identifier),
    Global(Identifier),
    Label(Identifier),
    Integer(i64),

    // Arithmetic
    Add,
    Sub,
    Mul,

    // Comparisons
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,

    // Pointers
    Gep,
    Cast,

    // SSA
    Sigma,
    Phi,

    // Memory
    Alloc,
    Realloc,
    Load,
    Store,

    // Control flow
    Jump,
    Branch,
    Call,
    Return,

    // Separators
    Define,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftAngle,
    RightAngle,
    Colon,
    Semicolon,
    Comma,

    // Builtin types
    Bool,
    I8,
    I16,
    I32,
    I64,
    Ptr,

    // Declarations
    GlobalDecl,
    Extern,

    // Misc
    Const,
    Nop,

    EndOfFile,
}

use TokenValue::*;

fn from_char(c: char) -> Option<TokenValue> {
    match c {
        '(' => Some(LeftParen),
        ')' => Some(RightParen),
        '{' => Some(LeftBrace),
        '}' => Some(RightBrace),
        '[' => Some(LeftBracket),
        ']' => Some(RightBracket),
        '<' => Some(LeftAngle),
        '>' => Some(RightAngle),
        ':' => Some(Colon),
        ';' => Some(Semicolon),
        '=' => Some(Define),
        ',' => Some(Comma),
        _ => None,
    }
}

impl core::fmt::Display for TokenValue {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Local(i) => write!(f, "local_{}", i.0),
            Global(i) => write!(f, "global_{}", i.0),
            Label(i) => write!(f, "label_{}", i.0),
            Integer(i) => write!(f, "{i}"),

            Add => write!(f, "add"),
            Sub => write!(f, "sub"),
            Mul => write!(f, "mul"),

            Equal => write!(f, "eq"),
            NotEqual => write!(f, "ne"),
            LessThan => write!(f, "lt"),
            LessThanOrEq => write!(f, "le"),
            GreaterThan => write!(f, "gt"),
            GreaterThanOrEq => write!(f, "ge"),

            Gep => write!(f, "gep"),
            Cast => write!(f, "cast"),

            Sigma => write!(f, "sigma"),
            Phi => write!(f, "phi"),

            Alloc => write!(f, "alloc"),
            Realloc => write!(f, "realloc"),
            Load => write!(f, "load"),
            Store => write!(f, "store"),

            Jump => write!(f, "jmp"),
            Branch => write!(f, "br"),
            Call => write!(f, "call"),
            Return => write!(f, "ret"),

            Define => write!(f, "="),
            LeftParen => write!(f, "("),
            RightParen => write!(f, ")"),
            LeftBrace => write!(f, "{{"),
            RightBrace => write!(f, "}}"),
            LeftBracket => write!(f, "["),
            RightBracket => write!(f, "]"),
            LeftAngle => write!(f, "<"),
            RightAngle => write!(f, ">"),
            Colon => write!(f, ":"),
            Semicolon => write!(f, ";"),
            Comma => write!(f, ","),

            Bool => write!(f, "bool"),
            I8 => write!(f, "i8"),
            I16 => write!(f, "i16"),
            I32 => write!(f, "i32"),
            I64 => write!(f, "i64"),
            Ptr => write!(f, "ptr"),

            GlobalDecl => write!(f, "global"),
            Extern => write!(f, "extern"),

            Const => write!(f, "const"),
            Nop => write!(f, "nop"),

            EndOfFile => write!(f, "END_OF_FILE"),
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<String, TokenValue> = {
        let mut m = HashMap::new();
        for kw in [Add, Sub, Mul] {
            m.insert(kw.to_string(), kw);
        }

        for kw in [
            Equal,
            NotEqual,
            LessThan,
            LessThanOrEq,
            GreaterThan,
            GreaterThanOrEq,
        ] {
            m.insert(kw.to_string(), kw);
        }

        for kw in [Gep, Cast, Sigma, Phi, Alloc, Realloc, Load, Store] {
            m.insert(kw.to_string(), kw);
        }

        for kw in [Jump, Branch, Call, Return] {
            m.insert(kw.to_string(), kw);
        }

        for kw in [Bool, I8, I16, I32, I64, Ptr] {
            m.insert(kw.to_string(), kw);
        }

        for kw in [GlobalDecl, Extern, Const, Nop] {
            m.insert(kw.to_string(), kw);
        }
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub value: TokenValue,

    pub line_num: Location,
}

impl Token {
    pub fn error(&self, diag: &mut DiagnosticEmitter, s: &str) {
        if self.value == EndOfFile {
            diag.report(self.line_num.0, "at end of file", s);
        } else {
            diag.report(self.line_num.0, &format!("at '{self}'"), s);
        }
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Interned names. Globals and labels keep their sigil, so `@x`, `.x` and
/// `x` are three different identifiers.
#[derive(Debug, Clone, Default)]
pub struct IdentifierTable {
    names: Vec<String>,
    ids: HashMap<String, Identifier>,
}

impl IdentifierTable {
    pub fn lookup(&self, ident: &str) -> Option<Identifier> {
        self.ids.get(ident).copied()
    }

    fn get_identifier(&mut self, ident: &str) -> Identifier {
        if let Some(id) = self.lookup(ident) {
            return id;
        }
        self.names.push(ident.to_owned());
        let id = Identifier(self.names.len() - 1);
        self.ids.insert(ident.to_owned(), id);
        id
    }

    pub fn get_name(&self, id: Identifier) -> &str {
        &self.names[id.0]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub struct Lexer<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line_num: u32,
    has_error: bool,
    diagnostic_emitter: &'src mut DiagnosticEmitter,
    identifiers: IdentifierTable,
}

#[derive(Debug, Clone, Default)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub identifiers: IdentifierTable,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, diagnostic_emitter: &'src mut DiagnosticEmitter) -> Self {
        Lexer {
            source,
            start: 0,
            current: 0,
            line_num: 1,
            has_error: false,
            diagnostic_emitter,
            identifiers: IdentifierTable::default(),
        }
    }

    /// Tokenize the whole input. On error the diagnostic is reported and the
    /// result has no tokens at all, not even [`TokenValue::EndOfFile`].
    pub fn lex_all(mut self) -> LexResult {
        if !self.source.is_ascii() {
            self.diagnostic_emitter
                .error(self.line_num, "Only ASCII input is supported.");
            return LexResult::default();
        }

        let mut tokens = Vec::new();
        while !self.is_at_end() {
            if let Some(tok) = self.lex() {
                tokens.push(tok);
            } else if self.has_error {
                return LexResult::default();
            }
        }

        tokens.push(Token {
            value: EndOfFile,
            line_num: Location(self.line_num),
        });

        LexResult {
            tokens,
            identifiers: self.identifiers,
        }
    }

    fn token(&self, value: TokenValue) -> Token {
        Token {
            value,
            line_num: Location(self.line_num),
        }
    }

    fn fail(&mut self, message: &str) -> Option<Token> {
        self.diagnostic_emitter.error(self.line_num, message);
        self.has_error = true;
        None
    }

    fn lex(&mut self) -> Option<Token> {
        loop {
            if self.is_at_end() {
                return None;
            }

            self.start = self.current;
            match self.advance() {
                // Unambiguous single character tokens.
                c @ ('=' | '(' | ')' | '{' | '}' | '[' | ']' | '<' | '>' | ':' | ';' | ',') => {
                    return from_char(c).map(|value| self.token(value));
                }

                // Whitespace
                '\n' => {
                    self.line_num += 1;
                    continue;
                }
                ' ' | '\t' | '\r' => continue,

                // Comments
                '#' => {
                    self.skip_line();
                    continue;
                }
                '/' => {
                    if self.match_char('/') {
                        self.skip_line();
                        continue;
                    }
                    if self.match_char('*') {
                        loop {
                            if self.is_at_end() {
                                return self.fail("Multiline comment not closed.");
                            }
                            match self.advance() {
                                '\n' => self.line_num += 1,
                                '*' if self.match_char('/') => break,
                                _ => {}
                            }
                        }
                        continue;
                    }
                    let text = self.source[self.start..self.current].to_owned();
                    return self.fail(&format!("Unexpected token: '{text}'."));
                }

                // Negative numbers
                '-' => {
                    if self.peek().is_ascii_digit() {
                        return self.lex_number();
                    }
                    return self.fail("Expected number after '-'.");
                }
                c @ ('@' | '.') => {
                    if self.peek().is_ascii_alphabetic() || self.peek() == '_' {
                        let ident = self.lex_identifier();
                        let id = self.identifiers.get_identifier(ident);
                        let value = if c == '@' { Global(id) } else { Label(id) };
                        return Some(self.token(value));
                    }
                    return self.fail(&format!("Unexpected token: '{c}'."));
                }
                c => {
                    if c.is_ascii_digit() {
                        return self.lex_number();
                    }
                    if c.is_ascii_alphabetic() || c == '_' {
                        let ident = self.lex_identifier();
                        let value = match KEYWORDS.get(ident) {
                            Some(value) => *value,
                            None => Local(self.identifiers.get_identifier(ident)),
                        };
                        return Some(self.token(value));
                    }
                    let text = self.source[self.start..self.current].to_owned();
                    return self.fail(&format!("Unexpected token: '{text}'."));
                }
            }
        }
    }

    fn skip_line(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn lex_number(&mut self) -> Option<Token> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        match text.parse::<i64>() {
            Ok(value) => Some(self.token(Integer(value))),
            Err(_) => {
                let text = text.to_owned();
                self.fail(&format!("Integer literal '{text}' out of range."))
            }
        }
    }

    fn lex_identifier(&mut self) -> &'src str {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        &self.source[self.start..self.current]
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> char {
        self.source
            .as_bytes()
            .get(self.current)
            .map_or('\0', |b| char::from(*b))
    }

    fn advance(&mut self) -> char {
        let prev = self.peek();
        self.current += 1;
        prev
    }

    fn match_char(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.current += 1;
            true
        } else {
            false
        }
    }
}
