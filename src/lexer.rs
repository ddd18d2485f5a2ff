use std::iter::Peekable;
use std::str::CharIndices;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Classification of a reserved word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeywordFlags: u8 {
        /// Declaration modifier (`Public`, `Shared`, ...)
        const MODIFIER = 1 << 0;
        /// Built-in type name (`Integer`, `String`, ...)
        const PRIMITIVE_TYPE = 1 << 1;
        /// Only reserved in a few positions; usable as an identifier elsewhere
        const CONTEXTUAL = 1 << 2;
        /// `True`, `False`, `Nothing`
        const LITERAL = 1 << 3;
    }
}

macro_rules! keywords {
    ($($variant:ident => $text:literal $(| $flag:ident)*,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant,)*
        }

        /// Keyword table in declaration order, indexed by `Keyword as usize`
        pub static KEYWORDS: &[(Keyword, &str, KeywordFlags)] = &[
            $((Keyword::$variant, $text, KeywordFlags::empty()$(.union(KeywordFlags::$flag))*),)*
        ];
    };
}

keywords! {
    AddHandler => "AddHandler",
    AddressOf => "AddressOf",
    And => "And",
    AndAlso => "AndAlso",
    As => "As",
    Async => "Async" | MODIFIER | CONTEXTUAL,
    Binary => "Binary" | CONTEXTUAL,
    Boolean => "Boolean" | PRIMITIVE_TYPE,
    ByRef => "ByRef",
    Byte => "Byte" | PRIMITIVE_TYPE,
    ByVal => "ByVal",
    Call => "Call",
    Case => "Case",
    Catch => "Catch",
    Char => "Char" | PRIMITIVE_TYPE,
    Class => "Class",
    Compare => "Compare" | CONTEXTUAL,
    Const => "Const",
    Continue => "Continue",
    Custom => "Custom" | MODIFIER | CONTEXTUAL,
    Date => "Date" | PRIMITIVE_TYPE,
    Decimal => "Decimal" | PRIMITIVE_TYPE,
    Default => "Default" | MODIFIER,
    Delegate => "Delegate",
    Dim => "Dim",
    Do => "Do",
    Double => "Double" | PRIMITIVE_TYPE,
    Each => "Each",
    Else => "Else",
    ElseIf => "ElseIf",
    End => "End",
    Enum => "Enum",
    Event => "Event",
    Exit => "Exit",
    Explicit => "Explicit" | CONTEXTUAL,
    False => "False" | LITERAL,
    Finally => "Finally",
    For => "For",
    Friend => "Friend" | MODIFIER,
    From => "From" | CONTEXTUAL,
    Function => "Function",
    Get => "Get",
    GoTo => "GoTo",
    Handles => "Handles",
    If => "If",
    Implements => "Implements",
    Imports => "Imports",
    In => "In",
    Infer => "Infer" | CONTEXTUAL,
    Inherits => "Inherits",
    Integer => "Integer" | PRIMITIVE_TYPE,
    Interface => "Interface",
    Is => "Is",
    IsNot => "IsNot",
    Iterator => "Iterator" | MODIFIER | CONTEXTUAL,
    Like => "Like",
    Long => "Long" | PRIMITIVE_TYPE,
    Loop => "Loop",
    Mod => "Mod",
    Module => "Module",
    MustInherit => "MustInherit" | MODIFIER,
    MustOverride => "MustOverride" | MODIFIER,
    Namespace => "Namespace",
    Narrowing => "Narrowing" | MODIFIER,
    New => "New",
    Next => "Next",
    Not => "Not",
    NotInheritable => "NotInheritable" | MODIFIER,
    NotOverridable => "NotOverridable" | MODIFIER,
    Nothing => "Nothing" | LITERAL,
    Object => "Object" | PRIMITIVE_TYPE,
    Of => "Of",
    Off => "Off" | CONTEXTUAL,
    On => "On" | CONTEXTUAL,
    Option => "Option",
    Optional => "Optional",
    Or => "Or",
    OrElse => "OrElse",
    Overloads => "Overloads" | MODIFIER,
    Overridable => "Overridable" | MODIFIER,
    Overrides => "Overrides" | MODIFIER,
    ParamArray => "ParamArray",
    Partial => "Partial" | MODIFIER,
    Preserve => "Preserve" | CONTEXTUAL,
    Private => "Private" | MODIFIER,
    Property => "Property",
    Protected => "Protected" | MODIFIER,
    Public => "Public" | MODIFIER,
    RaiseEvent => "RaiseEvent",
    ReadOnly => "ReadOnly" | MODIFIER,
    ReDim => "ReDim",
    RemoveHandler => "RemoveHandler",
    Return => "Return",
    Select => "Select",
    Set => "Set",
    Shadows => "Shadows" | MODIFIER,
    Shared => "Shared" | MODIFIER,
    Short => "Short" | PRIMITIVE_TYPE,
    Single => "Single" | PRIMITIVE_TYPE,
    Static => "Static" | MODIFIER,
    Step => "Step",
    Strict => "Strict" | CONTEXTUAL,
    String => "String" | PRIMITIVE_TYPE,
    Structure => "Structure",
    Sub => "Sub",
    SyncLock => "SyncLock",
    Text => "Text" | CONTEXTUAL,
    Then => "Then",
    Throw => "Throw",
    To => "To",
    True => "True" | LITERAL,
    Try => "Try",
    TypeOf => "TypeOf",
    Until => "Until" | CONTEXTUAL,
    Using => "Using",
    When => "When" | CONTEXTUAL,
    While => "While",
    Widening => "Widening" | MODIFIER,
    With => "With",
    WithEvents => "WithEvents" | MODIFIER,
    WriteOnly => "WriteOnly" | MODIFIER,
    Xor => "Xor",
}

// Longest keyword is `NotInheritable` / `NotOverridable`
const MAX_KEYWORD_LEN: usize = 14;

impl Keyword {
    /// Case-insensitive keyword lookup
    pub fn lookup(text: &str) -> Option<Keyword> {
        if text.len() > MAX_KEYWORD_LEN {
            return None;
        }
        KEYWORDS
            .iter()
            .find(|(_, spelling, _)| spelling.eq_ignore_ascii_case(text))
            .map(|(keyword, _, _)| *keyword)
    }

    /// Canonical spelling
    pub fn as_str(self) -> &'static str {
        KEYWORDS[self as usize].1
    }

    pub fn flags(self) -> KeywordFlags {
        KEYWORDS[self as usize].2
    }

    pub fn is_modifier(self) -> bool {
        self.flags().contains(KeywordFlags::MODIFIER)
    }

    pub fn is_primitive_type(self) -> bool {
        self.flags().contains(KeywordFlags::PRIMITIVE_TYPE)
    }

    /// Whether the word may stand in for an identifier in name and expression positions
    pub fn is_identifier_like(self) -> bool {
        self.flags()
            .intersects(KeywordFlags::CONTEXTUAL | KeywordFlags::PRIMITIVE_TYPE)
    }
}

// Token types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,

    // Literals
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    CharacterLiteral,
    DateLiteral,

    PreprocessorDirective,

    // Punctuation
    Dot,    // . (may absorb a directly following newline)
    Comma,  // , (may absorb a directly following newline)
    Colon,  // :
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    // Operators
    Eq,        // =
    NotEq,     // <>
    Lt,        // <
    Gt,        // >
    LtEq,      // <=
    GtEq,      // >=
    LtLt,      // <<
    GtGt,      // >>
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Backslash, // \
    Caret,     // ^
    Ampersand, // &

    // Compound assignment
    PlusEq,      // +=
    MinusEq,     // -=
    StarEq,      // *=
    SlashEq,     // /=
    BackslashEq, // \=
    CaretEq,     // ^=
    AmpersandEq, // &=
    LtLtEq,      // <<=
    GtGtEq,      // >>=

    Newline,
    Error,
    Eof,
}

impl TokenKind {
    /// Fixed display name; for punctuation and keywords this is the source spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Keyword(keyword) => keyword.as_str(),
            TokenKind::Identifier => "identifier",
            TokenKind::IntegerLiteral => "integer_literal",
            TokenKind::FloatLiteral => "floating_point_literal",
            TokenKind::StringLiteral => "string_literal",
            TokenKind::CharacterLiteral => "character_literal",
            TokenKind::DateLiteral => "date_literal",
            TokenKind::PreprocessorDirective => "preprocessor_directive",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "<>",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Backslash => "\\",
            TokenKind::Caret => "^",
            TokenKind::Ampersand => "&",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::BackslashEq => "\\=",
            TokenKind::CaretEq => "^=",
            TokenKind::AmpersandEq => "&=",
            TokenKind::LtLtEq => "<<=",
            TokenKind::GtGtEq => ">>=",
            TokenKind::Newline => "newline",
            TokenKind::Error => "ERROR",
            TokenKind::Eof => "end of file",
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        *self == TokenKind::Keyword(keyword)
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::Colon)
    }

    pub fn is_assignment_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::BackslashEq
                | TokenKind::CaretEq
                | TokenKind::AmpersandEq
                | TokenKind::LtLtEq
                | TokenKind::GtGtEq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,  // byte offset
    pub end: usize,    // byte offset (exclusive)
    pub line: usize,   // 1-indexed
    pub column: usize, // 1-indexed
}

impl Token {
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }
}

/// Source text skipped between tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriviaKind {
    Whitespace,
    Comment,
    LineContinuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Lexical error at {line}:{column}: {message}")]
pub struct LexError {
    pub message: String,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct Tokens {
    pub list: Vec<Token>,
    pub trivia: Vec<Trivia>,
    pub errors: Vec<LexError>,
}

impl Tokens {
    pub fn peek_kind(&self, index: usize) -> TokenKind {
        match self.list.get(index) {
            Some(token) => token.kind,
            None => TokenKind::Eof,
        }
    }

    /// Token at `index`, or the trailing end-of-file token past the end
    pub fn get(&self, index: usize) -> &Token {
        let last = self.list.len() - 1;
        &self.list[index.min(last)]
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Rebuild the source text from tokens and trivia in offset order
    pub fn reconstruct(&self, source: &str) -> String {
        let mut spans: Vec<(usize, usize)> = self
            .list
            .iter()
            .map(|t| (t.start, t.end))
            .chain(self.trivia.iter().map(|t| (t.start, t.end)))
            .filter(|(start, end)| start < end)
            .collect();
        spans.sort_unstable();

        let mut out = String::with_capacity(source.len());
        for (start, end) in spans {
            out.push_str(&source[start..end]);
        }
        out
    }
}

// Lexer

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    pos: usize,
    line: usize,
    column: usize,
    trivia: Vec<Trivia>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            pos: 0,
            line: 1,
            column: 1,
            trivia: Vec::new(),
            errors: Vec::new(),
        }
    }

    // Character navigation methods

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        self.chars.clone().nth(n).map(|(_, c)| c)
    }

    fn peek_char2(&self) -> Option<char> {
        self.peek_char_at(1)
    }

    fn consume_char(&mut self) -> Option<char> {
        let (pos, ch) = self.chars.next()?;
        self.pos = pos + ch.len_utf8();

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    fn consume_n(&mut self, n: usize) {
        for _ in 0..n {
            self.consume_char();
        }
    }

    fn consume_while<F>(&mut self, predicate: F) -> bool
    where
        F: Fn(char) -> bool,
    {
        let mut consumed = false;
        while let Some(c) = self.peek_char() {
            if predicate(c) {
                self.consume_char();
                consumed = true;
            } else {
                break;
            }
        }
        consumed
    }

    /// Consume a directly following `\n` or `\r\n`
    fn absorb_newline(&mut self) {
        match (self.peek_char(), self.peek_char2()) {
            (Some('\n'), _) => self.consume_n(1),
            (Some('\r'), Some('\n')) => self.consume_n(2),
            _ => {}
        }
    }

    // Trivia

    fn skip_trivia(&mut self) {
        loop {
            let start = self.pos;
            let kind = match self.peek_char() {
                Some(c) if is_extra(c) => {
                    self.consume_while(is_extra);
                    TriviaKind::Whitespace
                }
                Some('\'') => {
                    self.consume_while(|c| c != '\n' && c != '\r');
                    TriviaKind::Comment
                }
                Some('r' | 'R') if self.at_rem_comment() => {
                    self.consume_while(|c| c != '\n' && c != '\r');
                    TriviaKind::Comment
                }
                Some('_') if self.at_line_continuation() => {
                    self.consume_char();
                    self.consume_while(|c| c == ' ' || c == '\t');
                    self.absorb_newline();
                    TriviaKind::LineContinuation
                }
                _ => break,
            };
            self.trivia.push(Trivia {
                kind,
                start,
                end: self.pos,
            });
        }
    }

    /// `REM` as a whole word starts a comment
    fn at_rem_comment(&self) -> bool {
        let mut iter = self.chars.clone().map(|(_, c)| c);
        let word: String = iter.by_ref().take(3).collect();
        if !word.eq_ignore_ascii_case("rem") {
            return false;
        }
        !iter
            .next()
            .is_some_and(|c| is_ident_continue(c) || is_type_character(c))
    }

    /// `_`, optional horizontal whitespace, then a newline
    fn at_line_continuation(&self) -> bool {
        let mut iter = self.chars.clone().map(|(_, c)| c).skip(1).peekable();
        while iter.next_if(|c| *c == ' ' || *c == '\t').is_some() {}
        match iter.next() {
            Some('\n') => true,
            Some('\r') => iter.next() == Some('\n'),
            _ => false,
        }
    }

    // Main tokenization method

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.pos;
        let line = self.line;
        let column = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some('\n') => {
                self.consume_char();
                TokenKind::Newline
            }
            Some('\r') if self.peek_char2() == Some('\n') => {
                self.consume_n(2);
                TokenKind::Newline
            }
            Some(c) if c.is_ascii_digit() => self.lex_number(),
            Some('.') if self.peek_char2().is_some_and(|c| c.is_ascii_digit()) => {
                self.lex_number()
            }
            Some('.') => {
                self.consume_char();
                self.absorb_newline();
                TokenKind::Dot
            }
            Some(',') => {
                self.consume_char();
                self.absorb_newline();
                TokenKind::Comma
            }
            Some('"') => self.lex_string_or_char(),
            Some('#') => self.lex_hash(),
            Some('[') => self.lex_escaped_identifier(),
            Some('&') => self.lex_ampersand(),
            Some(c) if is_ident_start(c) => self.lex_word(),
            Some(':') => self.single(TokenKind::Colon),
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('{') => self.single(TokenKind::LBrace),
            Some('}') => self.single(TokenKind::RBrace),
            Some('=') => self.single(TokenKind::Eq),
            Some('<') => self.lex_less(),
            Some('>') => self.lex_greater(),
            Some('+') => self.with_eq(TokenKind::Plus, TokenKind::PlusEq),
            Some('-') => self.with_eq(TokenKind::Minus, TokenKind::MinusEq),
            Some('*') => self.with_eq(TokenKind::Star, TokenKind::StarEq),
            Some('/') => self.with_eq(TokenKind::Slash, TokenKind::SlashEq),
            Some('\\') => self.with_eq(TokenKind::Backslash, TokenKind::BackslashEq),
            Some('^') => self.with_eq(TokenKind::Caret, TokenKind::CaretEq),
            Some(c) => {
                self.consume_char();
                self.error(format!("Unexpected character: '{}'", c), start, line, column)
            }
        };

        Token {
            kind,
            start,
            end: self.pos,
            line,
            column,
        }
    }

    fn error(&mut self, message: String, start: usize, line: usize, column: usize) -> TokenKind {
        self.errors.push(LexError {
            message,
            start,
            end: self.pos,
            line,
            column,
        });
        TokenKind::Error
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        kind
    }

    fn with_eq(&mut self, plain: TokenKind, compound: TokenKind) -> TokenKind {
        self.consume_char();
        if self.peek_char() == Some('=') {
            self.consume_char();
            return compound;
        }
        plain
    }

    fn lex_less(&mut self) -> TokenKind {
        self.consume_char(); // '<'
        match self.peek_char() {
            Some('=') => self.single(TokenKind::LtEq),
            Some('>') => self.single(TokenKind::NotEq),
            Some('<') => self.with_eq(TokenKind::LtLt, TokenKind::LtLtEq),
            _ => TokenKind::Lt,
        }
    }

    fn lex_greater(&mut self) -> TokenKind {
        self.consume_char(); // '>'
        match self.peek_char() {
            Some('=') => self.single(TokenKind::GtEq),
            Some('>') => self.with_eq(TokenKind::GtGt, TokenKind::GtGtEq),
            _ => TokenKind::Gt,
        }
    }

    // Identifier and keyword lexing

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        self.consume_while(is_ident_continue);

        // A type character makes the match longer than any keyword
        if self.peek_char().is_some_and(is_type_character) {
            self.consume_char();
            return TokenKind::Identifier;
        }

        match Keyword::lookup(&self.source[start..self.pos]) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier,
        }
    }

    fn lex_escaped_identifier(&mut self) -> TokenKind {
        let (start, line, column) = (self.pos, self.line, self.column);
        let len = self
            .chars
            .clone()
            .skip(1)
            .map(|(_, c)| c)
            .take_while(|c| *c != ']' && *c != '\n' && *c != '\r')
            .count();
        let closed = self.peek_char_at(len + 1) == Some(']');

        if len == 0 || !closed {
            self.consume_char();
            return self.error("Unterminated escaped identifier".into(), start, line, column);
        }

        self.consume_n(len + 2);
        TokenKind::Identifier
    }

    // Number lexing

    fn lex_ampersand(&mut self) -> TokenKind {
        let digits: fn(char) -> bool = match self.peek_char2() {
            Some('h' | 'H') => |c| c.is_ascii_hexdigit(),
            Some('o' | 'O') => |c| ('0'..='7').contains(&c),
            _ => return self.with_eq(TokenKind::Ampersand, TokenKind::AmpersandEq),
        };

        if !self.peek_char_at(2).is_some_and(digits) {
            return self.with_eq(TokenKind::Ampersand, TokenKind::AmpersandEq);
        }

        self.consume_n(2); // '&H' or '&O'
        self.consume_while(digits);
        self.lex_integer_suffix();
        TokenKind::IntegerLiteral
    }

    fn lex_number(&mut self) -> TokenKind {
        let mut is_float = false;

        // Integer part (empty for `.5`)
        self.consume_while(|c| c.is_ascii_digit());

        // Fraction
        if self.peek_char() == Some('.') && self.peek_char2().is_some_and(|c| c.is_ascii_digit())
        {
            self.consume_char(); // '.'
            self.consume_while(|c| c.is_ascii_digit());
            is_float = true;
        }

        // Exponent
        if let Some('e' | 'E') = self.peek_char() {
            let has_exponent = match self.peek_char2() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self.peek_char_at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if has_exponent {
                self.consume_char(); // 'e'
                if let Some('+' | '-') = self.peek_char() {
                    self.consume_char();
                }
                self.consume_while(|c| c.is_ascii_digit());
                is_float = true;
            }
        }

        if self.peek_char().is_some_and(is_float_suffix) {
            self.consume_char();
            return TokenKind::FloatLiteral;
        }

        if is_float {
            return TokenKind::FloatLiteral;
        }

        self.lex_integer_suffix();
        TokenKind::IntegerLiteral
    }

    fn lex_integer_suffix(&mut self) {
        match self.peek_char() {
            Some('u' | 'U') if matches!(self.peek_char2(), Some('s' | 'S' | 'i' | 'I' | 'l' | 'L')) => {
                self.consume_n(2);
            }
            Some('s' | 'S' | 'i' | 'I' | 'l' | 'L' | '%' | '&') => {
                self.consume_char();
            }
            _ => {}
        }
    }

    // String, character and date lexing

    fn lex_string_or_char(&mut self) -> TokenKind {
        let (start, line, column) = (self.pos, self.line, self.column);

        // Scan ahead on a copy so an unterminated string can be reported as one error char
        let mut iter = self.chars.clone().map(|(_, c)| c).skip(1).peekable();
        let mut consumed = 1;
        let mut content_chars = 0;
        let mut closed = false;
        while let Some(c) = iter.next() {
            match c {
                '\n' | '\r' => break,
                '"' if iter.peek() == Some(&'"') => {
                    iter.next();
                    consumed += 2;
                    content_chars += 1;
                }
                '"' => {
                    consumed += 1;
                    closed = true;
                    break;
                }
                _ => {
                    consumed += 1;
                    content_chars += 1;
                }
            }
        }

        if !closed {
            self.consume_char();
            return self.error("Unterminated string literal".into(), start, line, column);
        }

        self.consume_n(consumed);

        if content_chars == 1 && matches!(self.peek_char(), Some('c' | 'C')) {
            self.consume_char();
            return TokenKind::CharacterLiteral;
        }

        TokenKind::StringLiteral
    }

    /// `#` starts a date literal when a closing `#` follows a date-shaped body,
    /// otherwise a preprocessor directive running to end of line
    fn lex_hash(&mut self) -> TokenKind {
        let body: Vec<char> = self
            .chars
            .clone()
            .skip(1)
            .map(|(_, c)| c)
            .take_while(|c| is_date_character(*c))
            .collect();
        let has_value = body.iter().any(|c| !c.is_whitespace());

        if has_value && self.peek_char_at(body.len() + 1) == Some('#') {
            self.consume_n(body.len() + 2);
            return TokenKind::DateLiteral;
        }

        self.consume_while(|c| c != '\n' && c != '\r');
        TokenKind::PreprocessorDirective
    }
}

// Helper functions

fn is_extra(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{000C}' | '\u{00A0}')
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_type_character(c: char) -> bool {
    matches!(c, '$' | '%' | '&' | '@' | '#' | '!')
}

fn is_float_suffix(c: char) -> bool {
    matches!(c, 'f' | 'F' | 'r' | 'R' | 'd' | 'D' | '!' | '#' | '@')
}

fn is_date_character(c: char) -> bool {
    c.is_ascii_digit()
        || matches!(
            c,
            '/' | '-' | ':' | ' ' | '\t' | 'A' | 'P' | 'M' | 'a' | 'p' | 'm'
        )
}

// Public API

pub fn lex(source: &str) -> Tokens {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token();
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    log::debug!(
        "lexed {} tokens, {} trivia, {} errors",
        tokens.len(),
        lexer.trivia.len(),
        lexer.errors.len()
    );

    Tokens {
        list: tokens,
        trivia: lexer.trivia,
        errors: lexer.errors,
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).list.iter().map(|t| t.kind).collect()
    }

    fn lex_single(source: &str) -> TokenKind {
        lex(source).list[0].kind
    }

    #[test]
    fn test_keywords_any_case() {
        for spelling in ["sub", "Sub", "SUB", "sUb"] {
            assert_eq!(lex_single(spelling), TokenKind::Keyword(Keyword::Sub));
        }
        assert_eq!(lex_single("endif"), TokenKind::Identifier);
        assert_eq!(lex_single("ELSEIF"), TokenKind::Keyword(Keyword::ElseIf));
        assert_eq!(
            lex_single("notinheritable"),
            TokenKind::Keyword(Keyword::NotInheritable)
        );
    }

    #[test]
    fn test_keyword_table_is_indexed_by_discriminant() {
        for (index, (keyword, spelling, _)) in KEYWORDS.iter().enumerate() {
            assert_eq!(*keyword as usize, index);
            assert_eq!(keyword.as_str(), *spelling);
            assert!(spelling.len() <= MAX_KEYWORD_LEN);
            assert_eq!(Keyword::lookup(&spelling.to_uppercase()), Some(*keyword));
        }
    }

    #[test]
    fn test_keyword_flags() {
        assert!(Keyword::Public.is_modifier());
        assert!(Keyword::Integer.is_primitive_type());
        assert!(Keyword::Text.is_identifier_like());
        assert!(Keyword::String.is_identifier_like());
        assert!(!Keyword::Sub.is_identifier_like());
        assert!(Keyword::Nothing.flags().contains(KeywordFlags::LITERAL));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(lex_single("foo"), TokenKind::Identifier);
        assert_eq!(lex_single("_count"), TokenKind::Identifier);
        assert_eq!(lex_single("Subtotal"), TokenKind::Identifier);
        assert_eq!(lex_single("name$"), TokenKind::Identifier);
        // A type character wins over the keyword match
        assert_eq!(lex_single("Sub$"), TokenKind::Identifier);
        assert_eq!(lex_single("[Class]"), TokenKind::Identifier);
        assert_eq!(lex("[Class]").list[0].end, 7);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex_single("42"), TokenKind::IntegerLiteral);
        assert_eq!(lex_single("42L"), TokenKind::IntegerLiteral);
        assert_eq!(lex_single("42US"), TokenKind::IntegerLiteral);
        assert_eq!(lex_single("&HFF"), TokenKind::IntegerLiteral);
        assert_eq!(lex_single("&o17"), TokenKind::IntegerLiteral);
        assert_eq!(lex_single("3.14"), TokenKind::FloatLiteral);
        assert_eq!(lex_single(".5"), TokenKind::FloatLiteral);
        assert_eq!(lex_single("1e10"), TokenKind::FloatLiteral);
        assert_eq!(lex_single("2.5E-3"), TokenKind::FloatLiteral);
        assert_eq!(lex_single("10D"), TokenKind::FloatLiteral);
        assert_eq!(lex_single("1.5!"), TokenKind::FloatLiteral);

        let tokens = lex("&HFFL");
        assert_eq!(tokens.list[0].end, 5);
    }

    #[test]
    fn test_member_access_on_integer() {
        assert_eq!(
            kinds("1.ToString"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_chars() {
        assert_eq!(lex_single(r#""hello""#), TokenKind::StringLiteral);
        assert_eq!(lex_single(r#""say ""hi""""#), TokenKind::StringLiteral);
        assert_eq!(lex_single(r#""""#), TokenKind::StringLiteral);
        assert_eq!(lex_single(r#""a"c"#), TokenKind::CharacterLiteral);
        assert_eq!(lex_single(r#"""""C"#), TokenKind::CharacterLiteral);
        // More than one character is a string followed by an identifier
        assert_eq!(
            kinds(r#""ab"c"#),
            vec![
                TokenKind::StringLiteral,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_single_error_char() {
        let tokens = lex("\"abc\nx");
        assert_eq!(tokens.list[0].kind, TokenKind::Error);
        assert_eq!(tokens.list[0].end, 1);
        assert_eq!(tokens.list[1].kind, TokenKind::Identifier);
        assert_eq!(tokens.errors.len(), 1);
        assert!(tokens.errors[0].message.contains("Unterminated"));
    }

    #[test]
    fn test_date_literal_and_directive() {
        assert_eq!(lex_single("#1/15/2024#"), TokenKind::DateLiteral);
        assert_eq!(lex_single("#12:30 PM#"), TokenKind::DateLiteral);
        assert_eq!(kinds("#  #"), vec![TokenKind::PreprocessorDirective, TokenKind::Eof]);
        assert_eq!(
            kinds("#Region \"Helpers\"\nx"),
            vec![
                TokenKind::PreprocessorDirective,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_trivia() {
        let tokens = lex("x ' note\nREM whole line\ny");
        let token_kinds: Vec<_> = tokens.list.iter().map(|t| t.kind).collect();
        assert_eq!(
            token_kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
        let comments = tokens
            .trivia
            .iter()
            .filter(|t| t.kind == TriviaKind::Comment)
            .count();
        assert_eq!(comments, 2);
    }

    #[test]
    fn test_rem_needs_word_boundary() {
        assert_eq!(lex_single("Remove"), TokenKind::Identifier);
        assert_eq!(lex_single("rem"), TokenKind::Eof);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            kinds("a = 1 + _\n    2\n"),
            vec![
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Plus,
                TokenKind::IntegerLiteral,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
        // Trailing whitespace and CRLF after the underscore
        assert!(!kinds("a _  \r\nb").contains(&TokenKind::Newline));
        // An underscore not followed by a newline is an identifier
        assert_eq!(lex_single("_ x"), TokenKind::Identifier);
    }

    #[test]
    fn test_dot_and_comma_absorb_newline() {
        let tokens = lex("a.\nb");
        assert_eq!(tokens.list[1].kind, TokenKind::Dot);
        assert_eq!(tokens.list[1].end, 3);
        assert_eq!(tokens.list[2].line, 2);
        assert!(!kinds("f(1,\n2)").contains(&TokenKind::Newline));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("<> <= >= << >> <<= >>= += &= \\ ^ &"),
            vec![
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::LtLt,
                TokenKind::GtGt,
                TokenKind::LtLtEq,
                TokenKind::GtGtEq,
                TokenKind::PlusEq,
                TokenKind::AmpersandEq,
                TokenKind::Backslash,
                TokenKind::Caret,
                TokenKind::Ampersand,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_terminators() {
        assert_eq!(
            kinds("a: b\r\n"),
            vec![
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unexpected_character_recovers() {
        let tokens = lex("a ? b");
        assert_eq!(
            tokens.list.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Identifier,
                TokenKind::Error,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens.errors[0].column, 3);
    }

    #[test]
    fn test_position_tracking() {
        let tokens = lex("foo bar\nbaz");
        assert_eq!((tokens.get(0).line, tokens.get(0).column), (1, 1));
        assert_eq!((tokens.get(1).line, tokens.get(1).column), (1, 5));
        assert_eq!((tokens.get(3).line, tokens.get(3).column), (2, 1));
        // Past the end yields the end-of-file token
        assert_eq!(tokens.get(99).kind, TokenKind::Eof);
    }

    #[test]
    fn test_reconstruct_is_byte_exact() {
        let source = "Module M ' comment\r\n  Sub Main() : x = 1 + _\n 2 \u{00A0}\n  End Sub\nEnd Module ?";
        let tokens = lex(source);
        assert_eq!(tokens.reconstruct(source), source);
    }

    #[test]
    fn test_empty_source() {
        let tokens = lex("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens.peek_kind(0), TokenKind::Eof);
    }
}
