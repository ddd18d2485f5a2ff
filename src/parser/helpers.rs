use super::error::ParseError;
use super::{Block, NodeBuilder, OpenBlock, Parser};
use crate::cst::{Diagnostic, DiagnosticKind, Node, NodeFlags, NodeId, NodeKind, Span};
use crate::lexer::{Keyword, Token, TokenKind};

/// Keyword or plain identifier usable in a name position
pub(super) fn is_identifier_like(kind: TokenKind) -> bool {
    match kind {
        TokenKind::Identifier => true,
        TokenKind::Keyword(keyword) => keyword.is_identifier_like(),
        _ => false,
    }
}

// Keywords that begin a declaration inside a type body
fn is_declaration_keyword(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Keyword(
            Keyword::Sub
                | Keyword::Function
                | Keyword::Property
                | Keyword::Event
                | Keyword::Class
                | Keyword::Structure
                | Keyword::Interface
                | Keyword::Enum
                | Keyword::Module
                | Keyword::Delegate
                | Keyword::Namespace
        )
    )
}

// Parser helper methods
impl<'a> Parser<'a> {
    pub(crate) fn new_unexpected_token(&self, expected: &str) -> ParseError {
        ParseError::unexpected_token(expected, self.current_token(), self.current, self.source)
    }

    // Helper: Check recursion depth limit
    pub(super) fn check_depth(&self, depth: usize) -> Result<(), ParseError> {
        if depth >= self.limits.max_nesting_depth {
            return Err(ParseError::from_token(
                format!(
                    "Parsing nesting too deep: {} levels (max {}). Consider simplifying.",
                    depth, self.limits.max_nesting_depth
                ),
                self.current_token(),
                self.current,
            ));
        }
        Ok(())
    }

    /// Helper: Advance to the next token, stopping at end of file
    pub(super) fn advance(&mut self) {
        self.current = (self.current + 1).min(self.tokens.len() - 1);
    }

    /// Helper: peek current token
    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.tokens.peek_kind(self.current)
    }

    /// Helper: peek n tokens ahead
    pub(crate) fn peek_next_kind(&self, n: usize) -> TokenKind {
        self.tokens.peek_kind(self.current + n)
    }

    pub(crate) fn peek_kind_is(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(super) fn kind_at(&self, index: usize) -> TokenKind {
        self.tokens.peek_kind(index)
    }

    // Helper: Get current token
    pub(super) fn current_token(&self) -> &Token {
        self.tokens.get(self.current)
    }

    pub(super) fn at_keyword(&self, keyword: Keyword) -> bool {
        self.peek_kind().is_keyword(keyword)
    }

    pub(super) fn at_identifier(&self) -> bool {
        is_identifier_like(self.peek_kind())
    }

    /// Newline, `:`, end of file, or `Else` inside a single-line If
    pub(super) fn at_terminator(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Colon | TokenKind::Eof => true,
            TokenKind::Keyword(Keyword::Else) => self.single_line_if > 0,
            _ => false,
        }
    }

    /// Index of the first terminator or end of file at or after `index`
    pub(super) fn line_end(&self, mut index: usize) -> usize {
        while !matches!(
            self.kind_at(index),
            TokenKind::Newline | TokenKind::Colon | TokenKind::Eof
        ) {
            index += 1;
        }
        index
    }

    // Node construction

    pub(super) fn start(&self, kind: NodeKind) -> NodeBuilder {
        NodeBuilder {
            kind,
            start: self.current,
            children: Vec::new(),
            fields: Vec::new(),
            flags: NodeFlags::empty(),
        }
    }

    /// Start a node whose first child was already built
    pub(super) fn start_at(&self, kind: NodeKind, first: NodeId) -> NodeBuilder {
        NodeBuilder {
            start: self.nodes[first].first_token,
            ..self.start(kind)
        }
    }

    // Span covers every token consumed since the builder started, terminators included
    fn span_from(&self, start: usize) -> Span {
        if start < self.current {
            Span::new(
                self.tokens.get(start).start,
                self.tokens.get(self.current - 1).end,
            )
        } else {
            let at = self.current_token().start;
            Span::new(at, at)
        }
    }

    pub(super) fn finish(&mut self, builder: NodeBuilder) -> NodeId {
        let span = self.span_from(builder.start);
        let mut flags = builder.flags;
        if builder
            .children
            .iter()
            .any(|child| self.nodes[*child].has_error())
        {
            flags |= NodeFlags::HAS_ERROR;
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: builder.kind,
            span,
            children: builder.children,
            fields: builder.fields,
            token: None,
            parent: None,
            flags,
            first_token: builder.start,
        });
        id
    }

    /// Consume the current token as a leaf of the given kind
    pub(super) fn leaf(&mut self, kind: NodeKind) -> NodeId {
        let token_idx = self.current;
        let token = *self.current_token();
        self.advance();

        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            span: Span::new(token.start, token.end),
            children: Vec::new(),
            fields: Vec::new(),
            token: Some(token_idx),
            parent: None,
            flags: NodeFlags::empty(),
            first_token: token_idx,
        });
        id
    }

    /// Consume the current token as an anonymous leaf
    pub(super) fn token_leaf(&mut self) -> NodeId {
        self.leaf(NodeKind::Token(self.peek_kind()))
    }

    /// Wrap a finished node in a single-child parent
    pub(super) fn wrap(&mut self, kind: NodeKind, inner: NodeId) -> NodeId {
        let mut builder = self.start_at(kind, inner);
        builder.child(inner);
        self.finish(builder)
    }

    /// Helper: Consume a specific token kind or error
    pub(super) fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<NodeId, ParseError> {
        if !self.peek_kind_is(kind) {
            return Err(self.new_unexpected_token(expected));
        }
        Ok(self.token_leaf())
    }

    pub(super) fn expect_keyword(&mut self, keyword: Keyword) -> Result<NodeId, ParseError> {
        if !self.at_keyword(keyword) {
            return Err(self.new_unexpected_token(&format!("'{}'", keyword.as_str())));
        }
        Ok(self.token_leaf())
    }

    pub(super) fn eat(&mut self, kind: TokenKind) -> Option<NodeId> {
        if self.peek_kind_is(kind) {
            Some(self.token_leaf())
        } else {
            None
        }
    }

    pub(super) fn eat_keyword(&mut self, keyword: Keyword) -> Option<NodeId> {
        self.eat(TokenKind::Keyword(keyword))
    }

    pub(super) fn identifier(&mut self) -> Result<NodeId, ParseError> {
        if !self.at_identifier() {
            return Err(self.new_unexpected_token("identifier"));
        }
        Ok(self.leaf(NodeKind::Identifier))
    }

    /// Any word is a name after a member-access dot
    pub(super) fn member_name(&mut self) -> Result<NodeId, ParseError> {
        match self.peek_kind() {
            TokenKind::Identifier | TokenKind::Keyword(_) => Ok(self.leaf(NodeKind::Identifier)),
            _ => Err(self.new_unexpected_token("member name")),
        }
    }

    // Terminators

    /// Consume a statement terminator; end of file and a single-line `Else` are left in place
    pub(super) fn expect_terminator(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Colon => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            TokenKind::Keyword(Keyword::Else) if self.single_line_if > 0 => Ok(()),
            _ => Err(self.new_unexpected_token("end of statement")),
        }
    }

    /// Terminator after a block closer; trailing junk becomes an error child
    pub(super) fn terminator_or_recover(&mut self, builder: &mut NodeBuilder) {
        if let Err(err) = self.expect_terminator() {
            let error = self.recover_line(err);
            builder.child(error);
        }
    }

    // Block tracking

    pub(super) fn open_block(&mut self, block: Block) {
        let line = self.current_token().line;
        self.open_block_at(block, line);
    }

    /// Open a block whose opener line was already consumed
    pub(super) fn open_block_at(&mut self, block: Block, line: usize) {
        self.open_blocks.push(OpenBlock { block, line });
    }

    pub(super) fn is_open(&self, block: Block) -> bool {
        self.open_blocks.iter().any(|open| open.block == block)
    }

    pub(super) fn innermost_block(&self) -> Option<Block> {
        self.open_blocks.last().map(|open| open.block)
    }

    pub(super) fn at_closer(&self, block: Block) -> bool {
        match block {
            Block::Do => self.at_keyword(Keyword::Loop),
            Block::For => self.at_keyword(Keyword::Next),
            _ => {
                self.at_keyword(Keyword::End)
                    && self.peek_next_kind(1).is_keyword(block.keyword())
            }
        }
    }

    /// Pop `block` and consume its closer, or flag the node as partial
    pub(super) fn close_block(&mut self, builder: &mut NodeBuilder, block: Block) -> bool {
        let opened = self.open_blocks.pop();

        if self.at_closer(block) {
            if block.closed_by_end() {
                let end = self.token_leaf();
                builder.child(end);
            }
            let keyword = self.token_leaf();
            builder.child(keyword);
            return true;
        }

        builder.flag(NodeFlags::PARTIAL);
        let line = opened.map_or(0, |open| open.line);
        let message = format!(
            "Expected '{}' to close '{}' opened at line {}",
            block.closer_text(),
            block.keyword().as_str(),
            line
        );
        let token = *self.current_token();
        log::debug!("{}:{}: {}", token.line, token.column, message);
        self.diagnostics.push(Diagnostic {
            kind: DiagnosticKind::StructuralMismatch,
            message,
            span: Span::new(token.start, token.start),
            line: token.line,
            column: token.column,
        });
        false
    }

    /// Whether the current line ends the innermost statement list
    pub(super) fn at_block_boundary(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Eof => true,
            TokenKind::Keyword(Keyword::End) => match self.peek_next_kind(1) {
                TokenKind::Keyword(keyword) => {
                    Block::from_end_keyword(keyword).is_some_and(|block| self.is_open(block))
                }
                _ => false,
            },
            TokenKind::Keyword(Keyword::Loop) => self.is_open(Block::Do),
            TokenKind::Keyword(Keyword::Next) => self.is_open(Block::For),
            TokenKind::Keyword(Keyword::Else | Keyword::ElseIf) => self.is_open(Block::If),
            TokenKind::Keyword(Keyword::Case) => self.is_open(Block::Select),
            TokenKind::Keyword(Keyword::Catch | Keyword::Finally) => self.is_open(Block::Try),
            TokenKind::Keyword(Keyword::Get | Keyword::Set) => self.is_open(Block::Property),
            TokenKind::Keyword(
                Keyword::AddHandler | Keyword::RemoveHandler | Keyword::RaiseEvent,
            ) => {
                self.is_open(Block::Event)
                    && matches!(
                        self.peek_next_kind(1),
                        TokenKind::LParen | TokenKind::Newline | TokenKind::Colon
                    )
            }
            _ => self.in_member_body() && self.member_start_at(self.current),
        }
    }

    // Inside a member (or enum) nested in a type body
    fn in_member_body(&self) -> bool {
        match self.innermost_block() {
            Some(Block::Namespace) | None => false,
            Some(block) if block.holds_members() => false,
            Some(_) => self.open_blocks.iter().any(|open| open.block.holds_members()),
        }
    }

    /// Whether the line at `index` starts a member declaration
    pub(super) fn member_start_at(&self, mut index: usize) -> bool {
        if self.kind_at(index) == TokenKind::Lt {
            return true;
        }

        let mut saw_modifier = false;
        loop {
            match self.kind_at(index) {
                TokenKind::Keyword(keyword)
                    if keyword.is_modifier() && keyword != Keyword::Static =>
                {
                    // `Async`, `Iterator` and `Custom` may also be plain names
                    saw_modifier |= !keyword.is_identifier_like();
                    index += 1;
                }
                _ => break,
            }
        }

        saw_modifier || is_declaration_keyword(self.kind_at(index))
    }

    // Error recovery

    /// Error region from the current token through the end of the line
    pub(super) fn recover_line(&mut self, err: ParseError) -> NodeId {
        log::debug!("recovering from {}", err);

        let mut builder = self.start(NodeKind::Error);
        builder.flag(NodeFlags::ERROR);
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Newline | TokenKind::Colon => {
                    self.advance();
                    break;
                }
                TokenKind::Keyword(Keyword::Else)
                    if self.single_line_if > 0 && builder.start < self.current =>
                {
                    break;
                }
                _ => self.advance(),
            }
        }
        let id = self.finish(builder);

        self.diagnostics.push(Diagnostic {
            kind: DiagnosticKind::Syntax,
            message: err.message,
            span: self.nodes[id].span,
            line: err.line,
            column: err.column,
        });
        id
    }

    /// Run `parse`; on failure rewind and cover the line with an error node
    pub(super) fn parse_or_recover(
        &mut self,
        depth: usize,
        parse: fn(&mut Parser<'a>, usize) -> Result<NodeId, ParseError>,
    ) -> NodeId {
        let checkpoint = self.checkpoint();
        match parse(self, depth) {
            Ok(id) => id,
            Err(err) => {
                self.restore(checkpoint);
                self.recover_line(err)
            }
        }
    }
}
