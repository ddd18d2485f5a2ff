// Parser module - splits parser into logical components
mod declarations;
mod error;
mod expressions;
mod helpers;
mod resolver;
mod statements;
mod types;

// Public exports
pub use error::ParseError;
pub use expressions::{Associativity, PRECEDENCE_TABLE, PrecedenceEntry};
pub use resolver::{CONFLICTS, Conflict};

use crate::cst::{Diagnostic, DiagnosticKind, Field, Node, NodeFlags, NodeId, NodeKind, Span, Tree};
use crate::lexer::{self, Keyword, Tokens};
use crate::limits::{LimitError, ParserLimits};

// Blocks that must be closed by a matching closer line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
    Namespace,
    Class,
    Module,
    Structure,
    Interface,
    Enum,
    Sub,
    Function,
    Property,
    Get,
    Set,
    Event,
    AddHandler,
    RemoveHandler,
    RaiseEvent,
    If,
    Select,
    While,
    Do,
    For,
    Try,
    With,
    Using,
    SyncLock,
}

impl Block {
    /// Keyword that follows `End` in the closer (or the opener keyword for `Loop`/`Next` blocks)
    pub(crate) fn keyword(self) -> Keyword {
        match self {
            Block::Namespace => Keyword::Namespace,
            Block::Class => Keyword::Class,
            Block::Module => Keyword::Module,
            Block::Structure => Keyword::Structure,
            Block::Interface => Keyword::Interface,
            Block::Enum => Keyword::Enum,
            Block::Sub => Keyword::Sub,
            Block::Function => Keyword::Function,
            Block::Property => Keyword::Property,
            Block::Get => Keyword::Get,
            Block::Set => Keyword::Set,
            Block::Event => Keyword::Event,
            Block::AddHandler => Keyword::AddHandler,
            Block::RemoveHandler => Keyword::RemoveHandler,
            Block::RaiseEvent => Keyword::RaiseEvent,
            Block::If => Keyword::If,
            Block::Select => Keyword::Select,
            Block::While => Keyword::While,
            Block::Do => Keyword::Do,
            Block::For => Keyword::For,
            Block::Try => Keyword::Try,
            Block::With => Keyword::With,
            Block::Using => Keyword::Using,
            Block::SyncLock => Keyword::SyncLock,
        }
    }

    pub(crate) fn closed_by_end(self) -> bool {
        !matches!(self, Block::Do | Block::For)
    }

    pub(crate) fn closer_text(self) -> String {
        match self {
            Block::Do => "Loop".to_string(),
            Block::For => "Next".to_string(),
            block => format!("End {}", block.keyword().as_str()),
        }
    }

    /// Blocks whose bodies hold member declarations
    pub(crate) fn holds_members(self) -> bool {
        matches!(
            self,
            Block::Class | Block::Module | Block::Structure | Block::Interface
        )
    }

    fn from_end_keyword(keyword: Keyword) -> Option<Block> {
        let block = match keyword {
            Keyword::Namespace => Block::Namespace,
            Keyword::Class => Block::Class,
            Keyword::Module => Block::Module,
            Keyword::Structure => Block::Structure,
            Keyword::Interface => Block::Interface,
            Keyword::Enum => Block::Enum,
            Keyword::Sub => Block::Sub,
            Keyword::Function => Block::Function,
            Keyword::Property => Block::Property,
            Keyword::Get => Block::Get,
            Keyword::Set => Block::Set,
            Keyword::Event => Block::Event,
            Keyword::AddHandler => Block::AddHandler,
            Keyword::RemoveHandler => Block::RemoveHandler,
            Keyword::RaiseEvent => Block::RaiseEvent,
            Keyword::If => Block::If,
            Keyword::Select => Block::Select,
            Keyword::While => Block::While,
            Keyword::Try => Block::Try,
            Keyword::With => Block::With,
            Keyword::Using => Block::Using,
            Keyword::SyncLock => Block::SyncLock,
            _ => return None,
        };
        Some(block)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    block: Block,
    line: usize, // line of the opener, for diagnostics
}

// Saved parser state for backtracking
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    current: usize,
    nodes: usize,
    diagnostics: usize,
    open_blocks: usize,
    single_line_if: usize,
}

// A node under construction; children are finished before their parent
#[derive(Debug)]
pub(crate) struct NodeBuilder {
    kind: NodeKind,
    start: usize, // first token index
    children: Vec<NodeId>,
    fields: Vec<(Field, NodeId)>,
    flags: NodeFlags,
}

impl NodeBuilder {
    pub(crate) fn child(&mut self, id: NodeId) {
        self.children.push(id);
    }

    pub(crate) fn field(&mut self, field: Field, id: NodeId) {
        self.children.push(id);
        self.fields.push((field, id));
    }

    pub(crate) fn flag(&mut self, flag: NodeFlags) {
        self.flags |= flag;
    }
}

// Parser structure
pub struct Parser<'a> {
    source: &'a str,
    tokens: &'a Tokens,
    current: usize,
    nodes: Vec<Node>,
    diagnostics: Vec<Diagnostic>,
    limits: ParserLimits,
    open_blocks: Vec<OpenBlock>,
    single_line_if: usize, // > 0 while parsing the branches of a single-line If
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: &'a Tokens, limits: ParserLimits) -> Self {
        Self {
            source,
            tokens,
            current: 0,
            nodes: Vec::new(),
            diagnostics: Vec::new(),
            limits,
            open_blocks: Vec::new(),
            single_line_if: 0,
        }
    }

    // Main parsing entry point; never fails
    pub fn parse(mut self) -> Tree {
        for error in &self.tokens.errors {
            self.diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Lex,
                message: error.message.clone(),
                span: Span::new(error.start, error.end),
                line: error.line,
                column: error.column,
            });
        }

        let root = self.parse_source_file();
        self.diagnostics.sort_by_key(|d| d.span.start);

        log::debug!(
            "parsed {} nodes from {} tokens with {} diagnostics",
            self.nodes.len(),
            self.tokens.len(),
            self.diagnostics.len()
        );

        Tree::new(self.source.to_string(), self.nodes, root, self.diagnostics)
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current: self.current,
            nodes: self.nodes.len(),
            diagnostics: self.diagnostics.len(),
            open_blocks: self.open_blocks.len(),
            single_line_if: self.single_line_if,
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.current = checkpoint.current;
        self.nodes.truncate(checkpoint.nodes);
        self.diagnostics.truncate(checkpoint.diagnostics);
        self.open_blocks.truncate(checkpoint.open_blocks);
        self.single_line_if = checkpoint.single_line_if;
    }
}

// Public API functions

/// Parse source text into a tree; always succeeds, errors become flagged nodes
pub fn parse(source: &str) -> Tree {
    let tokens = lexer::lex(source);
    Parser::new(source, &tokens, ParserLimits::default()).parse()
}

/// Parse with explicit limits; fails only when the input or its token count is too large
pub fn parse_with_limits(source: &str, limits: &ParserLimits) -> Result<Tree, LimitError> {
    limits.check_input(source)?;
    let tokens = lexer::lex(source);
    limits.check_token_count(tokens.len())?;
    Ok(Parser::new(source, &tokens, limits.clone()).parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_closers() {
        assert_eq!(Block::If.closer_text(), "End If");
        assert_eq!(Block::Do.closer_text(), "Loop");
        assert_eq!(Block::For.closer_text(), "Next");
        assert_eq!(Block::from_end_keyword(Keyword::Sub), Some(Block::Sub));
        assert_eq!(Block::from_end_keyword(Keyword::Do), None);
        assert!(Block::Class.holds_members());
        assert!(!Block::Enum.holds_members());
    }

    #[test]
    fn test_parse_with_limits_rejects_large_input() {
        let limits = ParserLimits {
            max_input_size: 8,
            ..Default::default()
        };
        let result = parse_with_limits("Module M\nEnd Module\n", &limits);
        assert!(matches!(result, Err(LimitError::InputTooLarge { .. })));
    }

    #[test]
    fn test_parse_with_limits_rejects_token_flood() {
        let limits = ParserLimits {
            max_token_count: 3,
            ..Default::default()
        };
        let result = parse_with_limits("Module M\nEnd Module\n", &limits);
        assert!(matches!(result, Err(LimitError::TooManyTokens { .. })));
    }

    #[test]
    fn test_checkpoint_restore_discards_nodes() {
        let source = "x = 1\n";
        let tokens = lexer::lex(source);
        let mut parser = Parser::new(source, &tokens, ParserLimits::default());
        let checkpoint = parser.checkpoint();
        parser.parse_expression(0).unwrap();
        assert!(parser.current > 0);
        assert!(!parser.nodes.is_empty());
        parser.restore(checkpoint);
        assert_eq!(parser.current, 0);
        assert!(parser.nodes.is_empty());
    }

    #[test]
    fn test_empty_source() {
        let tree = parse("");
        assert_eq!(tree.kind(tree.root()), NodeKind::SourceFile);
        assert!(tree.children(tree.root()).is_empty());
        assert!(!tree.has_error());
    }
}
