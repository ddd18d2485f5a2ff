// Structural queries over a parsed tree
//
// Patterns use the tree-sitter s-expression form:
//   (method_declaration name: (identifier) @method.name)
// A parenthesized pattern names a node kind (or `_` for any named node), child patterns
// match named children in order, `field:` restricts a child pattern to one field, and
// `@name` captures the matched node.

use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use crate::cst::{Field, NodeId, NodeKind, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown node kind '{name}' at offset {offset}")]
    UnknownNodeKind { offset: usize, name: String },

    #[error("unknown field '{name}' at offset {offset}")]
    UnknownField { offset: usize, name: String },

    #[error("unknown capture '@{0}'")]
    UnknownCapture(String),
}

#[derive(Debug, Clone, PartialEq)]
enum KindPattern {
    Any,
    Kind(NodeKind),
}

#[derive(Debug, Clone, PartialEq)]
struct Pattern {
    kind: KindPattern,
    children: Vec<ChildPattern>,
    captures: Vec<usize>, // indices into Query::capture_names
}

#[derive(Debug, Clone, PartialEq)]
struct ChildPattern {
    field: Option<Field>,
    pattern: Pattern,
}

/// A compiled set of patterns
#[derive(Debug, Clone)]
pub struct Query {
    patterns: Vec<Pattern>,
    capture_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCapture {
    pub index: usize,
    pub node: NodeId,
}

/// One successful match of a top-level pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    pub pattern_index: usize,
    pub node: NodeId,
    pub captures: Vec<QueryCapture>,
}

impl QueryMatch {
    /// Nodes captured under `name` in this match
    pub fn nodes_for_capture(&self, query: &Query, name: &str) -> Vec<NodeId> {
        match query.capture_index(name) {
            Some(index) => self
                .captures
                .iter()
                .filter(|capture| capture.index == index)
                .map(|capture| capture.node)
                .collect(),
            None => Vec::new(),
        }
    }
}

impl Query {
    pub fn new(source: &str) -> Result<Self, QueryError> {
        let mut parser = QueryParser {
            source,
            chars: source.char_indices().peekable(),
            capture_names: Vec::new(),
        };

        let mut patterns = Vec::new();
        loop {
            parser.skip_whitespace();
            if parser.peek().is_none() {
                break;
            }
            patterns.push(parser.parse_pattern()?);
        }

        if patterns.is_empty() {
            return Err(QueryError::Syntax {
                offset: 0,
                message: "empty query".to_string(),
            });
        }

        Ok(Self {
            patterns,
            capture_names: parser.capture_names,
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }

    pub fn capture_index(&self, name: &str) -> Option<usize> {
        self.capture_names.iter().position(|n| n == name)
    }

    /// All matches in document order; patterns are tried in order at each node
    pub fn matches(&self, tree: &Tree) -> Vec<QueryMatch> {
        let mut matches = Vec::new();
        for node in tree.descendants(tree.root()) {
            for (pattern_index, pattern) in self.patterns.iter().enumerate() {
                let mut captures = Vec::new();
                if match_pattern(tree, pattern, node, &mut captures) {
                    matches.push(QueryMatch {
                        pattern_index,
                        node,
                        captures,
                    });
                }
            }
        }
        log::debug!("query produced {} matches", matches.len());
        matches
    }

    /// Every capture in match order, paired with its name
    pub fn captures<'q>(&'q self, tree: &Tree) -> Vec<(&'q str, NodeId)> {
        self.matches(tree)
            .into_iter()
            .flat_map(|m| m.captures)
            .map(|capture| (self.capture_names[capture.index].as_str(), capture.node))
            .collect()
    }
}

fn match_pattern(
    tree: &Tree,
    pattern: &Pattern,
    node: NodeId,
    captures: &mut Vec<QueryCapture>,
) -> bool {
    let kind = tree.kind(node);
    let kind_matches = match pattern.kind {
        KindPattern::Any => kind.is_named(),
        KindPattern::Kind(expected) => kind == expected,
    };
    if !kind_matches {
        return false;
    }

    let mark = captures.len();
    captures.extend(pattern.captures.iter().map(|&index| QueryCapture { index, node }));
    if match_children(tree, node, tree.children(node), &pattern.children, captures) {
        return true;
    }
    captures.truncate(mark);
    false
}

// Child patterns match distinct children in order
fn match_children(
    tree: &Tree,
    parent: NodeId,
    children: &[NodeId],
    patterns: &[ChildPattern],
    captures: &mut Vec<QueryCapture>,
) -> bool {
    let Some((first, rest)) = patterns.split_first() else {
        return true;
    };

    for (i, &child) in children.iter().enumerate() {
        let candidate = match first.field {
            Some(field) => tree.children_by_field(parent, field).contains(&child),
            None => tree.node(child).is_named(),
        };
        if !candidate {
            continue;
        }

        let mark = captures.len();
        if match_pattern(tree, &first.pattern, child, captures)
            && match_children(tree, parent, &children[i + 1..], rest, captures)
        {
            return true;
        }
        captures.truncate(mark);
    }
    false
}

struct QueryParser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    capture_names: Vec<String>,
}

impl<'a> QueryParser<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |(i, _)| *i)
    }

    fn error(&mut self, message: &str) -> QueryError {
        QueryError::Syntax {
            offset: self.offset(),
            message: message.to_string(),
        }
    }

    // Whitespace and `;` line comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else if c == ';' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.chars.next();
                }
            } else {
                break;
            }
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.offset();
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            self.chars.next();
        }
        let end = self.offset();
        &self.source[start..end]
    }

    fn parse_pattern(&mut self) -> Result<Pattern, QueryError> {
        let mut pattern = match self.peek() {
            Some('(') => self.parse_node_pattern()?,
            Some('_') => {
                self.chars.next();
                Pattern {
                    kind: KindPattern::Any,
                    children: Vec::new(),
                    captures: Vec::new(),
                }
            }
            _ => return Err(self.error("expected '(' or '_'")),
        };

        self.parse_captures(&mut pattern)?;
        Ok(pattern)
    }

    // (kind child*)
    fn parse_node_pattern(&mut self) -> Result<Pattern, QueryError> {
        self.chars.next(); // '('
        self.skip_whitespace();

        let offset = self.offset();
        let name = self.word();
        let kind = match name {
            "" => return Err(self.error("expected node kind")),
            "_" => KindPattern::Any,
            name => match NodeKind::from_name(name) {
                Some(kind) => KindPattern::Kind(kind),
                None => {
                    return Err(QueryError::UnknownNodeKind {
                        offset,
                        name: name.to_string(),
                    });
                }
            },
        };

        let mut children = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(')') => {
                    self.chars.next();
                    break;
                }
                Some('(' | '_') => {
                    let pattern = self.parse_pattern()?;
                    children.push(ChildPattern {
                        field: None,
                        pattern,
                    });
                }
                Some(c) if c.is_alphabetic() => {
                    let child = self.parse_field_pattern()?;
                    children.push(child);
                }
                Some(_) => return Err(self.error("unexpected character in pattern")),
                None => return Err(self.error("unclosed '('")),
            }
        }

        Ok(Pattern {
            kind,
            children,
            captures: Vec::new(),
        })
    }

    // field: pattern
    fn parse_field_pattern(&mut self) -> Result<ChildPattern, QueryError> {
        let offset = self.offset();
        let name = self.word();
        let Some(field) = Field::from_name(name) else {
            return Err(QueryError::UnknownField {
                offset,
                name: name.to_string(),
            });
        };

        self.skip_whitespace();
        if self.peek() != Some(':') {
            return Err(self.error("expected ':' after field name"));
        }
        self.chars.next();
        self.skip_whitespace();

        let pattern = self.parse_pattern()?;
        Ok(ChildPattern {
            field: Some(field),
            pattern,
        })
    }

    fn parse_captures(&mut self, pattern: &mut Pattern) -> Result<(), QueryError> {
        loop {
            self.skip_whitespace();
            if self.peek() != Some('@') {
                return Ok(());
            }
            self.chars.next();

            let name = self.word();
            if name.is_empty() {
                return Err(self.error("expected capture name after '@'"));
            }
            let index = match self.capture_names.iter().position(|n| n == name) {
                Some(index) => index,
                None => {
                    self.capture_names.push(name.to_string());
                    self.capture_names.len() - 1
                }
            };
            pattern.captures.push(index);
        }
    }
}

impl Tree {
    /// Text of every node captured under `capture` by `pattern`, in document order
    pub fn capture_texts(&self, pattern: &str, capture: &str) -> Result<Vec<&str>, QueryError> {
        let query = Query::new(pattern)?;
        let Some(index) = query.capture_index(capture) else {
            return Err(QueryError::UnknownCapture(capture.to_string()));
        };

        Ok(query
            .matches(self)
            .into_iter()
            .flat_map(|m| m.captures)
            .filter(|c| c.index == index)
            .map(|c| self.text(c.node))
            .collect())
    }
}
