use thiserror::Error;

use crate::lexer::{Token, TokenKind};

// Local non-match: the production did not apply at this position.
// Callers backtrack on it or turn it into an error region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub token_idx: usize,
}

impl ParseError {
    pub(super) fn from_token(message: String, token: &Token, token_idx: usize) -> Self {
        Self {
            message,
            line: token.line,
            column: token.column,
            token_idx,
        }
    }

    pub(super) fn unexpected_token(
        expected: &str,
        token: &Token,
        token_idx: usize,
        source: &str,
    ) -> Self {
        let found = match &token.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Identifier => format!("identifier '{}'", token.text(source)),
            TokenKind::Keyword(keyword) => format!("keyword '{}'", keyword.as_str()),
            TokenKind::Error => format!("invalid input '{}'", token.text(source)),
            kind if kind.as_str().ends_with("literal") => {
                format!("{} {}", kind.as_str(), token.text(source))
            }
            kind => format!("'{}'", kind.as_str()),
        };

        Self::from_token(
            format!("Expected {}, found {}", expected, found),
            token,
            token_idx,
        )
    }

    /// Keep whichever error got further into the input
    pub(super) fn furthest(self, other: ParseError) -> ParseError {
        if other.token_idx > self.token_idx {
            other
        } else {
            self
        }
    }
}
