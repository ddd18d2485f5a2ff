pub mod cst;
pub mod lexer;
pub mod limits;
pub mod parser;
pub mod query;

pub use cst::{Diagnostic, DiagnosticKind, Field, Node, NodeFlags, NodeId, NodeKind, Span, Tree};
pub use limits::{LimitError, ParserLimits};
pub use parser::{parse, parse_with_limits};
pub use query::{Query, QueryError, QueryMatch};
