use super::{ParseError, Parser};
use crate::cst::NodeId;

/// Grammar positions where more than one production can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    TypeInvocation,
    Type,
    NewExpression,
    TypeArgumentList,
    PropertyDeclaration,
    ConstructorDeclaration,
    MethodDeclaration,
    LeftHandSideExpression,
    LabelStatementExpression,
    EventDeclaration,
    IfStatement,
}

/// Declared conflict sets in resolution order
pub static CONFLICTS: &[Conflict] = &[
    Conflict::TypeInvocation,
    Conflict::Type,
    Conflict::NewExpression,
    Conflict::TypeArgumentList,
    Conflict::PropertyDeclaration,
    Conflict::ConstructorDeclaration,
    Conflict::MethodDeclaration,
    Conflict::LeftHandSideExpression,
    Conflict::LabelStatementExpression,
    Conflict::EventDeclaration,
    Conflict::IfStatement,
];

impl Conflict {
    pub fn name(self) -> &'static str {
        match self {
            Conflict::TypeInvocation => "type/invocation",
            Conflict::Type => "type",
            Conflict::NewExpression => "new_expression",
            Conflict::TypeArgumentList => "type_argument_list",
            Conflict::PropertyDeclaration => "property_declaration",
            Conflict::ConstructorDeclaration => "constructor_declaration",
            Conflict::MethodDeclaration => "method_declaration",
            Conflict::LeftHandSideExpression => "left_hand_side/expression",
            Conflict::LabelStatementExpression => "label_statement/expression",
            Conflict::EventDeclaration => "event_declaration",
            Conflict::IfStatement => "if_statement",
        }
    }

    /// `Lookahead` conflicts never backtrack:
    /// - `type/invocation`, `type_argument_list`: `(` after a type name is a type argument
    ///   list only when `Of` follows it
    /// - `type`, `new_expression`: a type parsed after `New` takes no array rank, so its
    ///   `(...)` is always the argument list
    /// - `left_hand_side/expression`: a `(` on an assignment target is element access when
    ///   an assignment operator follows the matching `)`, otherwise an invocation
    pub fn resolution(self) -> Resolution {
        match self {
            Conflict::TypeInvocation
            | Conflict::Type
            | Conflict::NewExpression
            | Conflict::TypeArgumentList
            | Conflict::LeftHandSideExpression => Resolution::Lookahead,
            Conflict::PropertyDeclaration
            | Conflict::ConstructorDeclaration
            | Conflict::MethodDeclaration
            | Conflict::LabelStatementExpression
            | Conflict::EventDeclaration
            | Conflict::IfStatement => Resolution::Alternatives,
        }
    }

    /// Grammar rules taking part in the conflict
    pub fn rules(self) -> &'static [&'static str] {
        match self {
            Conflict::TypeInvocation => &["type", "invocation"],
            Conflict::Type => &["type"],
            Conflict::NewExpression => &["new_expression"],
            Conflict::TypeArgumentList => &["type_argument_list"],
            Conflict::PropertyDeclaration => &["property_declaration"],
            Conflict::ConstructorDeclaration => &["constructor_declaration"],
            Conflict::MethodDeclaration => &["method_declaration"],
            Conflict::LeftHandSideExpression => &["left_hand_side", "expression"],
            Conflict::LabelStatementExpression => &["label_statement", "expression"],
            Conflict::EventDeclaration => &["event_declaration"],
            Conflict::IfStatement => &["if_statement"],
        }
    }
}

/// How a conflict is settled at its parse site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Ordered `Alternative` table through `Parser::resolve`
    Alternatives,
    /// Fixed token lookahead before committing to one production
    Lookahead,
}

/// One candidate production at a conflict site
pub(super) struct Alternative<'a> {
    pub(super) name: &'static str,
    pub(super) viable: fn(&Parser<'a>) -> bool,
    pub(super) parse: fn(&mut Parser<'a>, usize) -> Result<NodeId, ParseError>,
}

pub(super) fn always(_: &Parser) -> bool {
    true
}

impl<'a> Parser<'a> {
    /// Try each viable alternative in order, rewinding completely after a failure.
    /// When none parses, the error that got furthest is returned.
    pub(super) fn resolve(
        &mut self,
        conflict: Conflict,
        depth: usize,
        alternatives: &[Alternative<'a>],
    ) -> Result<NodeId, ParseError> {
        debug_assert_eq!(conflict.resolution(), Resolution::Alternatives);
        self.check_depth(depth)?;

        let checkpoint = self.checkpoint();
        let mut furthest: Option<ParseError> = None;

        for alternative in alternatives {
            if !(alternative.viable)(self) {
                log::trace!("{}: skipping {}", conflict.name(), alternative.name);
                continue;
            }

            match (alternative.parse)(self, depth) {
                Ok(id) => {
                    log::trace!(
                        "{}: committed to {} at token {}",
                        conflict.name(),
                        alternative.name,
                        checkpoint.current
                    );
                    return Ok(id);
                }
                Err(err) => {
                    log::trace!(
                        "{}: {} failed, backtracking: {}",
                        conflict.name(),
                        alternative.name,
                        err
                    );
                    self.restore(checkpoint);
                    furthest = Some(match furthest {
                        Some(previous) => previous.furthest(err),
                        None => err,
                    });
                }
            }
        }

        Err(furthest.unwrap_or_else(|| self.new_unexpected_token(conflict.name())))
    }
}
