use super::{ParseError, Parser};
use crate::cst::{Field, NodeId, NodeKind};
use crate::lexer::{Keyword, TokenKind};

// Type references, type parameters and parameter lists
impl<'a> Parser<'a> {
    /// Parse a type: primitive or dotted name, optional `(Of ...)`, optional array ranks.
    /// `allow_rank` is off after `New`, where a trailing `(...)` is the argument list.
    pub(super) fn parse_type(&mut self, depth: usize, allow_rank: bool) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::Type);
        match self.peek_kind() {
            TokenKind::Keyword(keyword)
                if keyword.is_primitive_type() && self.peek_next_kind(1) != TokenKind::Dot =>
            {
                builder.child(self.leaf(NodeKind::PrimitiveType));
            }
            _ => {
                let name = self.parse_namespace_name()?;
                builder.child(name);
            }
        }

        if self.peek_kind_is(TokenKind::LParen) && self.peek_next_kind(1).is_keyword(Keyword::Of) {
            let arguments = self.parse_type_argument_list(depth + 1)?;
            builder.child(arguments);
        }

        // Jagged arrays repeat the rank: Integer()()
        while allow_rank && self.at_rank_specifier() {
            let rank = self.parse_array_rank_specifier()?;
            builder.child(rank);
        }

        Ok(self.finish(builder))
    }

    /// Dotted name: identifier ('.' identifier)*
    pub(super) fn parse_namespace_name(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::NamespaceName);
        builder.child(self.identifier()?);
        while self.peek_kind_is(TokenKind::Dot) {
            builder.child(self.token_leaf());
            builder.child(self.member_name()?);
        }
        Ok(self.finish(builder))
    }

    // (Of T1, T2)
    pub(super) fn parse_type_argument_list(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::TypeArgumentList);
        builder.child(self.expect(TokenKind::LParen, "'('")?);
        builder.child(self.expect_keyword(Keyword::Of)?);
        loop {
            let ty = self.parse_type(depth + 1, true)?;
            builder.child(ty);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    // `(` followed only by commas and `)`
    fn at_rank_specifier(&self) -> bool {
        self.peek_kind_is(TokenKind::LParen)
            && matches!(
                self.peek_next_kind(1),
                TokenKind::Comma | TokenKind::RParen
            )
    }

    fn parse_array_rank_specifier(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ArrayRankSpecifier);
        builder.child(self.expect(TokenKind::LParen, "'('")?);
        while let Some(comma) = self.eat(TokenKind::Comma) {
            builder.child(comma);
        }
        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    /// Array suffix on a declared name: a bare rank `()` or explicit bounds `(10, 20)`
    pub(super) fn parse_array_bounds(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        if self.at_rank_specifier() {
            return self.parse_array_rank_specifier();
        }
        self.parse_re_dim_clause(depth)
    }

    pub(super) fn parse_re_dim_clause(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ReDimClause);
        builder.child(self.expect(TokenKind::LParen, "'('")?);
        loop {
            let bound = self.parse_expression(depth + 1)?;
            builder.field(Field::UpperBound, bound);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    /// As [New] type [(args)] [With|From {...}]
    pub(super) fn parse_as_clause(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::AsClause);
        builder.child(self.expect_keyword(Keyword::As)?);

        let Some(new) = self.eat_keyword(Keyword::New) else {
            let ty = self.parse_type(depth + 1, true)?;
            builder.field(Field::Type, ty);
            return Ok(self.finish(builder));
        };

        builder.child(new);
        let ty = self.parse_type(depth + 1, false)?;
        builder.field(Field::Type, ty);
        if self.peek_kind_is(TokenKind::LParen) {
            let arguments = self.parse_argument_list(depth + 1)?;
            builder.child(arguments);
        }
        if matches!(
            self.peek_kind(),
            TokenKind::Keyword(Keyword::With | Keyword::From)
        ) {
            builder.child(self.token_leaf());
            let initializers = self.parse_object_initializers(depth + 1)?;
            builder.child(initializers);
        }
        Ok(self.finish(builder))
    }

    /// (Of T, U As {Class, New})
    pub(super) fn parse_type_parameters(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::TypeParameters);
        builder.child(self.expect(TokenKind::LParen, "'('")?);
        builder.child(self.expect_keyword(Keyword::Of)?);
        loop {
            let parameter = self.parse_type_parameter(depth + 1)?;
            builder.child(parameter);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    fn parse_type_parameter(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::TypeParameter);
        let name = self.identifier()?;
        builder.field(Field::Name, name);

        if let Some(as_keyword) = self.eat_keyword(Keyword::As) {
            builder.child(as_keyword);
            match self.eat(TokenKind::LBrace) {
                Some(open) => {
                    builder.child(open);
                    loop {
                        let constraint = self.parse_type_constraint(depth + 1)?;
                        builder.field(Field::Constraint, constraint);
                        match self.eat(TokenKind::Comma) {
                            Some(comma) => builder.child(comma),
                            None => break,
                        }
                    }
                    builder.child(self.expect(TokenKind::RBrace, "',' or '}'")?);
                }
                None => {
                    let constraint = self.parse_type_constraint(depth + 1)?;
                    builder.field(Field::Constraint, constraint);
                }
            }
        }

        Ok(self.finish(builder))
    }

    // New, Class, Structure, or a base type
    fn parse_type_constraint(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::TypeConstraint);
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::New | Keyword::Class | Keyword::Structure) => {
                builder.child(self.token_leaf());
            }
            _ => {
                let ty = self.parse_type(depth + 1, true)?;
                builder.child(ty);
            }
        }
        Ok(self.finish(builder))
    }

    /// Inherits/Implements keyword followed by a comma-separated type list
    pub(super) fn parse_type_list_clause(
        &mut self,
        depth: usize,
        kind: NodeKind,
        keyword: Keyword,
    ) -> Result<NodeId, ParseError> {
        let mut builder = self.start(kind);
        builder.child(self.expect_keyword(keyword)?);
        loop {
            let ty = self.parse_type(depth + 1, false)?;
            builder.child(ty);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        Ok(self.finish(builder))
    }

    /// Handles btn.Click, MyBase.Load
    pub(super) fn parse_handles_clause(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::HandlesClause);
        builder.child(self.expect_keyword(Keyword::Handles)?);
        loop {
            let event = self.parse_namespace_name()?;
            builder.child(event);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        Ok(self.finish(builder))
    }

    /// Parse parameter list: consumes '(' and ')'
    pub(super) fn parse_parameter_list(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::ParameterList);
        builder.child(self.expect(TokenKind::LParen, "'('")?);

        if !self.peek_kind_is(TokenKind::RParen) {
            loop {
                let parameter = self.parse_parameter(depth + 1)?;
                builder.child(parameter);
                match self.eat(TokenKind::Comma) {
                    Some(comma) => builder.child(comma),
                    None => break,
                }
            }
        }

        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    // [<attr>] [ByVal|ByRef|Optional|ParamArray]* name[()] [As type] [= default]
    fn parse_parameter(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::Parameter);

        if self.peek_kind_is(TokenKind::Lt) {
            let attributes = self.parse_attribute_block(depth + 1)?;
            builder.field(Field::Attributes, attributes);
        }

        while matches!(
            self.peek_kind(),
            TokenKind::Keyword(
                Keyword::ByVal | Keyword::ByRef | Keyword::Optional | Keyword::ParamArray
            )
        ) {
            builder.child(self.token_leaf());
        }

        let name = self.identifier()?;
        builder.field(Field::Name, name);

        if self.at_rank_specifier() {
            let rank = self.parse_array_rank_specifier()?;
            builder.child(rank);
        }

        if self.at_keyword(Keyword::As) {
            let as_clause = self.parse_as_clause(depth + 1)?;
            builder.child(as_clause);
        }

        if let Some(eq) = self.eat(TokenKind::Eq) {
            builder.child(eq);
            let default = self.parse_expression(depth + 1)?;
            builder.field(Field::DefaultValue, default);
        }

        Ok(self.finish(builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Tree;
    use crate::lexer::lex;
    use crate::limits::ParserLimits;

    fn parse_with(
        source: &str,
        parse: fn(&mut Parser, usize) -> Result<NodeId, ParseError>,
    ) -> Result<Tree, ParseError> {
        let tokens = lex(source);
        let mut parser = Parser::new(source, &tokens, ParserLimits::default());
        let id = parse(&mut parser, 0)?;
        assert_eq!(parser.peek_kind(), TokenKind::Eof, "unconsumed input");
        Ok(Tree::new(source.to_string(), parser.nodes, id, Vec::new()))
    }

    fn type_sexp(source: &str) -> String {
        parse_with(source, |p, d| p.parse_type(d, true))
            .unwrap()
            .to_sexp()
    }

    #[test]
    fn test_primitive_type() {
        assert_eq!(type_sexp("Integer"), "(type (primitive_type))");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(
            type_sexp("System.Collections.Generic.List(Of String)"),
            "(type (namespace_name (identifier) (identifier) (identifier) (identifier)) \
             (type_argument_list (type (primitive_type))))"
        );
    }

    #[test]
    fn test_primitive_keyword_as_namespace_segment() {
        // `String.Format` is a name, not the primitive
        assert_eq!(
            type_sexp("String.Format"),
            "(type (namespace_name (identifier) (identifier)))"
        );
    }

    #[test]
    fn test_array_ranks() {
        assert_eq!(
            type_sexp("Integer(,)()"),
            "(type (primitive_type) (array_rank_specifier) (array_rank_specifier))"
        );
    }

    #[test]
    fn test_rank_not_taken_when_disallowed() {
        let source = "Foo()";
        let tokens = lex(source);
        let mut parser = Parser::new(source, &tokens, ParserLimits::default());
        parser.parse_type(0, false).unwrap();
        assert_eq!(parser.peek_kind(), TokenKind::LParen);
    }

    #[test]
    fn test_nested_generic_arguments() {
        assert_eq!(
            type_sexp("Dictionary(Of String, List(Of Integer))"),
            "(type (namespace_name (identifier)) (type_argument_list (type (primitive_type)) \
             (type (namespace_name (identifier)) (type_argument_list (type (primitive_type))))))"
        );
    }

    #[test]
    fn test_type_parameters_with_constraints() {
        let tree = parse_with("(Of T As {Class, New}, U As IComparable)", |p, d| {
            p.parse_type_parameters(d)
        })
        .unwrap();
        let parameters = tree.find_all(NodeKind::TypeParameter);
        assert_eq!(parameters.len(), 2);
        assert_eq!(tree.children_by_field(parameters[0], Field::Constraint).len(), 2);
        let constraint = tree.child_by_field(parameters[1], Field::Constraint).unwrap();
        assert_eq!(tree.text(constraint), "IComparable");
    }

    #[test]
    fn test_as_new_clause() {
        let tree = parse_with("As New List(Of Integer) From {1, 2}", |p, d| {
            p.parse_as_clause(d)
        })
        .unwrap();
        let ty = tree.child_by_field(tree.root(), Field::Type).unwrap();
        assert_eq!(tree.text(ty), "List(Of Integer)");
        assert_eq!(tree.find_all(NodeKind::ObjectInitializer).len(), 2);
    }

    #[test]
    fn test_parameter_list() {
        let tree = parse_with(
            "(ByVal a As Integer, ByRef b() As String, Optional c As Boolean = True)",
            |p, d| p.parse_parameter_list(d),
        )
        .unwrap();
        let parameters = tree.find_all(NodeKind::Parameter);
        let names: Vec<&str> = parameters
            .iter()
            .map(|p| tree.text(tree.child_by_field(*p, Field::Name).unwrap()))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(tree.find_all(NodeKind::ArrayRankSpecifier).len(), 1);
        let default = tree.child_by_field(parameters[2], Field::DefaultValue).unwrap();
        assert_eq!(tree.text(default), "True");
    }

    #[test]
    fn test_empty_parameter_list() {
        let tree = parse_with("()", |p, d| p.parse_parameter_list(d)).unwrap();
        assert_eq!(tree.to_sexp(), "(parameter_list)");
    }

    #[test]
    fn test_parameter_requires_name() {
        assert!(parse_with("(ByVal As Integer)", |p, d| p.parse_parameter_list(d)).is_err());
    }

    #[test]
    fn test_array_bounds() {
        let tree = parse_with("(10, n - 1)", |p, d| p.parse_array_bounds(d)).unwrap();
        assert_eq!(tree.kind(tree.root()), NodeKind::ReDimClause);
        assert_eq!(tree.children_by_field(tree.root(), Field::UpperBound).len(), 2);

        let tree = parse_with("(,)", |p, d| p.parse_array_bounds(d)).unwrap();
        assert_eq!(tree.kind(tree.root()), NodeKind::ArrayRankSpecifier);
    }
}
