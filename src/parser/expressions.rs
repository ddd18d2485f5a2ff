use super::helpers::is_identifier_like;
use super::{ParseError, Parser};
use crate::cst::{Field, NodeId, NodeKind};
use crate::lexer::{Keyword, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug)]
pub struct PrecedenceEntry {
    pub level: i8,
    pub associativity: Associativity,
    pub operators: &'static [TokenKind],
}

// Binary operator precedence, tightest first
pub static PRECEDENCE_TABLE: &[PrecedenceEntry] = &[
    PrecedenceEntry {
        level: 7,
        associativity: Associativity::Left,
        operators: &[TokenKind::Caret],
    },
    PrecedenceEntry {
        level: 6,
        associativity: Associativity::Left,
        operators: &[
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Backslash,
            TokenKind::Keyword(Keyword::Mod),
        ],
    },
    PrecedenceEntry {
        level: 5,
        associativity: Associativity::Left,
        operators: &[TokenKind::Plus, TokenKind::Minus],
    },
    PrecedenceEntry {
        level: 4,
        associativity: Associativity::Left,
        operators: &[TokenKind::Ampersand],
    },
    PrecedenceEntry {
        level: 3,
        associativity: Associativity::Left,
        operators: &[TokenKind::LtLt, TokenKind::GtGt],
    },
    PrecedenceEntry {
        level: 2,
        associativity: Associativity::Left,
        operators: &[
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::Keyword(Keyword::Is),
            TokenKind::Keyword(Keyword::IsNot),
            TokenKind::Keyword(Keyword::Like),
        ],
    },
    PrecedenceEntry {
        level: 1,
        associativity: Associativity::Left,
        operators: &[TokenKind::Keyword(Keyword::TypeOf)],
    },
    PrecedenceEntry {
        level: 0,
        associativity: Associativity::Left,
        operators: &[
            TokenKind::Keyword(Keyword::And),
            TokenKind::Keyword(Keyword::Or),
            TokenKind::Keyword(Keyword::Xor),
        ],
    },
    PrecedenceEntry {
        level: -1,
        associativity: Associativity::Left,
        operators: &[
            TokenKind::Keyword(Keyword::AndAlso),
            TokenKind::Keyword(Keyword::OrElse),
        ],
    },
];

const LOWEST_LEVEL: i8 = -1;
const UNARY_LEVEL: i8 = 8;
// Operand of a prefix TypeOf stops before the relational operators
const TYPE_OF_OPERAND_LEVEL: i8 = 3;

pub(super) fn binary_operator(kind: TokenKind) -> Option<&'static PrecedenceEntry> {
    PRECEDENCE_TABLE
        .iter()
        .find(|entry| entry.operators.contains(&kind))
}

// Recursive expression parsing methods
impl<'a> Parser<'a> {
    /// Parse the longest expression at the cursor; the result is an `expression` node
    pub(super) fn parse_expression(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.parse_binary(depth, LOWEST_LEVEL)
    }

    /// Precedence climbing over the static table
    fn parse_binary(&mut self, depth: usize, min_level: i8) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut left = self.parse_unary(depth)?;

        loop {
            let entry = match binary_operator(self.peek_kind()) {
                Some(entry) if entry.level >= min_level => entry,
                _ => break,
            };

            let mut builder = self.start_at(NodeKind::BinaryExpression, left);
            builder.field(Field::Left, left);
            let operator = self.token_leaf();
            builder.field(Field::Operator, operator);

            let next_level = match entry.associativity {
                Associativity::Left => entry.level + 1,
                Associativity::Right => entry.level,
            };
            let right = self.parse_binary(depth + 1, next_level)?;
            builder.field(Field::Right, right);

            let binary = self.finish(builder);
            left = self.wrap(NodeKind::Expression, binary);
        }

        Ok(left)
    }

    fn parse_unary(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Not | Keyword::AddressOf)
            | TokenKind::Minus
            | TokenKind::Plus => {
                let mut builder = self.start(NodeKind::UnaryExpression);
                let operator = self.token_leaf();
                builder.field(Field::Operator, operator);
                let operand = self.parse_binary(depth + 1, UNARY_LEVEL)?;
                builder.field(Field::Operand, operand);
                let unary = self.finish(builder);
                Ok(self.wrap(NodeKind::Expression, unary))
            }
            TokenKind::Keyword(Keyword::TypeOf) => self.parse_type_of(depth),
            _ => self.parse_postfix(depth),
        }
    }

    // TypeOf operand Is|IsNot type
    fn parse_type_of(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::TypeOfExpression);
        builder.child(self.token_leaf()); // 'TypeOf'

        let operand = self.parse_binary(depth + 1, TYPE_OF_OPERAND_LEVEL)?;
        builder.field(Field::Operand, operand);

        if !matches!(
            self.peek_kind(),
            TokenKind::Keyword(Keyword::Is | Keyword::IsNot)
        ) {
            return Err(self.new_unexpected_token("'Is' or 'IsNot'"));
        }
        let operator = self.token_leaf();
        builder.field(Field::Operator, operator);

        let ty = self.parse_type(depth + 1, true)?;
        builder.field(Field::Type, ty);

        let type_of = self.finish(builder);
        Ok(self.wrap(NodeKind::Expression, type_of))
    }

    // Primary followed by member accesses, invocations and element accesses
    fn parse_postfix(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut inner = self.parse_primary(depth)?;

        loop {
            match self.peek_kind() {
                TokenKind::Dot => inner = self.parse_member_access(inner)?,
                TokenKind::LParen => inner = self.parse_call_or_index(depth, inner)?,
                _ => break,
            }
        }

        Ok(self.wrap(NodeKind::Expression, inner))
    }

    fn parse_primary(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        match self.peek_kind() {
            TokenKind::IntegerLiteral => Ok(self.literal(NodeKind::IntegerLiteral)),
            TokenKind::FloatLiteral => Ok(self.literal(NodeKind::FloatingPointLiteral)),
            TokenKind::StringLiteral => Ok(self.literal(NodeKind::StringLiteral)),
            TokenKind::CharacterLiteral => Ok(self.literal(NodeKind::CharacterLiteral)),
            TokenKind::DateLiteral => Ok(self.literal(NodeKind::DateLiteral)),
            TokenKind::Keyword(Keyword::True | Keyword::False) => {
                Ok(self.literal(NodeKind::BooleanLiteral))
            }
            TokenKind::Keyword(Keyword::Nothing) => {
                let nothing = self.token_leaf();
                Ok(self.wrap(NodeKind::Literal, nothing))
            }
            TokenKind::Keyword(Keyword::New) => self.parse_new_expression(depth),
            TokenKind::Keyword(Keyword::If) if self.peek_next_kind(1) == TokenKind::LParen => {
                self.parse_ternary(depth)
            }
            TokenKind::LParen => self.parse_parenthesized(depth),
            TokenKind::LBrace => self.parse_object_initializers(depth),
            // `.Member` inside a With block
            TokenKind::Dot => self.parse_implicit_member_access(),
            kind if is_identifier_like(kind) => Ok(self.leaf(NodeKind::Identifier)),
            _ => Err(self.new_unexpected_token("expression")),
        }
    }

    fn literal(&mut self, kind: NodeKind) -> NodeId {
        let value = self.leaf(kind);
        self.wrap(NodeKind::Literal, value)
    }

    fn parse_parenthesized(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ParenthesizedExpression);
        builder.child(self.expect(TokenKind::LParen, "'('")?);
        let inner = self.parse_expression(depth + 1)?;
        builder.child(inner);
        builder.child(self.expect(TokenKind::RParen, "')'")?);
        Ok(self.finish(builder))
    }

    // If(condition, true_branch, false_branch)
    fn parse_ternary(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::TernaryExpression);
        builder.child(self.token_leaf()); // 'If'
        builder.child(self.expect(TokenKind::LParen, "'('")?);

        let condition = self.parse_expression(depth + 1)?;
        builder.field(Field::Condition, condition);
        builder.child(self.expect(TokenKind::Comma, "','")?);

        let true_branch = self.parse_expression(depth + 1)?;
        builder.field(Field::TrueBranch, true_branch);
        builder.child(self.expect(TokenKind::Comma, "','")?);

        let false_branch = self.parse_expression(depth + 1)?;
        builder.field(Field::FalseBranch, false_branch);
        builder.child(self.expect(TokenKind::RParen, "')'")?);

        Ok(self.finish(builder))
    }

    /// Parse object creation: New Type[(args)] [With|From {initializers}]
    fn parse_new_expression(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::NewExpression);
        builder.child(self.token_leaf()); // 'New'

        // `New With {...}` creates an anonymous type
        if !self.at_keyword(Keyword::With) {
            // A trailing `(...)` is always the argument list, never an array rank
            let ty = self.parse_type(depth + 1, false)?;
            builder.field(Field::Type, ty);
        }

        if self.peek_kind_is(TokenKind::LParen) {
            let arguments = self.parse_argument_list(depth + 1)?;
            builder.child(arguments);
        }

        if matches!(
            self.peek_kind(),
            TokenKind::Keyword(Keyword::With | Keyword::From)
        ) && self.peek_next_kind(1) == TokenKind::LBrace
        {
            builder.child(self.token_leaf());
        }

        if self.peek_kind_is(TokenKind::LBrace) {
            let initializers = self.parse_object_initializers(depth + 1)?;
            builder.child(initializers);
        }

        Ok(self.finish(builder))
    }

    pub(crate) fn parse_object_initializers(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::ObjectInitializers);
        builder.child(self.expect(TokenKind::LBrace, "'{'")?);
        self.skip_newlines();

        if !self.peek_kind_is(TokenKind::RBrace) {
            loop {
                let initializer = self.parse_object_initializer(depth + 1)?;
                builder.child(initializer);
                match self.eat(TokenKind::Comma) {
                    Some(comma) => builder.child(comma),
                    None => break,
                }
            }
        }

        self.skip_newlines();
        builder.child(self.expect(TokenKind::RBrace, "',' or '}'")?);
        Ok(self.finish(builder))
    }

    // `.Member = value` or a bare collection element
    fn parse_object_initializer(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ObjectInitializer);

        if self.peek_kind_is(TokenKind::Dot) {
            builder.child(self.token_leaf());
            let name = self.member_name()?;
            builder.field(Field::Name, name);
            builder.child(self.expect(TokenKind::Eq, "'='")?);
        }

        let value = self.parse_expression(depth + 1)?;
        builder.child(value);
        Ok(self.finish(builder))
    }

    pub(super) fn skip_newlines(&mut self) {
        while self.peek_kind_is(TokenKind::Newline) {
            self.advance();
        }
    }

    pub(super) fn parse_member_access(&mut self, object: NodeId) -> Result<NodeId, ParseError> {
        let mut builder = self.start_at(NodeKind::MemberAccess, object);
        let object = self.wrap(NodeKind::Expression, object);
        builder.field(Field::Object, object);
        builder.child(self.expect(TokenKind::Dot, "'.'")?);
        let member = self.member_name()?;
        builder.field(Field::Member, member);
        Ok(self.finish(builder))
    }

    fn parse_implicit_member_access(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::MemberAccess);
        builder.child(self.expect(TokenKind::Dot, "'.'")?);
        let member = self.member_name()?;
        builder.field(Field::Member, member);
        Ok(self.finish(builder))
    }

    /// `(` after a name is an invocation; after anything else it indexes
    fn parse_call_or_index(&mut self, depth: usize, target: NodeId) -> Result<NodeId, ParseError> {
        if !matches!(
            self.nodes[target].kind,
            NodeKind::Identifier | NodeKind::MemberAccess
        ) {
            return self.parse_element_access(depth, target);
        }

        let mut builder = self.start_at(NodeKind::Invocation, target);
        builder.field(Field::Target, target);

        // Generic method: Name(Of T)(args)
        if self.peek_next_kind(1).is_keyword(Keyword::Of) {
            let type_arguments = self.parse_type_argument_list(depth + 1)?;
            builder.child(type_arguments);
            if !self.peek_kind_is(TokenKind::LParen) {
                return Ok(self.finish(builder));
            }
        }

        let arguments = self.parse_argument_list(depth + 1)?;
        builder.field(Field::Arguments, arguments);
        Ok(self.finish(builder))
    }

    fn parse_element_access(&mut self, depth: usize, object: NodeId) -> Result<NodeId, ParseError> {
        let mut builder = self.start_at(NodeKind::ElementAccess, object);
        let object = self.wrap(NodeKind::Expression, object);
        builder.field(Field::Object, object);
        builder.child(self.expect(TokenKind::LParen, "'('")?);

        if !self.peek_kind_is(TokenKind::RParen) {
            loop {
                let index = self.parse_expression(depth + 1)?;
                builder.field(Field::Index, index);
                match self.eat(TokenKind::Comma) {
                    Some(comma) => builder.child(comma),
                    None => break,
                }
            }
        }

        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    /// Parse argument list: consumes '(' and ')', arguments may be omitted between commas
    pub(super) fn parse_argument_list(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::ArgumentList);
        builder.child(self.expect(TokenKind::LParen, "'('")?);

        if !self.peek_kind_is(TokenKind::RParen) {
            loop {
                if !matches!(self.peek_kind(), TokenKind::Comma | TokenKind::RParen) {
                    let argument = self.parse_argument(depth + 1)?;
                    builder.child(argument);
                }
                match self.eat(TokenKind::Comma) {
                    Some(comma) => builder.child(comma),
                    None => break,
                }
                // A newline may follow the comma
                self.skip_newlines();
            }
        }

        builder.child(self.expect(TokenKind::RParen, "',' or ')'")?);
        Ok(self.finish(builder))
    }

    // Positional or named (Name:=Expr)
    fn parse_argument(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::Argument);

        if self.at_identifier()
            && self.peek_next_kind(1) == TokenKind::Colon
            && self.peek_next_kind(2) == TokenKind::Eq
        {
            let name = self.identifier()?;
            builder.field(Field::Name, name);
            builder.child(self.token_leaf()); // ':'
            builder.child(self.token_leaf()); // '='
        }

        let value = self.parse_expression(depth)?;
        builder.child(value);
        Ok(self.finish(builder))
    }

    /// Assignment target: identifier, member access or element access
    pub(super) fn parse_left_hand_side(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::LeftHandSide);
        let mut inner = match self.peek_kind() {
            TokenKind::Dot => self.parse_implicit_member_access()?,
            kind if is_identifier_like(kind) => self.leaf(NodeKind::Identifier),
            _ => return Err(self.new_unexpected_token("assignment target")),
        };

        loop {
            match self.peek_kind() {
                TokenKind::Dot => inner = self.parse_member_access(inner)?,
                // Indexing when an assignment operator follows the closing paren
                TokenKind::LParen if self.assignment_follows_parens() => {
                    inner = self.parse_element_access(depth, inner)?;
                }
                TokenKind::LParen => inner = self.parse_call_or_index(depth, inner)?,
                _ => break,
            }
        }

        if !matches!(
            self.nodes[inner].kind,
            NodeKind::Identifier | NodeKind::MemberAccess | NodeKind::ElementAccess
        ) {
            return Err(self.new_unexpected_token("assignment target"));
        }

        builder.child(inner);
        Ok(self.finish(builder))
    }

    // Scan to the matching ')' and look at the token after it
    fn assignment_follows_parens(&self) -> bool {
        let mut index = self.current;
        let mut nesting = 0usize;
        loop {
            match self.kind_at(index) {
                TokenKind::LParen => nesting += 1,
                TokenKind::RParen => {
                    nesting -= 1;
                    if nesting == 0 {
                        return self.kind_at(index + 1).is_assignment_operator();
                    }
                }
                TokenKind::Newline | TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Tree;
    use crate::lexer::lex;
    use crate::limits::ParserLimits;

    fn parse_expr(source: &str) -> Result<Tree, ParseError> {
        let tokens = lex(source);
        let mut parser = Parser::new(source, &tokens, ParserLimits::default());
        let id = parser.parse_expression(0)?;
        assert_eq!(parser.peek_kind(), TokenKind::Eof, "unconsumed input");
        Ok(Tree::new(source.to_string(), parser.nodes, id, Vec::new()))
    }

    // Compact operator shape, e.g. "(+ 2 (* 3 4))"
    fn shape(tree: &Tree, id: NodeId) -> String {
        match tree.kind(id) {
            NodeKind::Expression | NodeKind::ParenthesizedExpression => {
                shape(tree, tree.named_children(id)[0])
            }
            NodeKind::BinaryExpression => {
                let left = tree.child_by_field(id, Field::Left).unwrap();
                let op = tree.child_by_field(id, Field::Operator).unwrap();
                let right = tree.child_by_field(id, Field::Right).unwrap();
                format!(
                    "({} {} {})",
                    tree.text(op),
                    shape(tree, left),
                    shape(tree, right)
                )
            }
            NodeKind::UnaryExpression => {
                let op = tree.child_by_field(id, Field::Operator).unwrap();
                let operand = tree.child_by_field(id, Field::Operand).unwrap();
                format!("({} {})", tree.text(op), shape(tree, operand))
            }
            _ => tree.text(id).to_string(),
        }
    }

    fn expr_shape(source: &str) -> String {
        let tree = parse_expr(source).unwrap();
        shape(&tree, tree.root())
    }

    #[test]
    fn test_precedence_table_is_ordered() {
        let levels: Vec<i8> = PRECEDENCE_TABLE.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![7, 6, 5, 4, 3, 2, 1, 0, -1]);
        assert!(
            PRECEDENCE_TABLE
                .iter()
                .all(|e| e.associativity == Associativity::Left)
        );
        assert_eq!(binary_operator(TokenKind::Plus).unwrap().level, 5);
        assert!(binary_operator(TokenKind::Comma).is_none());
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(expr_shape("2 + 3 * 4"), "(+ 2 (* 3 4))");
        assert_eq!(expr_shape("2 * 3 + 4"), "(+ (* 2 3) 4)");
    }

    #[test]
    fn test_logical_levels() {
        assert_eq!(expr_shape("A And B OrElse C"), "(OrElse (And A B) C)");
        assert_eq!(
            expr_shape("x Mod 2 = 0 AndAlso y"),
            "(AndAlso (= (Mod x 2) 0) y)"
        );
        assert_eq!(expr_shape("a & b = c"), "(= (& a b) c)");
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(expr_shape("a - b - c"), "(- (- a b) c)");
        assert_eq!(expr_shape("2 ^ 3 ^ 2"), "(^ (^ 2 3) 2)");
    }

    #[test]
    fn test_unary_binds_tightest() {
        assert_eq!(expr_shape("Not a And b"), "(And (Not a) b)");
        assert_eq!(expr_shape("-x * y"), "(* (- x) y)");
        assert_eq!(expr_shape("-(x * y)"), "(- (* x y))");
    }

    #[test]
    fn test_case_insensitive_operators() {
        assert_eq!(expr_shape("a andalso b ORELSE c"), "(ORELSE (andalso a b) c)");
    }

    #[test]
    fn test_invocation_and_element_access() {
        let tree = parse_expr("a.b(1)(2)").unwrap();
        assert_eq!(
            tree.to_sexp(),
            "(expression (element_access object: (expression (invocation \
             target: (member_access object: (expression (identifier)) member: (identifier)) \
             arguments: (argument_list (argument (expression (literal (integer_literal))))))) \
             index: (expression (literal (integer_literal)))))"
        );
    }

    #[test]
    fn test_primitive_type_keyword_as_object() {
        let tree = parse_expr("String.Empty").unwrap();
        let access = tree.named_children(tree.root())[0];
        assert_eq!(tree.kind(access), NodeKind::MemberAccess);
        let member = tree.child_by_field(access, Field::Member).unwrap();
        assert_eq!(tree.text(member), "Empty");
    }

    #[test]
    fn test_named_argument() {
        let tree = parse_expr("Foo(1, count:=2)").unwrap();
        let arguments = tree.find_all(NodeKind::Argument);
        assert_eq!(arguments.len(), 2);
        assert_eq!(tree.child_by_field(arguments[0], Field::Name), None);
        let name = tree.child_by_field(arguments[1], Field::Name).unwrap();
        assert_eq!(tree.text(name), "count");
    }

    #[test]
    fn test_newline_after_argument_comma() {
        let tree = parse_expr("Foo(1,\n    2)").unwrap();
        assert_eq!(tree.find_all(NodeKind::Argument).len(), 2);
    }

    #[test]
    fn test_omitted_argument() {
        let tree = parse_expr("Foo(1, , 3)").unwrap();
        assert_eq!(tree.find_all(NodeKind::Argument).len(), 2);
    }

    #[test]
    fn test_ternary() {
        let tree = parse_expr("If(x > 0, x, -x)").unwrap();
        let ternary = tree.named_children(tree.root())[0];
        assert_eq!(tree.kind(ternary), NodeKind::TernaryExpression);
        let condition = tree.child_by_field(ternary, Field::Condition).unwrap();
        assert_eq!(tree.text(condition), "x > 0");
        let false_branch = tree.child_by_field(ternary, Field::FalseBranch).unwrap();
        assert_eq!(tree.text(false_branch), "-x");
    }

    #[test]
    fn test_ternary_needs_three_operands() {
        assert!(parse_expr("If(a, b)").is_err());
    }

    #[test]
    fn test_new_with_collection_initializer() {
        let tree = parse_expr("New List(Of Integer) From {1, 2}").unwrap();
        let new = tree.find_all(NodeKind::NewExpression)[0];
        let ty = tree.child_by_field(new, Field::Type).unwrap();
        assert_eq!(tree.text(ty), "List(Of Integer)");
        assert_eq!(tree.find_all(NodeKind::ObjectInitializer).len(), 2);
    }

    #[test]
    fn test_new_with_arguments_and_member_initializers() {
        let tree = parse_expr("New Point(1) With {.X = 1, .Y = 2}").unwrap();
        assert_eq!(tree.find_all(NodeKind::ArgumentList).len(), 1);
        assert_eq!(tree.find_all(NodeKind::ArrayRankSpecifier).len(), 0);
        let names: Vec<&str> = tree
            .find_all(NodeKind::ObjectInitializer)
            .into_iter()
            .filter_map(|id| tree.child_by_field(id, Field::Name))
            .map(|id| tree.text(id))
            .collect();
        assert_eq!(names, vec!["X", "Y"]);
    }

    #[test]
    fn test_type_of_expression() {
        let tree = parse_expr("TypeOf obj Is String AndAlso ok").unwrap();
        assert_eq!(shape(&tree, tree.root()), "(AndAlso TypeOf obj Is String ok)");
        let type_of = tree.find_all(NodeKind::TypeOfExpression)[0];
        let operator = tree.child_by_field(type_of, Field::Operator).unwrap();
        assert_eq!(tree.text(operator), "Is");
        let ty = tree.child_by_field(type_of, Field::Type).unwrap();
        assert_eq!(tree.text(ty), "String");
    }

    #[test]
    fn test_literals() {
        for (source, kind) in [
            ("42", NodeKind::IntegerLiteral),
            ("1.5", NodeKind::FloatingPointLiteral),
            ("\"s\"", NodeKind::StringLiteral),
            ("\"c\"c", NodeKind::CharacterLiteral),
            ("#1/1/2000#", NodeKind::DateLiteral),
            ("True", NodeKind::BooleanLiteral),
        ] {
            let tree = parse_expr(source).unwrap();
            assert_eq!(tree.find_all(kind).len(), 1, "{}", source);
            assert_eq!(tree.find_all(NodeKind::Literal).len(), 1, "{}", source);
        }
        let tree = parse_expr("Nothing").unwrap();
        assert_eq!(tree.find_all(NodeKind::Literal).len(), 1);
    }

    #[test]
    fn test_incomplete_expression_fails() {
        assert!(parse_expr("1 +").is_err());
        assert!(parse_expr("(1").is_err());
        assert!(parse_expr(")").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        let tokens = lex(&source);
        let limits = ParserLimits {
            max_nesting_depth: 16,
            ..Default::default()
        };
        let mut parser = Parser::new(&source, &tokens, limits);
        let err = parser.parse_expression(0).unwrap_err();
        assert!(err.message.contains("too deep"));
    }

    fn parse_lhs(source: &str) -> Result<Tree, ParseError> {
        let tokens = lex(source);
        let mut parser = Parser::new(source, &tokens, ParserLimits::default());
        let id = parser.parse_left_hand_side(0)?;
        Ok(Tree::new(source.to_string(), parser.nodes, id, Vec::new()))
    }

    #[test]
    fn test_left_hand_side_forms() {
        let tree = parse_lhs("items(0) = 1").unwrap();
        let target = tree.named_children(tree.root())[0];
        assert_eq!(tree.kind(target), NodeKind::ElementAccess);

        let tree = parse_lhs("items(0).Name = 1").unwrap();
        let target = tree.named_children(tree.root())[0];
        assert_eq!(tree.kind(target), NodeKind::MemberAccess);
        assert_eq!(tree.find_all(NodeKind::Invocation).len(), 1);

        let tree = parse_lhs(".Text = s").unwrap();
        let target = tree.named_children(tree.root())[0];
        assert_eq!(tree.kind(target), NodeKind::MemberAccess);
        assert_eq!(tree.text(target), ".Text");

        // A call cannot be assigned to
        assert!(parse_lhs("Foo(1)").is_err());
        assert!(parse_lhs("1 = 2").is_err());
    }
}
