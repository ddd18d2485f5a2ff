use super::helpers::is_identifier_like;
use super::resolver::{Alternative, Conflict, always};
use super::{Block, NodeBuilder, ParseError, Parser};
use crate::cst::{Field, NodeId, NodeKind, Span};
use crate::lexer::{Keyword, TokenKind};

type ParseFn<'a> = fn(&mut Parser<'a>, usize) -> Result<NodeId, ParseError>;

// A method body is ahead when its `End Sub`/`End Function` comes before the next member.
// Statements before the next member or the enclosing `End` also count, as does the end of
// input; the body is then left partial.
fn method_body_ahead(parser: &Parser) -> bool {
    if parser.innermost_block() == Some(Block::Interface) {
        return false;
    }

    let keyword_index = parser.skip_member_prefix(parser.current);
    if (parser.current..keyword_index).any(|i| parser.kind_at(i).is_keyword(Keyword::MustOverride))
    {
        return false;
    }
    let closer = match parser.kind_at(keyword_index) {
        TokenKind::Keyword(keyword @ (Keyword::Sub | Keyword::Function)) => keyword,
        _ => return false,
    };

    let mut index = parser.line_end(keyword_index);
    let mut saw_statement = false;
    while parser.kind_at(index) != TokenKind::Eof {
        index += 1;
        if parser.kind_at(index).is_keyword(Keyword::End) {
            match parser.kind_at(index + 1) {
                TokenKind::Keyword(keyword) if keyword == closer => return true,
                TokenKind::Keyword(
                    Keyword::Class
                    | Keyword::Module
                    | Keyword::Structure
                    | Keyword::Interface
                    | Keyword::Namespace,
                ) => return saw_statement,
                _ => {}
            }
        } else if parser.member_start_at(index) {
            return saw_statement;
        }
        if !matches!(parser.kind_at(index), TokenKind::Newline | TokenKind::Colon | TokenKind::Eof) {
            saw_statement = true;
        }
        index = parser.line_end(index);
    }
    true
}

// First token of the line after the header, past blank lines
fn next_line_start(parser: &Parser) -> usize {
    let mut index = parser.line_end(parser.current);
    while parser.kind_at(index).is_terminator() {
        index += 1;
    }
    index
}

fn property_block_ahead(parser: &Parser) -> bool {
    let index = next_line_start(parser);
    if parser.kind_at(index).is_keyword(Keyword::End) {
        return parser.kind_at(index + 1).is_keyword(Keyword::Property);
    }
    matches!(
        parser.kind_at(parser.skip_member_prefix(index)),
        TokenKind::Keyword(Keyword::Get | Keyword::Set)
    )
}

fn custom_event_ahead(parser: &Parser) -> bool {
    let index = next_line_start(parser);
    match parser.kind_at(index) {
        TokenKind::Keyword(Keyword::AddHandler | Keyword::RemoveHandler | Keyword::RaiseEvent) => {
            true
        }
        TokenKind::Keyword(Keyword::End) => parser.kind_at(index + 1).is_keyword(Keyword::Event),
        _ => false,
    }
}

// File, namespace, type and member structure
impl<'a> Parser<'a> {
    /// Parse the whole file; the root always spans the full input
    pub(super) fn parse_source_file(&mut self) -> NodeId {
        let mut builder = self.start(NodeKind::SourceFile);
        while !self.peek_kind_is(TokenKind::Eof) {
            let item = self.parse_file_item(0);
            builder.child(item);
        }

        let root = self.finish(builder);
        self.nodes[root].span = Span::new(0, self.source.len());
        root
    }

    // One top-level or namespace-level item; never fails
    fn parse_file_item(&mut self, depth: usize) -> NodeId {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Colon => self.leaf(NodeKind::BlankLine),
            TokenKind::Keyword(Keyword::Option) => {
                self.parse_or_recover(depth, Parser::parse_option_statements)
            }
            TokenKind::Keyword(Keyword::Imports) => {
                self.parse_or_recover(depth, Parser::parse_imports_statement)
            }
            TokenKind::Keyword(Keyword::Namespace) => {
                self.parse_or_recover(depth, Parser::parse_namespace_block)
            }
            TokenKind::Lt if self.at_file_attribute() => {
                self.parse_or_recover(depth, Parser::parse_file_attribute)
            }
            _ => self.parse_or_recover(depth, Parser::parse_type_declaration),
        }
    }

    // <Assembly: ...> or <Module: ...>
    fn at_file_attribute(&self) -> bool {
        matches!(
            self.peek_next_kind(1),
            TokenKind::Identifier | TokenKind::Keyword(Keyword::Module)
        ) && self.peek_next_kind(2) == TokenKind::Colon
    }

    fn parse_file_attribute(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let attributes = self.parse_attribute_block(depth + 1)?;
        self.expect_terminator()?;
        Ok(attributes)
    }

    /// Consecutive `Option` lines
    fn parse_option_statements(&mut self, _depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::OptionStatements);

        loop {
            builder.child(self.expect_keyword(Keyword::Option)?);
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::Explicit | Keyword::Strict | Keyword::Infer) => {
                    builder.child(self.token_leaf());
                    if matches!(
                        self.peek_kind(),
                        TokenKind::Keyword(Keyword::On | Keyword::Off)
                    ) {
                        builder.child(self.token_leaf());
                    }
                }
                TokenKind::Keyword(Keyword::Compare) => {
                    builder.child(self.token_leaf());
                    match self.peek_kind() {
                        TokenKind::Keyword(Keyword::Binary | Keyword::Text) => {
                            builder.child(self.token_leaf())
                        }
                        _ => return Err(self.new_unexpected_token("'Binary' or 'Text'")),
                    }
                }
                _ => {
                    return Err(
                        self.new_unexpected_token("'Explicit', 'Strict', 'Infer' or 'Compare'")
                    );
                }
            }
            self.expect_terminator()?;

            if !self.at_keyword(Keyword::Option) {
                break;
            }
        }

        Ok(self.finish(builder))
    }

    /// Imports [Alias =] Namespace.Name, ...
    fn parse_imports_statement(&mut self, _depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ImportsStatement);
        builder.child(self.token_leaf()); // 'Imports'

        loop {
            if self.at_identifier() && self.peek_next_kind(1) == TokenKind::Eq {
                builder.child(self.leaf(NodeKind::Identifier));
                builder.child(self.token_leaf()); // '='
            }
            let namespace = self.parse_namespace_name()?;
            builder.field(Field::Namespace, namespace);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    fn parse_namespace_block(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::NamespaceBlock);
        self.open_block(Block::Namespace);
        builder.child(self.token_leaf()); // 'Namespace'
        let name = self.parse_namespace_name()?;
        builder.field(Field::Name, name);
        self.expect_terminator()?;

        while !self.at_block_boundary() {
            let item = self.parse_file_item(depth + 1);
            builder.child(item);
        }

        Ok(self.finish_block(builder, Block::Namespace))
    }

    // Attributes

    /// `<attr, attr>` possibly repeated; leading `<` required
    pub(super) fn parse_attribute_block(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(NodeKind::AttributeBlock);
        builder.child(self.expect(TokenKind::Lt, "'<'")?);
        loop {
            let attribute = self.parse_attribute(depth + 1)?;
            builder.child(attribute);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        builder.child(self.expect(TokenKind::Gt, "',' or '>'")?);
        Ok(self.finish(builder))
    }

    // [Target:] Name[(args)]
    fn parse_attribute(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::Attribute);

        if matches!(
            self.peek_kind(),
            TokenKind::Identifier | TokenKind::Keyword(Keyword::Module)
        ) && self.peek_next_kind(1) == TokenKind::Colon
        {
            let target = self.leaf(NodeKind::Identifier);
            builder.field(Field::Target, target);
            builder.child(self.token_leaf()); // ':'
        }

        let name = if self.peek_next_kind(1) == TokenKind::Dot {
            self.parse_namespace_name()?
        } else {
            self.identifier()?
        };
        builder.field(Field::Name, name);

        if self.peek_kind_is(TokenKind::LParen) {
            let arguments = self.parse_argument_list(depth + 1)?;
            builder.child(arguments);
        }

        Ok(self.finish(builder))
    }

    // Declaration prefix

    /// Index of the first token after attribute blocks and modifiers starting at `index`
    pub(super) fn skip_member_prefix(&self, mut index: usize) -> usize {
        while self.kind_at(index) == TokenKind::Lt {
            index += 1;
            let mut parens = 0usize;
            loop {
                match self.kind_at(index) {
                    TokenKind::LParen => parens += 1,
                    TokenKind::RParen => parens = parens.saturating_sub(1),
                    TokenKind::Gt if parens == 0 => {
                        index += 1;
                        break;
                    }
                    TokenKind::Newline | TokenKind::Eof => return index,
                    _ => {}
                }
                index += 1;
            }
            if self.kind_at(index) == TokenKind::Newline {
                index += 1;
            }
        }

        while let TokenKind::Keyword(keyword) = self.kind_at(index) {
            if !keyword.is_modifier() {
                break;
            }
            index += 1;
        }
        index
    }

    /// Optional `attributes` and `modifiers` fields
    fn parse_member_prefix(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        while self.peek_kind_is(TokenKind::Lt) {
            let attributes = self.parse_attribute_block(depth + 1)?;
            builder.field(Field::Attributes, attributes);
            // The attribute block may sit on its own line
            if self.peek_kind_is(TokenKind::Newline) {
                self.advance();
            }
        }

        if self.at_modifier() {
            let mut modifiers = self.start(NodeKind::Modifiers);
            while self.at_modifier() {
                modifiers.child(self.leaf(NodeKind::Modifier));
            }
            let modifiers = self.finish(modifiers);
            builder.field(Field::Modifiers, modifiers);
        }

        Ok(())
    }

    fn at_modifier(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(keyword) if keyword.is_modifier())
    }

    // Type declarations

    /// Class, module, structure, interface, enum or delegate wrapped in `type_declaration`
    fn parse_type_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        let index = self.skip_member_prefix(self.current);
        let inner = match self.kind_at(index) {
            TokenKind::Keyword(Keyword::Class) => {
                self.parse_type_block(depth, NodeKind::ClassBlock, Block::Class)?
            }
            TokenKind::Keyword(Keyword::Module) => {
                self.parse_type_block(depth, NodeKind::ModuleBlock, Block::Module)?
            }
            TokenKind::Keyword(Keyword::Structure) => {
                self.parse_type_block(depth, NodeKind::StructureBlock, Block::Structure)?
            }
            TokenKind::Keyword(Keyword::Interface) => {
                self.parse_type_block(depth, NodeKind::InterfaceBlock, Block::Interface)?
            }
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum_block(depth)?,
            TokenKind::Keyword(Keyword::Delegate) => self.parse_delegate_declaration(depth)?,
            _ => return Err(self.new_unexpected_token("type declaration")),
        };

        Ok(self.wrap(NodeKind::TypeDeclaration, inner))
    }

    fn parse_type_block(
        &mut self,
        depth: usize,
        kind: NodeKind,
        block: Block,
    ) -> Result<NodeId, ParseError> {
        let mut builder = self.start(kind);
        self.parse_member_prefix(depth, &mut builder)?;

        self.open_block(block);
        builder.child(self.expect_keyword(block.keyword())?);
        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if self.peek_kind_is(TokenKind::LParen) {
            let parameters = self.parse_type_parameters(depth + 1)?;
            builder.child(parameters);
        }
        // Clauses on the header line
        self.parse_inheritance_clauses(depth, &mut builder)?;
        self.expect_terminator()?;

        // Clauses as the first body lines
        loop {
            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Colon => {
                    builder.child(self.leaf(NodeKind::BlankLine));
                }
                TokenKind::Keyword(Keyword::Inherits | Keyword::Implements) => {
                    if let Err(err) = self
                        .parse_inheritance_clauses(depth, &mut builder)
                        .and_then(|_| self.expect_terminator())
                    {
                        let error = self.recover_line(err);
                        builder.child(error);
                    }
                }
                _ => break,
            }
        }

        while !self.at_block_boundary() {
            let member = self.parse_member(depth + 1);
            builder.child(member);
        }

        Ok(self.finish_block(builder, block))
    }

    fn parse_inheritance_clauses(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::Inherits) => {
                    let clause =
                        self.parse_type_list_clause(depth, NodeKind::InheritsClause, Keyword::Inherits)?;
                    builder.field(Field::Inherits, clause);
                }
                TokenKind::Keyword(Keyword::Implements) => {
                    let clause = self.parse_type_list_clause(
                        depth,
                        NodeKind::ImplementsClause,
                        Keyword::Implements,
                    )?;
                    builder.field(Field::Implements, clause);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Enum Name [As Type] ... End Enum
    fn parse_enum_block(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::EnumBlock);
        self.parse_member_prefix(depth, &mut builder)?;

        self.open_block(Block::Enum);
        builder.child(self.expect_keyword(Keyword::Enum)?);
        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if self.at_keyword(Keyword::As) {
            let underlying = self.parse_as_clause(depth + 1)?;
            builder.child(underlying);
        }
        self.expect_terminator()?;

        while !self.at_block_boundary() {
            let member = match self.peek_kind() {
                TokenKind::Newline | TokenKind::Colon => self.leaf(NodeKind::BlankLine),
                _ => self.parse_or_recover(depth + 1, Parser::parse_enum_member),
            };
            builder.child(member);
        }

        Ok(self.finish_block(builder, Block::Enum))
    }

    fn parse_enum_member(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::EnumMember);
        self.parse_member_prefix(depth, &mut builder)?;

        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if let Some(eq) = self.eat(TokenKind::Eq) {
            builder.child(eq);
            let value = self.parse_expression(depth + 1)?;
            builder.field(Field::Value, value);
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    /// Delegate Sub|Function Name[(Of T)][(params)] [As Type]
    fn parse_delegate_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::DelegateDeclaration);
        self.parse_member_prefix(depth, &mut builder)?;

        builder.child(self.expect_keyword(Keyword::Delegate)?);
        let is_function = self.at_keyword(Keyword::Function);
        if !is_function && !self.at_keyword(Keyword::Sub) {
            return Err(self.new_unexpected_token("'Sub' or 'Function'"));
        }
        builder.child(self.token_leaf());

        let name = self.identifier()?;
        builder.field(Field::Name, name);
        self.parse_signature_tail(depth, &mut builder, is_function)?;

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // [(Of T)] [(params)] [As Type] shared by methods and delegates
    fn parse_signature_tail(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
        is_function: bool,
    ) -> Result<(), ParseError> {
        if self.peek_kind_is(TokenKind::LParen) && self.peek_next_kind(1).is_keyword(Keyword::Of) {
            let type_parameters = self.parse_type_parameters(depth + 1)?;
            builder.child(type_parameters);
        }
        if self.peek_kind_is(TokenKind::LParen) {
            let parameters = self.parse_parameter_list(depth + 1)?;
            builder.field(Field::Parameters, parameters);
        }
        if is_function {
            if let Some(as_keyword) = self.eat_keyword(Keyword::As) {
                builder.child(as_keyword);
                while self.peek_kind_is(TokenKind::Lt) {
                    let attributes = self.parse_attribute_block(depth + 1)?;
                    builder.child(attributes);
                }
                let return_type = self.parse_type(depth + 1, true)?;
                builder.field(Field::ReturnType, return_type);
            }
        }
        Ok(())
    }

    // Members

    /// One member of a class, module, structure or interface body; never fails
    fn parse_member(&mut self, depth: usize) -> NodeId {
        if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Colon) {
            return self.leaf(NodeKind::BlankLine);
        }

        let index = self.skip_member_prefix(self.current);
        let parse: ParseFn<'a> = match self.kind_at(index) {
            TokenKind::Keyword(Keyword::Const) => Parser::parse_const_declaration,
            TokenKind::Keyword(Keyword::Sub) if self.kind_at(index + 1).is_keyword(Keyword::New) => {
                Parser::parse_constructor_declaration
            }
            TokenKind::Keyword(Keyword::Sub | Keyword::Function) => Parser::parse_method_declaration,
            TokenKind::Keyword(Keyword::Property) => Parser::parse_property_declaration,
            TokenKind::Keyword(Keyword::Event) => Parser::parse_event_declaration,
            TokenKind::Keyword(
                Keyword::Class
                | Keyword::Module
                | Keyword::Structure
                | Keyword::Interface
                | Keyword::Enum
                | Keyword::Delegate,
            ) => Parser::parse_type_declaration,
            TokenKind::Keyword(Keyword::Dim) => Parser::parse_field_declaration,
            kind if is_identifier_like(kind) && (index > self.current || self.field_at(index)) => {
                Parser::parse_field_declaration
            }
            _ => {
                let err = self.new_unexpected_token("member declaration");
                return self.recover_line(err);
            }
        };

        self.parse_or_recover(depth, parse)
    }

    // A bare `name As ...`, `name = ...`, `name(...)` or `name, ...` line
    fn field_at(&self, index: usize) -> bool {
        matches!(
            self.kind_at(index + 1),
            TokenKind::Keyword(Keyword::As) | TokenKind::Eq | TokenKind::LParen | TokenKind::Comma
        )
    }

    /// [attrs] [modifiers] Const name [As T] = value, ...
    pub(super) fn parse_const_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ConstDeclaration);
        self.parse_member_prefix(depth, &mut builder)?;
        builder.child(self.expect_keyword(Keyword::Const)?);

        loop {
            let name = self.identifier()?;
            builder.field(Field::Name, name);
            if self.at_keyword(Keyword::As) {
                let as_clause = self.parse_as_clause(depth + 1)?;
                builder.child(as_clause);
            }
            builder.child(self.expect(TokenKind::Eq, "'='")?);
            let value = self.parse_expression(depth + 1)?;
            builder.field(Field::Value, value);

            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    fn parse_field_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::FieldDeclaration);
        self.parse_member_prefix(depth, &mut builder)?;
        if let Some(dim) = self.eat_keyword(Keyword::Dim) {
            builder.child(dim);
        }

        loop {
            let declarator = self.parse_variable_declarator(depth + 1)?;
            builder.child(declarator);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // name[bounds] [As ...] [= initializer]
    fn parse_variable_declarator(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::VariableDeclarator);

        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if self.peek_kind_is(TokenKind::LParen) {
            let bounds = self.parse_array_bounds(depth + 1)?;
            builder.child(bounds);
        }
        if self.at_keyword(Keyword::As) {
            let as_clause = self.parse_as_clause(depth + 1)?;
            builder.child(as_clause);
        }
        if let Some(eq) = self.eat(TokenKind::Eq) {
            builder.child(eq);
            let initializer = self.parse_expression(depth + 1)?;
            builder.field(Field::Initializer, initializer);
        }

        Ok(self.finish(builder))
    }

    // Methods and constructors

    fn parse_method_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.resolve(
            Conflict::MethodDeclaration,
            depth,
            &[
                Alternative {
                    name: "method with body",
                    viable: method_body_ahead,
                    parse: Parser::parse_method_with_body,
                },
                Alternative {
                    name: "method without body",
                    viable: always,
                    parse: Parser::parse_method_signature,
                },
            ],
        )
    }

    fn parse_constructor_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.resolve(
            Conflict::ConstructorDeclaration,
            depth,
            &[
                Alternative {
                    name: "constructor with body",
                    viable: method_body_ahead,
                    parse: Parser::parse_constructor_with_body,
                },
                Alternative {
                    name: "constructor without body",
                    viable: always,
                    parse: Parser::parse_constructor_signature,
                },
            ],
        )
    }

    fn parse_method_with_body(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.parse_routine_with_body(depth, NodeKind::MethodDeclaration)
    }

    fn parse_method_signature(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let (builder, _) = self.parse_routine_header(depth, NodeKind::MethodDeclaration)?;
        Ok(self.finish(builder))
    }

    fn parse_constructor_with_body(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.parse_routine_with_body(depth, NodeKind::ConstructorDeclaration)
    }

    fn parse_constructor_signature(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let (builder, _) = self.parse_routine_header(depth, NodeKind::ConstructorDeclaration)?;
        Ok(self.finish(builder))
    }

    fn parse_routine_with_body(&mut self, depth: usize, kind: NodeKind) -> Result<NodeId, ParseError> {
        let line = self.current_token().line;
        let (mut builder, block) = self.parse_routine_header(depth, kind)?;
        self.open_block_at(block, line);
        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_block(builder, block))
    }

    /// Sub|Function header through its terminator
    fn parse_routine_header(
        &mut self,
        depth: usize,
        kind: NodeKind,
    ) -> Result<(NodeBuilder, Block), ParseError> {
        self.check_depth(depth)?;

        let mut builder = self.start(kind);
        self.parse_member_prefix(depth, &mut builder)?;

        let block = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Sub) => Block::Sub,
            TokenKind::Keyword(Keyword::Function) => Block::Function,
            _ => return Err(self.new_unexpected_token("'Sub' or 'Function'")),
        };
        builder.child(self.token_leaf());

        if kind == NodeKind::ConstructorDeclaration {
            builder.child(self.expect_keyword(Keyword::New)?);
        } else {
            let name = self.identifier()?;
            builder.field(Field::Name, name);
        }

        self.parse_signature_tail(depth, &mut builder, block == Block::Function)?;
        self.parse_handles_or_implements(depth, &mut builder)?;

        self.expect_terminator()?;
        Ok((builder, block))
    }

    fn parse_handles_or_implements(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::Handles) => {
                    let clause = self.parse_handles_clause()?;
                    builder.field(Field::Handles, clause);
                }
                TokenKind::Keyword(Keyword::Implements) => {
                    let clause = self.parse_type_list_clause(
                        depth,
                        NodeKind::ImplementsClause,
                        Keyword::Implements,
                    )?;
                    builder.field(Field::Implements, clause);
                }
                _ => return Ok(()),
            }
        }
    }

    // Properties

    fn parse_property_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.resolve(
            Conflict::PropertyDeclaration,
            depth,
            &[
                Alternative {
                    name: "property with accessors",
                    viable: property_block_ahead,
                    parse: Parser::parse_property_block,
                },
                Alternative {
                    name: "auto property",
                    viable: always,
                    parse: Parser::parse_auto_property,
                },
            ],
        )
    }

    // Property Name[(params)] [As ...]
    fn parse_property_header(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        self.check_depth(depth)?;
        self.parse_member_prefix(depth, builder)?;

        builder.child(self.expect_keyword(Keyword::Property)?);
        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if self.peek_kind_is(TokenKind::LParen) {
            let parameters = self.parse_parameter_list(depth + 1)?;
            builder.field(Field::Parameters, parameters);
        }
        if self.at_keyword(Keyword::As) {
            let as_clause = self.parse_as_clause(depth + 1)?;
            builder.child(as_clause);
        }
        Ok(())
    }

    fn parse_property_block(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::PropertyDeclaration);
        let line = self.current_token().line;
        self.parse_property_header(depth, &mut builder)?;
        self.parse_handles_or_implements(depth, &mut builder)?;
        self.expect_terminator()?;
        self.open_block_at(Block::Property, line);

        loop {
            if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Colon) {
                builder.child(self.leaf(NodeKind::BlankLine));
                continue;
            }
            if matches!(
                self.kind_at(self.skip_member_prefix(self.current)),
                TokenKind::Keyword(Keyword::Get | Keyword::Set)
            ) {
                let accessor = self.parse_accessor(depth + 1);
                builder.child(accessor);
                continue;
            }
            if self.at_block_boundary() {
                break;
            }
            let err = self.new_unexpected_token("'Get' or 'Set'");
            let error = self.recover_line(err);
            builder.child(error);
        }

        Ok(self.finish_block(builder, Block::Property))
    }

    fn parse_accessor(&mut self, depth: usize) -> NodeId {
        let (kind, block) = match self.kind_at(self.skip_member_prefix(self.current)) {
            TokenKind::Keyword(Keyword::Get) => (NodeKind::GetAccessor, Block::Get),
            _ => (NodeKind::SetAccessor, Block::Set),
        };

        let mut builder = self.start(kind);
        self.open_block(block);
        if let Err(err) = self.parse_accessor_header(depth, &mut builder, block) {
            let error = self.recover_line(err);
            builder.child(error);
        }
        self.parse_block_body(depth, &mut builder);
        self.finish_block(builder, block)
    }

    fn parse_accessor_header(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
        block: Block,
    ) -> Result<(), ParseError> {
        self.parse_member_prefix(depth, builder)?;
        builder.child(self.expect_keyword(block.keyword())?);
        if block == Block::Set && self.peek_kind_is(TokenKind::LParen) {
            let parameters = self.parse_parameter_list(depth + 1)?;
            builder.field(Field::Parameters, parameters);
        }
        self.expect_terminator()
    }

    // Property Name As Type [= initializer]
    fn parse_auto_property(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::PropertyDeclaration);
        self.parse_property_header(depth, &mut builder)?;
        if let Some(eq) = self.eat(TokenKind::Eq) {
            builder.child(eq);
            let initializer = self.parse_expression(depth + 1)?;
            builder.field(Field::Initializer, initializer);
        }
        self.parse_handles_or_implements(depth, &mut builder)?;
        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // Events

    fn parse_event_declaration(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.resolve(
            Conflict::EventDeclaration,
            depth,
            &[
                Alternative {
                    name: "custom event",
                    viable: custom_event_ahead,
                    parse: Parser::parse_custom_event,
                },
                Alternative {
                    name: "event",
                    viable: always,
                    parse: Parser::parse_plain_event,
                },
            ],
        )
    }

    // Event Name[(params) | As Type] [Implements ...]
    fn parse_event_header(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        self.check_depth(depth)?;
        self.parse_member_prefix(depth, builder)?;

        builder.child(self.expect_keyword(Keyword::Event)?);
        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if self.peek_kind_is(TokenKind::LParen) {
            let parameters = self.parse_parameter_list(depth + 1)?;
            builder.field(Field::Parameters, parameters);
        } else if self.at_keyword(Keyword::As) {
            let as_clause = self.parse_as_clause(depth + 1)?;
            builder.child(as_clause);
        }
        self.parse_handles_or_implements(depth, builder)?;
        self.expect_terminator()
    }

    fn parse_plain_event(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::EventDeclaration);
        self.parse_event_header(depth, &mut builder)?;
        Ok(self.finish(builder))
    }

    fn parse_custom_event(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::EventDeclaration);
        let line = self.current_token().line;
        self.parse_event_header(depth, &mut builder)?;
        self.open_block_at(Block::Event, line);

        loop {
            let (kind, block) = match self.peek_kind() {
                TokenKind::Newline | TokenKind::Colon => {
                    builder.child(self.leaf(NodeKind::BlankLine));
                    continue;
                }
                TokenKind::Keyword(Keyword::AddHandler) => {
                    (NodeKind::AddHandlerBlock, Block::AddHandler)
                }
                TokenKind::Keyword(Keyword::RemoveHandler) => {
                    (NodeKind::RemoveHandlerBlock, Block::RemoveHandler)
                }
                TokenKind::Keyword(Keyword::RaiseEvent) => {
                    (NodeKind::RaiseEventBlock, Block::RaiseEvent)
                }
                _ if self.at_block_boundary() => break,
                _ => {
                    let err = self.new_unexpected_token("event accessor");
                    let error = self.recover_line(err);
                    builder.child(error);
                    continue;
                }
            };
            let handler = self.parse_event_handler_block(depth + 1, kind, block);
            builder.child(handler);
        }

        Ok(self.finish_block(builder, Block::Event))
    }

    // AddHandler(params) ... End AddHandler
    fn parse_event_handler_block(&mut self, depth: usize, kind: NodeKind, block: Block) -> NodeId {
        let mut builder = self.start(kind);
        self.open_block(block);
        builder.child(self.token_leaf());

        let header = if self.peek_kind_is(TokenKind::LParen) {
            self.parse_parameter_list(depth + 1).map(|parameters| {
                builder.field(Field::Parameters, parameters);
            })
        } else {
            Ok(())
        };
        if let Err(err) = header.and_then(|_| self.expect_terminator()) {
            let error = self.recover_line(err);
            builder.child(error);
        }

        self.parse_block_body(depth, &mut builder);
        self.finish_block(builder, block)
    }
}
