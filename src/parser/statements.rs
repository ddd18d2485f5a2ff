use super::helpers::is_identifier_like;
use super::resolver::{Alternative, Conflict, always};
use super::{Block, NodeBuilder, ParseError, Parser};
use crate::cst::{Field, NodeId, NodeKind};
use crate::lexer::{Keyword, TokenKind};

// `name:` at the start of a statement
fn at_label(parser: &Parser) -> bool {
    is_identifier_like(parser.peek_kind()) && parser.peek_next_kind(1) == TokenKind::Colon
}

fn is_relational_operator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::LtEq
            | TokenKind::GtEq
    )
}

// Recursive statement parsing methods
impl<'a> Parser<'a> {
    /// Parse one statement with its terminator.
    /// Never fails: an unparseable line becomes an ERROR node.
    pub(super) fn parse_statement(&mut self, depth: usize) -> NodeId {
        let checkpoint = self.checkpoint();
        match self.parse_statement_kind(depth) {
            Ok(inner) => self.wrap(NodeKind::Statement, inner),
            Err(err) => {
                self.restore(checkpoint);
                self.recover_line(err)
            }
        }
    }

    /// Statements up to the next line that belongs to an enclosing block
    pub(super) fn parse_block_body(&mut self, depth: usize, builder: &mut NodeBuilder) {
        while !self.at_block_boundary() {
            let statement = self.parse_statement(depth + 1);
            builder.child(statement);
        }
    }

    /// Consume the closer of `block` and its terminator, or mark the node partial
    pub(super) fn finish_block(&mut self, mut builder: NodeBuilder, block: Block) -> NodeId {
        if self.close_block(&mut builder, block) {
            self.terminator_or_recover(&mut builder);
        }
        self.finish(builder)
    }

    fn parse_statement_kind(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.check_depth(depth)?;

        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Colon => Ok(self.leaf(NodeKind::EmptyStatement)),
            TokenKind::PreprocessorDirective => {
                let mut builder = self.start(NodeKind::PreprocessorDirective);
                builder.child(self.token_leaf());
                self.expect_terminator()?;
                Ok(self.finish(builder))
            }
            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Dim | Keyword::Static => self.parse_dim_statement(depth),
                Keyword::Const => self.parse_const_declaration(depth),
                Keyword::Call => self.parse_call_statement(depth),
                Keyword::If if self.peek_next_kind(1) == TokenKind::LParen => self.resolve(
                    Conflict::IfStatement,
                    depth,
                    &[
                        Alternative {
                            name: "call_statement",
                            viable: always,
                            parse: Parser::parse_call_statement,
                        },
                        Alternative {
                            name: "if_statement",
                            viable: always,
                            parse: Parser::parse_if_statement,
                        },
                    ],
                ),
                Keyword::If => self.parse_if_statement(depth),
                Keyword::Select => self.parse_select_statement(depth),
                Keyword::While => self.parse_while_statement(depth),
                Keyword::Do => self.parse_do_statement(depth),
                Keyword::For if self.peek_next_kind(1).is_keyword(Keyword::Each) => {
                    self.parse_for_each_statement(depth)
                }
                Keyword::For => self.parse_for_statement(depth),
                Keyword::Try => self.parse_try_statement(depth),
                Keyword::With => self.parse_with_statement(depth),
                Keyword::Using => self.parse_using_statement(depth),
                Keyword::SyncLock => self.parse_sync_lock_statement(depth),
                Keyword::Return => self.parse_optional_value(depth, NodeKind::ReturnStatement),
                Keyword::Throw => self.parse_optional_value(depth, NodeKind::ThrowStatement),
                Keyword::Exit => self.parse_exit_statement(),
                Keyword::Continue => self.parse_continue_statement(),
                Keyword::GoTo => self.parse_goto_statement(),
                Keyword::ReDim => self.parse_redim_statement(depth),
                Keyword::AddHandler => {
                    self.parse_handler_statement(depth, NodeKind::AddHandlerStatement)
                }
                Keyword::RemoveHandler => {
                    self.parse_handler_statement(depth, NodeKind::RemoveHandlerStatement)
                }
                Keyword::RaiseEvent => self.parse_raise_event_statement(depth),
                _ => self.parse_expression_statement(depth),
            },
            _ => self.parse_expression_statement(depth),
        }
    }

    // label, assignment or call, in that order
    fn parse_expression_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        self.resolve(
            Conflict::LabelStatementExpression,
            depth,
            &[
                Alternative {
                    name: "label_statement",
                    viable: at_label,
                    parse: Parser::parse_label_statement,
                },
                Alternative {
                    name: "assignment_statement",
                    viable: always,
                    parse: Parser::parse_assignment_statement,
                },
                Alternative {
                    name: "call_statement",
                    viable: always,
                    parse: Parser::parse_call_statement,
                },
            ],
        )
    }

    fn parse_label_statement(&mut self, _depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::LabelStatement);
        let label = self.identifier()?;
        builder.field(Field::Label, label);
        builder.child(self.expect(TokenKind::Colon, "':'")?);
        Ok(self.finish(builder))
    }

    fn parse_assignment_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::AssignmentStatement);

        let target = self.parse_left_hand_side(depth + 1)?;
        builder.field(Field::Left, target);

        if !self.peek_kind().is_assignment_operator() {
            return Err(self.new_unexpected_token("assignment operator"));
        }
        let operator = self.token_leaf();
        builder.field(Field::Operator, operator);

        let value = self.parse_expression(depth + 1)?;
        builder.field(Field::Right, value);

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // [Call] expression
    fn parse_call_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::CallStatement);
        if let Some(call) = self.eat_keyword(Keyword::Call) {
            builder.child(call);
        }
        let expression = self.parse_expression(depth + 1)?;
        builder.child(expression);
        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    /// Dim|Static name[bounds] [As ...] [= value], ...
    fn parse_dim_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::DimStatement);
        builder.child(self.token_leaf()); // 'Dim' or 'Static'

        loop {
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

            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // If statements

    fn parse_if_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::IfStatement);
        builder.child(self.expect_keyword(Keyword::If)?);

        let condition = self.parse_expression(depth + 1)?;
        builder.field(Field::Condition, condition);

        match self.eat_keyword(Keyword::Then) {
            Some(then) => builder.child(then),
            None if self.at_terminator() => {}
            None => return Err(self.new_unexpected_token("'Then'")),
        }

        // Block form iff the line ends right after `Then`
        if matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Colon | TokenKind::Eof
        ) {
            self.open_block(Block::If);
            self.expect_terminator()?;
            return Ok(self.parse_if_block(depth, builder));
        }

        self.single_line_if += 1;
        let then_branch = self.parse_statement(depth + 1);
        builder.field(Field::ThenBranch, then_branch);
        if let Some(else_keyword) = self.eat_keyword(Keyword::Else) {
            builder.child(else_keyword);
            let else_branch = self.parse_statement(depth + 1);
            builder.field(Field::ElseBranch, else_branch);
        }
        self.single_line_if -= 1;

        Ok(self.finish(builder))
    }

    fn parse_if_block(&mut self, depth: usize, mut builder: NodeBuilder) -> NodeId {
        self.parse_block_body(depth, &mut builder);

        loop {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::ElseIf) => {
                    let clause = self.parse_else_if_clause(depth);
                    builder.child(clause);
                }
                TokenKind::Keyword(Keyword::Else)
                    if self.peek_next_kind(1).is_keyword(Keyword::If) =>
                {
                    let clause = self.parse_else_if_clause(depth);
                    builder.child(clause);
                }
                TokenKind::Keyword(Keyword::Else) => {
                    let clause = self.parse_else_clause(depth);
                    builder.field(Field::ElseBranch, clause);
                }
                _ => break,
            }
        }

        self.finish_block(builder, Block::If)
    }

    // ElseIf (or `Else If`) condition [Then]
    fn parse_else_if_clause(&mut self, depth: usize) -> NodeId {
        let mut builder = self.start(NodeKind::ElseIfClause);
        if let Err(err) = self.parse_else_if_header(depth, &mut builder) {
            let error = self.recover_line(err);
            builder.child(error);
        }
        self.parse_block_body(depth, &mut builder);
        self.finish(builder)
    }

    fn parse_else_if_header(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        builder.child(self.token_leaf());
        if let Some(if_keyword) = self.eat_keyword(Keyword::If) {
            builder.child(if_keyword);
        }
        let condition = self.parse_expression(depth + 1)?;
        builder.field(Field::Condition, condition);
        if let Some(then) = self.eat_keyword(Keyword::Then) {
            builder.child(then);
        }
        self.expect_terminator()
    }

    fn parse_else_clause(&mut self, depth: usize) -> NodeId {
        let mut builder = self.start(NodeKind::ElseClause);
        builder.child(self.token_leaf()); // 'Else'
        self.terminator_or_recover(&mut builder);
        self.parse_block_body(depth, &mut builder);
        self.finish(builder)
    }

    // Select Case

    fn parse_select_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::SelectCaseStatement);
        self.open_block(Block::Select);
        builder.child(self.token_leaf()); // 'Select'
        if let Some(case) = self.eat_keyword(Keyword::Case) {
            builder.child(case);
        }

        let selector = self.parse_expression(depth + 1)?;
        builder.field(Field::Selector, selector);
        self.expect_terminator()?;

        loop {
            if self.at_keyword(Keyword::Case) {
                let block = if self.peek_next_kind(1).is_keyword(Keyword::Else) {
                    self.parse_case_else_block(depth)
                } else {
                    self.parse_case_block(depth)
                };
                builder.child(block);
                continue;
            }
            if self.at_block_boundary() {
                break;
            }
            // Statements before the first Case
            let stray = self.parse_statement(depth + 1);
            builder.child(stray);
        }

        Ok(self.finish_block(builder, Block::Select))
    }

    fn parse_case_block(&mut self, depth: usize) -> NodeId {
        let mut builder = self.start(NodeKind::CaseBlock);
        builder.child(self.token_leaf()); // 'Case'
        if let Err(err) = self.parse_case_clauses(depth, &mut builder) {
            let error = self.recover_line(err);
            builder.child(error);
        }
        self.parse_block_body(depth, &mut builder);
        self.finish(builder)
    }

    fn parse_case_clauses(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        loop {
            let clause = self.parse_case_clause(depth + 1)?;
            builder.child(clause);
            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }
        self.expect_terminator()
    }

    /// `Is <op> expr`, `<op> expr`, `low To high`, or `expr`
    fn parse_case_clause(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::CaseClause);

        if let Some(is_keyword) = self.eat_keyword(Keyword::Is) {
            builder.child(is_keyword);
            if !is_relational_operator(self.peek_kind()) {
                return Err(self.new_unexpected_token("relational operator"));
            }
        }

        if is_relational_operator(self.peek_kind()) {
            builder.child(self.leaf(NodeKind::RelationalOperator));
            let value = self.parse_expression(depth + 1)?;
            builder.child(value);
            return Ok(self.finish(builder));
        }

        let low = self.parse_expression(depth + 1)?;
        builder.child(low);
        if let Some(to) = self.eat_keyword(Keyword::To) {
            builder.child(to);
            let high = self.parse_expression(depth + 1)?;
            builder.child(high);
        }
        Ok(self.finish(builder))
    }

    fn parse_case_else_block(&mut self, depth: usize) -> NodeId {
        let mut builder = self.start(NodeKind::CaseElseBlock);
        builder.child(self.token_leaf()); // 'Case'
        builder.child(self.token_leaf()); // 'Else'
        self.terminator_or_recover(&mut builder);
        self.parse_block_body(depth, &mut builder);
        self.finish(builder)
    }

    // Loops

    fn parse_while_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::WhileStatement);
        self.open_block(Block::While);
        builder.child(self.token_leaf()); // 'While'

        let condition = self.parse_expression(depth + 1)?;
        builder.field(Field::Condition, condition);
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_block(builder, Block::While))
    }

    /// Do [While|Until cond] ... Loop [While|Until cond]
    fn parse_do_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::DoStatement);
        self.open_block(Block::Do);
        builder.child(self.token_leaf()); // 'Do'

        if self.at_loop_condition() {
            self.parse_loop_condition(depth, &mut builder)?;
        }
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);

        if self.close_block(&mut builder, Block::Do) {
            if self.at_loop_condition() {
                if let Err(err) = self.parse_loop_condition(depth, &mut builder) {
                    let error = self.recover_line(err);
                    builder.child(error);
                    return Ok(self.finish(builder));
                }
            }
            self.terminator_or_recover(&mut builder);
        }
        Ok(self.finish(builder))
    }

    fn at_loop_condition(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Keyword(Keyword::While | Keyword::Until)
        )
    }

    fn parse_loop_condition(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        builder.child(self.token_leaf()); // 'While' or 'Until'
        let condition = self.parse_expression(depth + 1)?;
        builder.field(Field::Condition, condition);
        Ok(())
    }

    /// For i [As T] = start To end [Step step] ... Next [i]
    fn parse_for_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ForStatement);
        self.open_block(Block::For);
        builder.child(self.token_leaf()); // 'For'

        let variable = self.identifier()?;
        builder.field(Field::Variable, variable);
        if self.at_keyword(Keyword::As) {
            let as_clause = self.parse_as_clause(depth + 1)?;
            builder.child(as_clause);
        }

        builder.child(self.expect(TokenKind::Eq, "'='")?);
        let start = self.parse_expression(depth + 1)?;
        builder.field(Field::Start, start);

        builder.child(self.expect_keyword(Keyword::To)?);
        let end = self.parse_expression(depth + 1)?;
        builder.field(Field::End, end);

        if let Some(step_keyword) = self.eat_keyword(Keyword::Step) {
            builder.child(step_keyword);
            let step = self.parse_expression(depth + 1)?;
            builder.field(Field::Step, step);
        }
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_next(builder))
    }

    /// For Each x [As T] In collection ... Next [x]
    fn parse_for_each_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ForEachStatement);
        self.open_block(Block::For);
        builder.child(self.token_leaf()); // 'For'
        builder.child(self.token_leaf()); // 'Each'

        let variable = self.identifier()?;
        builder.field(Field::Variable, variable);
        if self.at_keyword(Keyword::As) {
            let as_clause = self.parse_as_clause(depth + 1)?;
            builder.child(as_clause);
        }

        builder.child(self.expect_keyword(Keyword::In)?);
        let collection = self.parse_expression(depth + 1)?;
        builder.field(Field::Collection, collection);
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_next(builder))
    }

    // `Next` may repeat the loop variable
    fn finish_next(&mut self, mut builder: NodeBuilder) -> NodeId {
        if self.close_block(&mut builder, Block::For) {
            if self.at_identifier() {
                builder.child(self.leaf(NodeKind::Variable));
            }
            self.terminator_or_recover(&mut builder);
        }
        self.finish(builder)
    }

    // Try / Catch / Finally

    fn parse_try_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::TryStatement);
        self.open_block(Block::Try);
        builder.child(self.token_leaf()); // 'Try'
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);

        loop {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::Catch) => {
                    let catch = self.parse_catch_block(depth);
                    builder.child(catch);
                }
                TokenKind::Keyword(Keyword::Finally) => {
                    let finally = self.parse_finally_block(depth);
                    builder.child(finally);
                }
                _ => break,
            }
        }

        Ok(self.finish_block(builder, Block::Try))
    }

    fn parse_catch_block(&mut self, depth: usize) -> NodeId {
        let mut builder = self.start(NodeKind::CatchBlock);
        builder.child(self.token_leaf()); // 'Catch'
        if let Err(err) = self.parse_catch_header(depth, &mut builder) {
            let error = self.recover_line(err);
            builder.child(error);
        }
        self.parse_block_body(depth, &mut builder);
        self.finish(builder)
    }

    // [ex [As Type]] [When filter]
    fn parse_catch_header(
        &mut self,
        depth: usize,
        builder: &mut NodeBuilder,
    ) -> Result<(), ParseError> {
        if self.at_identifier() && !self.at_keyword(Keyword::When) {
            let exception = self.identifier()?;
            builder.field(Field::Exception, exception);
            if let Some(as_keyword) = self.eat_keyword(Keyword::As) {
                builder.child(as_keyword);
                let ty = self.parse_type(depth + 1, true)?;
                builder.field(Field::Type, ty);
            }
        }
        if let Some(when) = self.eat_keyword(Keyword::When) {
            builder.child(when);
            let filter = self.parse_expression(depth + 1)?;
            builder.field(Field::Filter, filter);
        }
        self.expect_terminator()
    }

    fn parse_finally_block(&mut self, depth: usize) -> NodeId {
        let mut builder = self.start(NodeKind::FinallyBlock);
        builder.child(self.token_leaf()); // 'Finally'
        self.terminator_or_recover(&mut builder);
        self.parse_block_body(depth, &mut builder);
        self.finish(builder)
    }

    // With / Using / SyncLock

    fn parse_with_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::WithStatement);
        self.open_block(Block::With);
        builder.child(self.token_leaf()); // 'With'

        let target = self.parse_expression(depth + 1)?;
        builder.field(Field::Target, target);
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_block(builder, Block::With))
    }

    /// Using r As New T(), s = expr ... or Using expr
    fn parse_using_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::UsingStatement);
        self.open_block(Block::Using);
        builder.child(self.token_leaf()); // 'Using'

        if self.at_identifier()
            && matches!(
                self.peek_next_kind(1),
                TokenKind::Keyword(Keyword::As) | TokenKind::Eq
            )
        {
            loop {
                let resource = self.identifier()?;
                builder.field(Field::Resource, resource);
                if self.at_keyword(Keyword::As) {
                    let as_clause = self.parse_as_clause(depth + 1)?;
                    builder.child(as_clause);
                }
                if let Some(eq) = self.eat(TokenKind::Eq) {
                    builder.child(eq);
                    let value = self.parse_expression(depth + 1)?;
                    builder.field(Field::Value, value);
                }
                match self.eat(TokenKind::Comma) {
                    Some(comma) => builder.child(comma),
                    None => break,
                }
            }
        } else {
            let value = self.parse_expression(depth + 1)?;
            builder.field(Field::Value, value);
        }
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_block(builder, Block::Using))
    }

    fn parse_sync_lock_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::SyncLockStatement);
        self.open_block(Block::SyncLock);
        builder.child(self.token_leaf()); // 'SyncLock'

        let lock = self.parse_expression(depth + 1)?;
        builder.field(Field::Lock, lock);
        self.expect_terminator()?;

        self.parse_block_body(depth, &mut builder);
        Ok(self.finish_block(builder, Block::SyncLock))
    }

    // Simple statements

    // Return [expr] / Throw [expr]
    fn parse_optional_value(&mut self, depth: usize, kind: NodeKind) -> Result<NodeId, ParseError> {
        let mut builder = self.start(kind);
        builder.child(self.token_leaf());
        if !self.at_terminator() {
            let value = self.parse_expression(depth + 1)?;
            builder.child(value);
        }
        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    fn parse_exit_statement(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ExitStatement);
        builder.child(self.token_leaf()); // 'Exit'
        match self.peek_kind() {
            TokenKind::Keyword(
                Keyword::Sub
                | Keyword::Function
                | Keyword::Property
                | Keyword::Do
                | Keyword::For
                | Keyword::While
                | Keyword::Select
                | Keyword::Try,
            ) => builder.child(self.token_leaf()),
            _ => return Err(self.new_unexpected_token("block kind after 'Exit'")),
        }
        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    fn parse_continue_statement(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::ContinueStatement);
        builder.child(self.token_leaf()); // 'Continue'
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Do | Keyword::For | Keyword::While) => {
                builder.child(self.token_leaf())
            }
            _ => return Err(self.new_unexpected_token("'Do', 'For' or 'While'")),
        }
        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // GoTo label, where the label may be a line number
    fn parse_goto_statement(&mut self) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::GotoStatement);
        builder.child(self.token_leaf()); // 'GoTo'
        let label = match self.peek_kind() {
            TokenKind::IntegerLiteral => self.leaf(NodeKind::Identifier),
            _ => self.identifier()?,
        };
        builder.field(Field::Label, label);
        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    /// ReDim [Preserve] name(bounds), ...
    fn parse_redim_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::RedimStatement);
        builder.child(self.token_leaf()); // 'ReDim'
        if let Some(preserve) = self.eat_keyword(Keyword::Preserve) {
            builder.child(preserve);
        }

        loop {
            let mut array = self.identifier()?;
            while self.peek_kind_is(TokenKind::Dot) {
                array = self.parse_member_access(array)?;
            }
            builder.field(Field::Array, array);

            let clause = self.parse_re_dim_clause(depth + 1)?;
            builder.child(clause);

            match self.eat(TokenKind::Comma) {
                Some(comma) => builder.child(comma),
                None => break,
            }
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    // AddHandler|RemoveHandler event, handler
    fn parse_handler_statement(&mut self, depth: usize, kind: NodeKind) -> Result<NodeId, ParseError> {
        let mut builder = self.start(kind);
        builder.child(self.token_leaf());

        let event = self.parse_expression(depth + 1)?;
        builder.field(Field::Event, event);
        builder.child(self.expect(TokenKind::Comma, "','")?);
        let handler = self.parse_expression(depth + 1)?;
        builder.field(Field::Handler, handler);

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }

    fn parse_raise_event_statement(&mut self, depth: usize) -> Result<NodeId, ParseError> {
        let mut builder = self.start(NodeKind::RaiseEventStatement);
        builder.child(self.token_leaf()); // 'RaiseEvent'

        let name = self.identifier()?;
        builder.field(Field::Name, name);
        if self.peek_kind_is(TokenKind::LParen) {
            let arguments = self.parse_argument_list(depth + 1)?;
            builder.field(Field::Arguments, arguments);
        }

        self.expect_terminator()?;
        Ok(self.finish(builder))
    }
}
