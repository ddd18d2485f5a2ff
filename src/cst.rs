use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

use crate::lexer::TokenKind;

pub type NodeId = usize;

// Node kinds in the concrete syntax tree
//
// Named kinds carry grammar rule names; keyword and punctuation leaves are
// anonymous `Token` nodes named after their spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SourceFile,

    // File level
    OptionStatements,
    ImportsStatement,
    NamespaceName,
    NamespaceBlock,
    AttributeBlock,
    Attribute,
    BlankLine,

    // Type declarations
    TypeDeclaration,
    ClassBlock,
    ModuleBlock,
    StructureBlock,
    InterfaceBlock,
    EnumBlock,
    EnumMember,
    DelegateDeclaration,
    InheritsClause,
    ImplementsClause,
    HandlesClause,
    TypeParameters,
    TypeParameter,
    TypeConstraint,
    Modifiers,
    Modifier,

    // Members
    ConstDeclaration,
    FieldDeclaration,
    VariableDeclarator,
    MethodDeclaration,
    ConstructorDeclaration,
    PropertyDeclaration,
    GetAccessor,
    SetAccessor,
    EventDeclaration,
    AddHandlerBlock,
    RemoveHandlerBlock,
    RaiseEventBlock,
    ParameterList,
    Parameter,

    // Types
    Type,
    PrimitiveType,
    TypeArgumentList,
    ArrayRankSpecifier,
    AsClause,

    // Statements
    Statement,
    EmptyStatement,
    LabelStatement,
    DimStatement,
    AssignmentStatement,
    LeftHandSide,
    CallStatement,
    IfStatement,
    ElseIfClause,
    ElseClause,
    SelectCaseStatement,
    CaseBlock,
    CaseElseBlock,
    CaseClause,
    RelationalOperator,
    WhileStatement,
    DoStatement,
    ForStatement,
    ForEachStatement,
    Variable,
    TryStatement,
    CatchBlock,
    FinallyBlock,
    WithStatement,
    UsingStatement,
    SyncLockStatement,
    ReturnStatement,
    ExitStatement,
    ContinueStatement,
    ThrowStatement,
    GotoStatement,
    RedimStatement,
    ReDimClause,
    AddHandlerStatement,
    RemoveHandlerStatement,
    RaiseEventStatement,
    PreprocessorDirective,

    // Expressions
    Expression,
    ParenthesizedExpression,
    Invocation,
    ArgumentList,
    Argument,
    MemberAccess,
    ElementAccess,
    NewExpression,
    ObjectInitializers,
    ObjectInitializer,
    UnaryExpression,
    BinaryExpression,
    TernaryExpression,
    TypeOfExpression,

    // Literals and names
    Literal,
    BooleanLiteral,
    IntegerLiteral,
    FloatingPointLiteral,
    StringLiteral,
    CharacterLiteral,
    DateLiteral,
    Identifier,

    Error,

    // Anonymous keyword or punctuation leaf
    Token(TokenKind),
}

static NAMED_KINDS: &[(NodeKind, &str)] = &[
    (NodeKind::SourceFile, "source_file"),
    (NodeKind::OptionStatements, "option_statements"),
    (NodeKind::ImportsStatement, "imports_statement"),
    (NodeKind::NamespaceName, "namespace_name"),
    (NodeKind::NamespaceBlock, "namespace_block"),
    (NodeKind::AttributeBlock, "attribute_block"),
    (NodeKind::Attribute, "attribute"),
    (NodeKind::BlankLine, "blank_line"),
    (NodeKind::TypeDeclaration, "type_declaration"),
    (NodeKind::ClassBlock, "class_block"),
    (NodeKind::ModuleBlock, "module_block"),
    (NodeKind::StructureBlock, "structure_block"),
    (NodeKind::InterfaceBlock, "interface_block"),
    (NodeKind::EnumBlock, "enum_block"),
    (NodeKind::EnumMember, "enum_member"),
    (NodeKind::DelegateDeclaration, "delegate_declaration"),
    (NodeKind::InheritsClause, "inherits_clause"),
    (NodeKind::ImplementsClause, "implements_clause"),
    (NodeKind::HandlesClause, "handles_clause"),
    (NodeKind::TypeParameters, "type_parameters"),
    (NodeKind::TypeParameter, "type_parameter"),
    (NodeKind::TypeConstraint, "type_constraint"),
    (NodeKind::Modifiers, "modifiers"),
    (NodeKind::Modifier, "modifier"),
    (NodeKind::ConstDeclaration, "const_declaration"),
    (NodeKind::FieldDeclaration, "field_declaration"),
    (NodeKind::VariableDeclarator, "variable_declarator"),
    (NodeKind::MethodDeclaration, "method_declaration"),
    (NodeKind::ConstructorDeclaration, "constructor_declaration"),
    (NodeKind::PropertyDeclaration, "property_declaration"),
    (NodeKind::GetAccessor, "get_accessor"),
    (NodeKind::SetAccessor, "set_accessor"),
    (NodeKind::EventDeclaration, "event_declaration"),
    (NodeKind::AddHandlerBlock, "add_handler_block"),
    (NodeKind::RemoveHandlerBlock, "remove_handler_block"),
    (NodeKind::RaiseEventBlock, "raise_event_block"),
    (NodeKind::ParameterList, "parameter_list"),
    (NodeKind::Parameter, "parameter"),
    (NodeKind::Type, "type"),
    (NodeKind::PrimitiveType, "primitive_type"),
    (NodeKind::TypeArgumentList, "type_argument_list"),
    (NodeKind::ArrayRankSpecifier, "array_rank_specifier"),
    (NodeKind::AsClause, "as_clause"),
    (NodeKind::Statement, "statement"),
    (NodeKind::EmptyStatement, "empty_statement"),
    (NodeKind::LabelStatement, "label_statement"),
    (NodeKind::DimStatement, "dim_statement"),
    (NodeKind::AssignmentStatement, "assignment_statement"),
    (NodeKind::LeftHandSide, "left_hand_side"),
    (NodeKind::CallStatement, "call_statement"),
    (NodeKind::IfStatement, "if_statement"),
    (NodeKind::ElseIfClause, "elseif_clause"),
    (NodeKind::ElseClause, "else_clause"),
    (NodeKind::SelectCaseStatement, "select_case_statement"),
    (NodeKind::CaseBlock, "case_block"),
    (NodeKind::CaseElseBlock, "case_else_block"),
    (NodeKind::CaseClause, "case_clause"),
    (NodeKind::RelationalOperator, "relational_operator"),
    (NodeKind::WhileStatement, "while_statement"),
    (NodeKind::DoStatement, "do_statement"),
    (NodeKind::ForStatement, "for_statement"),
    (NodeKind::ForEachStatement, "for_each_statement"),
    (NodeKind::Variable, "variable"),
    (NodeKind::TryStatement, "try_statement"),
    (NodeKind::CatchBlock, "catch_block"),
    (NodeKind::FinallyBlock, "finally_block"),
    (NodeKind::WithStatement, "with_statement"),
    (NodeKind::UsingStatement, "using_statement"),
    (NodeKind::SyncLockStatement, "sync_lock_statement"),
    (NodeKind::ReturnStatement, "return_statement"),
    (NodeKind::ExitStatement, "exit_statement"),
    (NodeKind::ContinueStatement, "continue_statement"),
    (NodeKind::ThrowStatement, "throw_statement"),
    (NodeKind::GotoStatement, "goto_statement"),
    (NodeKind::RedimStatement, "redim_statement"),
    (NodeKind::ReDimClause, "re_dim_clause"),
    (NodeKind::AddHandlerStatement, "add_handler_statement"),
    (NodeKind::RemoveHandlerStatement, "remove_handler_statement"),
    (NodeKind::RaiseEventStatement, "raise_event_statement"),
    (NodeKind::PreprocessorDirective, "preprocessor_directive"),
    (NodeKind::Expression, "expression"),
    (NodeKind::ParenthesizedExpression, "parenthesized_expression"),
    (NodeKind::Invocation, "invocation"),
    (NodeKind::ArgumentList, "argument_list"),
    (NodeKind::Argument, "argument"),
    (NodeKind::MemberAccess, "member_access"),
    (NodeKind::ElementAccess, "element_access"),
    (NodeKind::NewExpression, "new_expression"),
    (NodeKind::ObjectInitializers, "object_initializers"),
    (NodeKind::ObjectInitializer, "object_initializer"),
    (NodeKind::UnaryExpression, "unary_expression"),
    (NodeKind::BinaryExpression, "binary_expression"),
    (NodeKind::TernaryExpression, "ternary_expression"),
    (NodeKind::TypeOfExpression, "type_of_expression"),
    (NodeKind::Literal, "literal"),
    (NodeKind::BooleanLiteral, "boolean_literal"),
    (NodeKind::IntegerLiteral, "integer_literal"),
    (NodeKind::FloatingPointLiteral, "floating_point_literal"),
    (NodeKind::StringLiteral, "string_literal"),
    (NodeKind::CharacterLiteral, "character_literal"),
    (NodeKind::DateLiteral, "date_literal"),
    (NodeKind::Identifier, "identifier"),
    (NodeKind::Error, "ERROR"),
];

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Token(kind) => kind.as_str(),
            named => NAMED_KINDS
                .iter()
                .find(|(kind, _)| kind == named)
                .map_or("unknown", |(_, name)| name),
        }
    }

    /// Look up a named kind by its rule name
    pub fn from_name(name: &str) -> Option<NodeKind> {
        NAMED_KINDS
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(kind, _)| *kind)
    }

    pub fn is_named(&self) -> bool {
        !matches!(self, NodeKind::Token(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Field labels attached to child positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Modifiers,
    Attributes,
    Namespace,
    Inherits,
    Implements,
    Handles,
    Value,
    Parameters,
    ReturnType,
    Constraint,
    Target,
    Initializer,
    Type,
    DefaultValue,
    Label,
    Left,
    Right,
    Operator,
    Operand,
    Condition,
    ThenBranch,
    ElseBranch,
    Selector,
    Variable,
    Start,
    End,
    Step,
    Collection,
    Exception,
    Filter,
    Resource,
    Lock,
    Array,
    UpperBound,
    Object,
    Member,
    Index,
    Arguments,
    TrueBranch,
    FalseBranch,
    Event,
    Handler,
}

static FIELD_NAMES: &[(Field, &str)] = &[
    (Field::Name, "name"),
    (Field::Modifiers, "modifiers"),
    (Field::Attributes, "attributes"),
    (Field::Namespace, "namespace"),
    (Field::Inherits, "inherits"),
    (Field::Implements, "implements"),
    (Field::Handles, "handles"),
    (Field::Value, "value"),
    (Field::Parameters, "parameters"),
    (Field::ReturnType, "return_type"),
    (Field::Constraint, "constraint"),
    (Field::Target, "target"),
    (Field::Initializer, "initializer"),
    (Field::Type, "type"),
    (Field::DefaultValue, "default_value"),
    (Field::Label, "label"),
    (Field::Left, "left"),
    (Field::Right, "right"),
    (Field::Operator, "operator"),
    (Field::Operand, "operand"),
    (Field::Condition, "condition"),
    (Field::ThenBranch, "then_branch"),
    (Field::ElseBranch, "else_branch"),
    (Field::Selector, "selector"),
    (Field::Variable, "variable"),
    (Field::Start, "start"),
    (Field::End, "end"),
    (Field::Step, "step"),
    (Field::Collection, "collection"),
    (Field::Exception, "exception"),
    (Field::Filter, "filter"),
    (Field::Resource, "resource"),
    (Field::Lock, "lock"),
    (Field::Array, "array"),
    (Field::UpperBound, "upper_bound"),
    (Field::Object, "object"),
    (Field::Member, "member"),
    (Field::Index, "index"),
    (Field::Arguments, "arguments"),
    (Field::TrueBranch, "true_branch"),
    (Field::FalseBranch, "false_branch"),
    (Field::Event, "event"),
    (Field::Handler, "handler"),
];

impl Field {
    pub fn name(&self) -> &'static str {
        FIELD_NAMES
            .iter()
            .find(|(field, _)| field == self)
            .map_or("unknown", |(_, name)| name)
    }

    pub fn from_name(name: &str) -> Option<Field> {
        FIELD_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(field, _)| *field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// Unparseable region
        const ERROR = 1 << 0;
        /// Block opener whose closer is missing
        const PARTIAL = 1 << 1;
        /// Some descendant is an error or partial node
        const HAS_ERROR = 1 << 2;
    }
}

/// Byte range in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub children: Vec<NodeId>,
    pub fields: Vec<(Field, NodeId)>,
    pub token: Option<usize>, // Index into the token stream (leaves only)
    pub parent: Option<NodeId>,
    pub flags: NodeFlags,
    pub(crate) first_token: usize,
}

impl Node {
    pub fn is_named(&self) -> bool {
        self.kind.is_named()
    }

    pub fn is_error(&self) -> bool {
        self.flags.contains(NodeFlags::ERROR)
    }

    pub fn is_partial(&self) -> bool {
        self.flags.contains(NodeFlags::PARTIAL)
    }

    /// Whether this node or any descendant is an error or partial node
    pub fn has_error(&self) -> bool {
        self.flags
            .intersects(NodeFlags::ERROR | NodeFlags::PARTIAL | NodeFlags::HAS_ERROR)
    }

    pub fn field_of(&self, child: NodeId) -> Option<Field> {
        self.fields
            .iter()
            .find(|(_, id)| *id == child)
            .map(|(field, _)| *field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Lex,
    Syntax,
    StructuralMismatch,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiagnosticKind::Lex => write!(f, "lexical error"),
            DiagnosticKind::Syntax => write!(f, "syntax error"),
            DiagnosticKind::StructuralMismatch => write!(f, "structural mismatch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {kind}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

/// Line and column of a byte offset, both 1-based; columns count characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Point {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// Concrete syntax tree with single vector storage
#[derive(Debug, Clone)]
pub struct Tree {
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
    diagnostics: Vec<Diagnostic>,
    line_starts: Vec<usize>,
}

impl Tree {
    pub(crate) fn new(
        source: String,
        mut nodes: Vec<Node>,
        root: NodeId,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        // Link parents from the root down; speculative leftovers stay detached
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let children = nodes[id].children.clone();
            for child in children {
                nodes[child].parent = Some(id);
                stack.push(child);
            }
        }

        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            source,
            nodes,
            root,
            diagnostics,
            line_starts,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn named_children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(|child| self.nodes[*child].is_named())
            .collect()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn child_by_field(&self, id: NodeId, field: Field) -> Option<NodeId> {
        self.nodes[id]
            .fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, child)| *child)
    }

    pub fn children_by_field(&self, id: NodeId, field: Field) -> Vec<NodeId> {
        self.nodes[id]
            .fields
            .iter()
            .filter(|(f, _)| *f == field)
            .map(|(_, child)| *child)
            .collect()
    }

    pub fn child_by_field_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_by_field(id, Field::from_name(name)?)
    }

    pub fn text(&self, id: NodeId) -> &str {
        let span = self.nodes[id].span;
        &self.source[span.start..span.end]
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn point(&self, offset: usize) -> Point {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = self.line_starts[line];
        let column = self.source[line_start..offset].chars().count() + 1;
        Point {
            line: line + 1,
            column,
        }
    }

    pub fn start_point(&self, id: NodeId) -> Point {
        self.point(self.nodes[id].span.start)
    }

    pub fn end_point(&self, id: NodeId) -> Point {
        self.point(self.nodes[id].span.end)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_error(&self) -> bool {
        self.nodes[self.root].has_error() || !self.diagnostics.is_empty()
    }

    /// All nodes below `id` (inclusive) in pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev());
        }
        out
    }

    pub fn find_all(&self, kind: NodeKind) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.nodes[*id].kind == kind)
            .collect()
    }

    /// Render the named structure as a tree-sitter style s-expression
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(self.root, &mut out);
        out
    }

    fn write_sexp(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        out.push('(');
        out.push_str(node.kind.name());
        for &child in &node.children {
            if !self.nodes[child].is_named() {
                continue;
            }
            out.push(' ');
            if let Some(field) = node.field_of(child) {
                out.push_str(field.name());
                out.push_str(": ");
            }
            self.write_sexp(child, out);
        }
        out.push(')');
    }

    fn write_outline(
        &self,
        f: &mut fmt::Formatter,
        id: NodeId,
        field: Option<Field>,
        indent: usize,
    ) -> fmt::Result {
        let node = &self.nodes[id];
        let named = self.named_children(id);

        write!(f, "{:indent$}", "", indent = indent * 2)?;
        if let Some(field) = field {
            write!(f, "{}: ", field)?;
        }
        write!(
            f,
            "{} [{} - {}]",
            node.kind,
            self.start_point(id),
            self.end_point(id)
        )?;
        if node.is_partial() {
            write!(f, " (partial)")?;
        }
        if named.is_empty() && !node.span.is_empty() {
            write!(f, " {:?}", self.text(id).trim_end())?;
        }
        writeln!(f)?;

        for child in named {
            self.write_outline(f, child, node.field_of(child), indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_outline(f, self.root, None, 0)
    }
}
