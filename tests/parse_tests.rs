use vbnet_parser::lexer::lex;
use vbnet_parser::{
    DiagnosticKind, Field, NodeKind, ParserLimits, Query, Tree, parse, parse_with_limits,
};

const TEST_MODULE: &str = include_str!("run/hello_module/main.vb");

fn in_sub(body: &str) -> String {
    format!("Module M\n    Sub S()\n{}\n    End Sub\nEnd Module\n", body)
}

// Walk every node and check that children are ordered, disjoint and inside their parent
fn assert_spans_nested(tree: &Tree) {
    for id in tree.descendants(tree.root()) {
        let span = tree.span(id);
        let mut last_end = span.start;
        for &child in tree.children(id) {
            let child_span = tree.span(child);
            assert!(
                span.contains(child_span),
                "{} {:?} escapes {} {:?}",
                tree.kind(child),
                child_span,
                tree.kind(id),
                span
            );
            assert!(child_span.start >= last_end, "overlapping children in {}", tree.kind(id));
            last_end = child_span.end;
            assert_eq!(tree.parent(child), Some(id));
        }
    }
}

fn first_binary_sexp(source: &str) -> String {
    let tree = parse(&in_sub(&format!("        x = {}", source)));
    let assignment = tree.find_all(NodeKind::AssignmentStatement)[0];
    let right = tree.child_by_field(assignment, Field::Right).unwrap();
    operator_shape(&tree, right)
}

// (op left right) with operator spelling, leaves as their text
fn operator_shape(tree: &Tree, id: usize) -> String {
    match tree.kind(id) {
        NodeKind::Expression => operator_shape(tree, tree.named_children(id)[0]),
        NodeKind::BinaryExpression => {
            let left = tree.child_by_field(id, Field::Left).unwrap();
            let operator = tree.child_by_field(id, Field::Operator).unwrap();
            let right = tree.child_by_field(id, Field::Right).unwrap();
            format!(
                "({} {} {})",
                tree.text(operator),
                operator_shape(tree, left),
                operator_shape(tree, right)
            )
        }
        _ => tree.text(id).to_string(),
    }
}

#[test]
fn test_end_to_end_module_query() {
    let tree = parse(TEST_MODULE);
    assert!(!tree.has_error(), "{:?}", tree.diagnostics());

    let names = tree
        .capture_texts("(method_declaration name: (identifier) @method.name)", "method.name")
        .unwrap();
    assert_eq!(names, vec!["Main", "Add", "Multiply"]);

    let properties = tree.find_all(NodeKind::PropertyDeclaration);
    assert_eq!(properties.len(), 1);
    let name = tree.child_by_field(properties[0], Field::Name).unwrap();
    assert_eq!(tree.text(name), "Count");
    assert_spans_nested(&tree);
}

#[test]
fn test_sample_module_members() {
    let source = "Module TestModule\n    Sub Main()\n        Console.WriteLine(\"Hello World\")\n    End Sub\n    Function Add(a As Integer, b As Integer) As Integer\n        Return a + b\n    End Function\nEnd Module\n";
    let tree = parse(source);
    assert!(!tree.has_error());

    let module = tree.find_all(NodeKind::ModuleBlock)[0];
    let name = tree.child_by_field(module, Field::Name).unwrap();
    assert_eq!(tree.text(name), "TestModule");
    let members: Vec<usize> = tree
        .named_children(module)
        .into_iter()
        .filter(|id| tree.kind(*id) != NodeKind::Identifier)
        .collect();
    assert_eq!(members.len(), 2);

    let main = members[0];
    assert_eq!(tree.kind(main), NodeKind::MethodDeclaration);
    let parameters = tree.child_by_field(main, Field::Parameters).unwrap();
    assert!(tree.named_children(parameters).is_empty());
    assert_eq!(tree.child_by_field(main, Field::ReturnType), None);

    let add = members[1];
    let parameters = tree.child_by_field(add, Field::Parameters).unwrap();
    let params: Vec<(&str, &str)> = tree
        .named_children(parameters)
        .into_iter()
        .map(|p| {
            let name = tree.child_by_field(p, Field::Name).unwrap();
            let as_clause = tree.named_children(p)[1];
            let ty = tree.child_by_field(as_clause, Field::Type).unwrap();
            (tree.text(name), tree.text(ty))
        })
        .collect();
    assert_eq!(params, vec![("a", "Integer"), ("b", "Integer")]);
    let return_type = tree.child_by_field(add, Field::ReturnType).unwrap();
    assert_eq!(tree.text(return_type), "Integer");

    let names = tree
        .capture_texts("(method_declaration name: (identifier) @name)", "name")
        .unwrap();
    assert_eq!(names, vec!["Main", "Add"]);
}

#[test]
fn test_module_only_query() {
    let module_only = TEST_MODULE.split("\nPublic Class").next().unwrap();
    let tree = parse(module_only);
    let query = Query::new("(module_block (method_declaration name: (identifier) @name))").unwrap();
    let names: Vec<&str> = query
        .captures(&tree)
        .into_iter()
        .map(|(_, id)| tree.text(id))
        .collect();
    // One match per module; the first method completes the pattern
    assert_eq!(names, vec!["Main"]);

    let all = tree
        .capture_texts("(method_declaration name: (identifier) @name)", "name")
        .unwrap();
    assert_eq!(all, vec!["Main", "Add"]);
}

#[test]
fn test_precedence() {
    assert_eq!(first_binary_sexp("2 + 3 * 4"), "(+ 2 (* 3 4))");
    assert_eq!(first_binary_sexp("A And B OrElse C"), "(OrElse (And A B) C)");
    assert_eq!(first_binary_sexp("2 ^ 3 ^ 2"), "(^ (^ 2 3) 2)");
    assert_eq!(first_binary_sexp("a - b - c"), "(- (- a b) c)");
    assert_eq!(first_binary_sexp("a & b = c"), "(= (& a b) c)");
}

#[test]
fn test_keywords_are_case_insensitive() {
    let lower = parse("module m\n    sub main()\n        DIM x AS integer = 1\n    end SUB\nEND module\n");
    let upper = parse("Module m\n    Sub main()\n        Dim x As Integer = 1\n    End Sub\nEnd Module\n");
    assert!(!lower.has_error());
    assert_eq!(lower.to_sexp(), upper.to_sexp());
}

#[test]
fn test_line_continuation_is_trivia() {
    let continued = parse(&in_sub("        total = a + _\n            b"));
    let single = parse(&in_sub("        total = a + b"));
    assert!(!continued.has_error());
    assert_eq!(continued.to_sexp(), single.to_sexp());
}

#[test]
fn test_colon_and_newline_separate_statements_alike() {
    let colons = parse(&in_sub("        x = 1: y = 2"));
    let lines = parse(&in_sub("        x = 1\n        y = 2"));
    assert_eq!(colons.to_sexp(), lines.to_sexp());
    assert_eq!(colons.find_all(NodeKind::AssignmentStatement).len(), 2);
}

#[test]
fn test_block_closers() {
    let tree = parse(&in_sub(
        "        For i = 1 To 3\n            Do\n            Loop\n        Next",
    ));
    assert!(!tree.has_error());
    let for_statement = tree.find_all(NodeKind::ForStatement)[0];
    let last = *tree.children(for_statement).last().unwrap();
    assert_eq!(tree.text(last), "Next");
    let do_statement = tree.find_all(NodeKind::DoStatement)[0];
    let last = *tree.children(do_statement).last().unwrap();
    assert_eq!(tree.text(last), "Loop");
}

#[test]
fn test_missing_closers_are_partial() {
    let tree = parse("Module M\n    Sub S()\n        If x Then\n            y = 1\n");
    assert!(tree.has_error());
    for kind in [NodeKind::IfStatement, NodeKind::MethodDeclaration, NodeKind::ModuleBlock] {
        let nodes = tree.find_all(kind);
        assert!(
            nodes.iter().any(|id| tree.node(*id).is_partial()),
            "{} should be partial",
            kind
        );
    }
    let mismatches = tree
        .diagnostics()
        .iter()
        .filter(|d| d.kind == DiagnosticKind::StructuralMismatch)
        .count();
    assert!(mismatches >= 2);
    assert_spans_nested(&tree);
}

#[test]
fn test_reconstruction_is_byte_exact() {
    let sources = [
        TEST_MODULE,
        "Module M ' comment\r\n    Sub S()\r\n        x = a _\r\n            + 1\r\n    End Sub\r\nEnd Module",
        "  \t\n\n",
        "x = \"unterminated\n",
        "é = 1 REM tail",
    ];
    for source in sources {
        assert_eq!(lex(source).reconstruct(source), source);
    }
}

#[test]
fn test_garbage_input_still_yields_tree() {
    let inputs = ["", "@@@ ### $$$", "End End End\n", ")))\n(((\n", "Class\nSub\nEnd", "\u{0}\u{1}"];
    for input in inputs {
        let tree = parse(input);
        assert_eq!(tree.kind(tree.root()), NodeKind::SourceFile);
        assert_eq!(tree.span(tree.root()).end, input.len());
        assert_spans_nested(&tree);
    }
    assert!(parse("@@@ ### $$$").has_error());
}

#[test]
fn test_errors_are_local() {
    let source = "Module M\n    Sub A()\n        x = = 1\n        y = 2\n    End Sub\nEnd Module\n";
    let tree = parse(source);
    let errors = tree.find_all(NodeKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(tree.text(errors[0]).trim_end(), "x = = 1");
    assert_eq!(tree.find_all(NodeKind::AssignmentStatement).len(), 1);
    let module = tree.find_all(NodeKind::ModuleBlock)[0];
    assert!(!tree.node(module).is_partial());
}

#[test]
fn test_deep_nesting_is_bounded() {
    let limits = ParserLimits {
        max_nesting_depth: 64,
        ..Default::default()
    };
    let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    let tree = parse_with_limits(&in_sub(&format!("        x = {}", deep)), &limits).unwrap();
    assert!(tree.has_error());
    assert_eq!(tree.find_all(NodeKind::Error).len(), 1);

    let mut nested = String::new();
    for _ in 0..200 {
        nested.push_str("If a Then\n");
    }
    for _ in 0..200 {
        nested.push_str("End If\n");
    }
    let tree = parse_with_limits(&in_sub(&nested), &limits).unwrap();
    assert!(tree.has_error());
}

#[test]
fn test_points_are_one_based() {
    let tree = parse(TEST_MODULE);
    let method = tree.find_all(NodeKind::MethodDeclaration)[1];
    let name = tree.child_by_field(method, Field::Name).unwrap();
    assert_eq!(tree.start_point(name).line, 6);
    assert_eq!(tree.start_point(name).column, 14);
}
