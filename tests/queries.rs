//! End-to-end search and rendering over a small program graph.

use callscope::prelude::*;

/// main -> parse -> lex, main -> eval -> lex, eval -> eval (recursion),
/// parse references a table of function pointers (ref edge to apply),
/// and exit is only ever referenced while still external.
fn build_program() -> (RcuThread, CallGraph) {
    let rcu = RcuThread::register();
    let graph = CallGraph::new();
    let mut region = rcu.read_lock();

    for (name, file) in [
        ("main", "main.c"),
        ("parse", "parse.c"),
        ("eval", "eval.c"),
        ("lex", "lex.c"),
        ("apply", "eval.c"),
    ] {
        let i = graph.add_external(&mut region, name);
        graph.set_defined(&mut region, i);
        graph.set_location(&mut region, i, file, Some(1));
    }
    let exit = graph.add_external(&mut region, "exit");

    let node = |region: &RcuGuard<'_>, name: &str| graph.get_node(region, name).unwrap();
    let main = node(&region, "main");
    let parse = node(&region, "parse");
    let eval = node(&region, "eval");
    let lex = node(&region, "lex");
    let apply = node(&region, "apply");

    graph.add_edge(&mut region, main, parse, EdgeKind::Call);
    graph.add_edge(&mut region, main, eval, EdgeKind::Call);
    graph.add_edge(&mut region, parse, lex, EdgeKind::Call);
    graph.add_edge(&mut region, eval, lex, EdgeKind::Call);
    graph.add_edge(&mut region, eval, eval, EdgeKind::Call);
    graph.add_edge(&mut region, parse, apply, EdgeKind::Ref);
    graph.add_edge(&mut region, main, exit, EdgeKind::Ref);

    graph.add_label(&mut region, eval, "hot");
    graph.add_label(&mut region, lex, "hot");

    drop(region);
    (rcu, graph)
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort_unstable();
    names
}

#[test]
fn test_node_expression_by_label() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let matcher = parse_nodes("[hot]").unwrap();
    assert_eq!(
        sorted(matcher.nodes(&graph, &region)),
        vec!["eval".to_string(), "lex".into()]
    );
}

#[test]
fn test_node_expression_with_operators() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let matcher = parse_nodes("lex:callers").unwrap();
    assert_eq!(
        sorted(matcher.nodes(&graph, &region)),
        vec!["eval".to_string(), "parse".into()]
    );

    let matcher = parse_nodes("main:all_callees").unwrap();
    assert_eq!(
        sorted(matcher.nodes(&graph, &region)),
        vec![
            "apply".to_string(),
            "eval".into(),
            "exit".into(),
            "lex".into(),
            "main".into(),
            "parse".into()
        ]
    );
}

#[test]
fn test_node_expression_booleans() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let matcher = parse_nodes("[hot, /^e/]").unwrap();
    assert_eq!(matcher.nodes(&graph, &region), vec!["eval".to_string()]);

    let matcher = parse_nodes("main lex").unwrap();
    assert_eq!(
        sorted(matcher.nodes(&graph, &region)),
        vec!["lex".to_string(), "main".into()]
    );
}

#[test]
fn test_path_search_end_to_end() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let expr = parse_path(&graph, &region, "main ... lex").unwrap();
    let nfa = expr.compile();
    let mut paths = graph.paths(&region, &nfa, false, false);
    paths.sort();
    assert_eq!(
        paths,
        vec![
            vec!["main".to_string(), "eval".into(), "lex".into()],
            vec!["main".to_string(), "parse".into(), "lex".into()],
        ]
    );
}

#[test]
fn test_path_search_respects_ref_policy() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    // parse only references apply, so the path exists only when ref
    // edges are allowed.
    let expr = parse_path(&graph, &region, "parse apply").unwrap();
    let with_refs = graph.paths(&region, &expr.compile(), false, true);
    assert_eq!(with_refs.len(), 1);

    let expr = parse_path(&graph, &region, "parse apply").unwrap();
    let without_refs = graph.paths(&region, &expr.compile(), false, false);
    assert!(without_refs.is_empty());
}

#[test]
fn test_path_search_with_lazy_dfa() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let expr = parse_path(&graph, &region, "main (parse | eval) lex").unwrap();
    let nfa = expr.compile();

    let direct = graph.paths(&region, &nfa, false, false);
    let lazy = nfa.lazy_dfa();
    let through_dfa = graph.paths(&region, &lazy, false, false);
    assert_eq!(sorted_paths(direct), sorted_paths(through_dfa));
}

fn sorted_paths(mut paths: Vec<Vec<String>>) -> Vec<Vec<String>> {
    paths.sort();
    paths
}

#[test]
fn test_dot_round_trip_contains_structure() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let dot = graph.to_dot(&region, Some("program"));
    let main = graph.get_node(&region, "main").unwrap();
    let parse = graph.get_node(&region, "parse").unwrap();
    let exit = graph.get_node(&region, "exit").unwrap();

    assert!(dot.contains(&format!("n{main} [label=\"main\"];")));
    // exit never saw a definition and renders dashed.
    assert!(dot.contains(&format!("n{exit} [label=\"exit\", style=dashed];")));
    assert!(dot.contains(&format!("n{main} -> n{parse};")));
    // The function-pointer reference renders dashed.
    assert!(dot.contains(&format!("n{main} -> n{exit} [style=dashed];")));
}

#[test]
fn test_files_index_survives_queries() {
    let (rcu, graph) = build_program();
    let region = rcu.read_lock();

    let mut files = graph.all_files(&region);
    files.sort_unstable();
    assert_eq!(files, vec!["eval.c", "lex.c", "main.c", "parse.c"]);

    let in_eval: Vec<String> = graph
        .nodes_for_file(&region, "eval.c")
        .map(|i| graph.name_of(&region, i).to_string())
        .collect();
    assert_eq!(sorted(in_eval), vec!["apply".to_string(), "eval".into()]);
}
