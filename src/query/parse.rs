//! Hand-written parsers for node and path expressions.
//!
//! Node expressions select nodes:
//!
//! ```text
//! "exact name"    /pattern/    label    [a, b | !c]    f:callers:callees
//! ```
//!
//! Words are exact names at the top level and labels inside brackets.
//! Commas conjoin, pipes alternate, `!` negates, and the `:callers`,
//! `:callees`, `:all_callers`, `:all_callees` suffixes move along edges.
//!
//! Path expressions select call paths: node atoms in sequence, `(...)`
//! grouping, postfix `*`, `...` for "any number of nodes", and `|` for
//! alternation.
//!
//! Both parsers report failures as [`Error::Parse`] carrying the input
//! still unconsumed at the point of failure.

use crate::automata::Expr;
use crate::error::{Error, Result};
use crate::graph::CallGraph;
use crate::sync::RcuGuard;

use super::pattern::NodeMatcher;

/// Parses a node expression: one or more selectors, OR-ed together.
pub fn parse_nodes(input: &str) -> Result<NodeMatcher> {
    let mut cursor = Cursor::new(input);
    let mut selectors = Vec::new();

    cursor.skip_spaces();
    while let Some(matcher) = parse_outside(&mut cursor)? {
        selectors.push(matcher);
        cursor.skip_spaces();
    }

    if selectors.is_empty() || !cursor.at_end() {
        return cursor.fail();
    }
    Ok(NodeMatcher::Or(selectors).simplified())
}

/// Parses a path expression against the graph's current state.
///
/// Node atoms are compiled into predicates immediately, so the expression
/// matches the nodes as labelled and connected at parse time.
pub fn parse_path(graph: &CallGraph, region: &RcuGuard<'_>, input: &str) -> Result<Expr> {
    let mut cursor = Cursor::new(input);
    let expr = parse_alternation(&mut cursor, graph, region)?;
    cursor.skip_spaces();
    if !cursor.at_end() {
        return cursor.fail();
    }
    Ok(expr)
}

struct Cursor<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(src: &'s str) -> Self {
        Cursor { src, pos: 0 }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos == self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(Error::Parse(self.rest().to_string()))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// A bare word: a name at the top level, a label inside brackets.
fn parse_word(cursor: &mut Cursor<'_>) -> Option<String> {
    let start = cursor.pos;
    while cursor.peek().is_some_and(is_word_char) {
        cursor.bump();
    }
    if cursor.pos == start {
        None
    } else {
        Some(cursor.src[start..cursor.pos].to_string())
    }
}

/// A `"..."` literal with backslash escapes resolved.
fn parse_quoted(cursor: &mut Cursor<'_>) -> Result<Option<String>> {
    if !cursor.eat('"') {
        return Ok(None);
    }
    let mut text = String::new();
    loop {
        match cursor.bump() {
            Some('"') => return Ok(Some(text)),
            Some('\\') => match cursor.bump() {
                Some(escaped) => text.push(escaped),
                None => return cursor.fail(),
            },
            Some(c) => text.push(c),
            None => return cursor.fail(),
        }
    }
}

/// A `/.../` pattern. Only the delimiter may be escaped; other escapes
/// pass through to the regex engine.
fn parse_pattern(cursor: &mut Cursor<'_>) -> Result<Option<NodeMatcher>> {
    if !cursor.eat('/') {
        return Ok(None);
    }
    let mut pattern = String::new();
    loop {
        match cursor.bump() {
            Some('/') => {
                return Ok(Some(NodeMatcher::Pattern(regex::Regex::new(&pattern)?)));
            }
            Some('\\') => match cursor.bump() {
                Some('/') => pattern.push('/'),
                Some(escaped) => {
                    pattern.push('\\');
                    pattern.push(escaped);
                }
                None => return cursor.fail(),
            },
            Some(c) => pattern.push(c),
            None => return cursor.fail(),
        }
    }
}

/// Applies any `:callers`-family suffixes to `matcher`.
fn parse_operators(cursor: &mut Cursor<'_>, mut matcher: NodeMatcher) -> NodeMatcher {
    loop {
        let checkpoint = cursor.pos;
        cursor.skip_spaces();
        matcher = if cursor.eat_str(":all_callees") {
            NodeMatcher::AllCallees(Box::new(matcher))
        } else if cursor.eat_str(":all_callers") {
            NodeMatcher::AllCallers(Box::new(matcher))
        } else if cursor.eat_str(":callees") {
            NodeMatcher::Callees(Box::new(matcher))
        } else if cursor.eat_str(":callers") {
            NodeMatcher::Callers(Box::new(matcher))
        } else {
            cursor.pos = checkpoint;
            return matcher;
        };
    }
}

/// The selector forms shared by both contexts: quoted names, patterns and
/// bracketed groups.
fn parse_common(cursor: &mut Cursor<'_>) -> Result<Option<NodeMatcher>> {
    if let Some(name) = parse_quoted(cursor)? {
        return Ok(Some(NodeMatcher::Name(name)));
    }
    if let Some(pattern) = parse_pattern(cursor)? {
        return Ok(Some(pattern));
    }
    if cursor.eat('[') {
        let group = parse_disjunction(cursor)?;
        cursor.skip_spaces();
        if !cursor.eat(']') {
            return cursor.fail();
        }
        return Ok(Some(group));
    }
    Ok(None)
}

/// A selector inside brackets, where bare words are labels and an empty
/// selector matches everything.
fn parse_inside(cursor: &mut Cursor<'_>) -> Result<NodeMatcher> {
    let negated = cursor.eat('!');
    let base = match parse_common(cursor)? {
        Some(matcher) => matcher,
        None => match parse_word(cursor) {
            Some(label) => NodeMatcher::Label(label),
            None => NodeMatcher::And(Vec::new()),
        },
    };
    let base = if negated {
        NodeMatcher::Not(Box::new(base))
    } else {
        base
    };
    Ok(parse_operators(cursor, base))
}

fn parse_conjunction(cursor: &mut Cursor<'_>) -> Result<NodeMatcher> {
    let mut atoms = Vec::new();
    loop {
        cursor.skip_spaces();
        atoms.push(parse_inside(cursor)?);
        cursor.skip_spaces();
        if !cursor.eat(',') {
            return Ok(NodeMatcher::And(atoms).simplified());
        }
    }
}

fn parse_disjunction(cursor: &mut Cursor<'_>) -> Result<NodeMatcher> {
    let mut atoms = Vec::new();
    loop {
        atoms.push(parse_conjunction(cursor)?);
        cursor.skip_spaces();
        if !cursor.eat('|') {
            return Ok(NodeMatcher::Or(atoms).simplified());
        }
    }
}

/// A selector at the top level, where bare words are exact names and an
/// empty selector is a parse error.
fn parse_outside(cursor: &mut Cursor<'_>) -> Result<Option<NodeMatcher>> {
    let checkpoint = cursor.pos;
    let negated = cursor.eat('!');
    let base = match parse_common(cursor)? {
        Some(matcher) => matcher,
        None => match parse_word(cursor) {
            Some(name) => NodeMatcher::Name(name),
            None => {
                cursor.pos = checkpoint;
                return Ok(None);
            }
        },
    };
    let base = if negated {
        NodeMatcher::Not(Box::new(base))
    } else {
        base
    };
    Ok(Some(parse_operators(cursor, base)))
}

/// `seq ('|' seq)*`
fn parse_alternation(
    cursor: &mut Cursor<'_>,
    graph: &CallGraph,
    region: &RcuGuard<'_>,
) -> Result<Expr> {
    let mut branches = vec![parse_sequence(cursor, graph, region)?];
    loop {
        cursor.skip_spaces();
        if !cursor.eat('|') {
            break;
        }
        branches.push(parse_sequence(cursor, graph, region)?);
    }
    if branches.len() == 1 {
        Ok(branches.pop().expect("length checked"))
    } else {
        Ok(Expr::Alt(branches))
    }
}

/// One or more atoms in a row.
fn parse_sequence(
    cursor: &mut Cursor<'_>,
    graph: &CallGraph,
    region: &RcuGuard<'_>,
) -> Result<Expr> {
    let mut atoms = Vec::new();
    loop {
        cursor.skip_spaces();
        let Some(atom) = parse_path_atom(cursor, graph, region)? else {
            break;
        };
        atoms.push(atom);
    }
    if atoms.is_empty() {
        return cursor.fail();
    }
    if atoms.len() == 1 {
        Ok(atoms.pop().expect("length checked"))
    } else {
        Ok(Expr::Sequence(atoms))
    }
}

/// `'...'`, a parenthesized alternation, or a node selector; the latter
/// two take an optional postfix `*`.
fn parse_path_atom(
    cursor: &mut Cursor<'_>,
    graph: &CallGraph,
    region: &RcuGuard<'_>,
) -> Result<Option<Expr>> {
    if cursor.eat_str("...") {
        return Ok(Some(Expr::Star(Box::new(Expr::One(Box::new(|_: &str| {
            true
        }))))));
    }
    if cursor.eat('(') {
        let group = parse_alternation(cursor, graph, region)?;
        cursor.skip_spaces();
        if !cursor.eat(')') {
            return cursor.fail();
        }
        return Ok(Some(star_suffix(cursor, group)));
    }
    let Some(matcher) = parse_outside(cursor)? else {
        return Ok(None);
    };
    let atom = Expr::One(matcher.compile(graph, region));
    Ok(Some(star_suffix(cursor, atom)))
}

fn star_suffix(cursor: &mut Cursor<'_>, atom: Expr) -> Expr {
    if cursor.eat('*') {
        Expr::Star(Box::new(atom))
    } else {
        atom
    }
}
