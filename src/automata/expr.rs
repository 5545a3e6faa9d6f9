//! Regular expressions over call-path symbols.
//!
//! The AST mirrors the path query language: atoms are node matchers,
//! combined by juxtaposition, alternation and repetition. Compilation is
//! Thompson's construction, appending fragments onto an [`Nfa`] one atom
//! at a time.

use super::nfa::{Matcher, Nfa};

/// A regular expression over path symbols.
pub enum Expr {
    /// Matches the empty path.
    Empty,
    /// Matches one symbol accepted by the matcher.
    One(Matcher),
    /// Matches the concatenation of its parts. An empty sequence matches
    /// the empty path.
    Sequence(Vec<Expr>),
    /// Matches zero or more repetitions of its part.
    Star(Box<Expr>),
    /// Matches any one of its parts. An empty alternation matches the
    /// empty path.
    Alt(Vec<Expr>),
}

impl Expr {
    /// Compiles the expression into an NFA with a single final state.
    #[must_use]
    pub fn compile(self) -> Nfa {
        let mut nfa = Nfa::new();
        let initial = nfa.add_state();
        let last = self.tack(&mut nfa, initial);
        nfa.mark_final(last);
        nfa
    }

    /// Makes `initial` accept this expression; returns the accepting state.
    fn tack(self, nfa: &mut Nfa, initial: usize) -> usize {
        match self {
            Expr::Empty => {
                let last = nfa.add_state();
                nfa.add_epsilon(initial, last);
                last
            }
            Expr::One(matcher) => {
                let last = nfa.add_state();
                nfa.add_transition(initial, matcher, last);
                last
            }
            Expr::Sequence(atoms) => {
                if atoms.is_empty() {
                    return Expr::Empty.tack(nfa, initial);
                }
                let mut state = initial;
                for atom in atoms {
                    state = atom.tack(nfa, state);
                }
                state
            }
            Expr::Star(atom) => {
                let loop_state = nfa.add_state();
                let last = nfa.add_state();
                nfa.add_epsilon(initial, loop_state);
                nfa.add_epsilon(initial, last);
                let body_end = atom.tack(nfa, loop_state);
                nfa.add_epsilon(body_end, loop_state);
                nfa.add_epsilon(loop_state, last);
                last
            }
            Expr::Alt(atoms) => {
                if atoms.is_empty() {
                    return Expr::Empty.tack(nfa, initial);
                }
                let last = nfa.add_state();
                for atom in atoms {
                    let branch = nfa.add_state();
                    nfa.add_epsilon(initial, branch);
                    let body_end = atom.tack(nfa, branch);
                    nfa.add_epsilon(body_end, last);
                }
                last
            }
        }
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Empty => f.write_str("Empty"),
            Expr::One(_) => f.write_str("One(..)"),
            Expr::Sequence(atoms) => f.debug_tuple("Sequence").field(atoms).finish(),
            Expr::Star(atom) => f.debug_tuple("Star").field(atom).finish(),
            Expr::Alt(atoms) => f.debug_tuple("Alt").field(atoms).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::Automaton;

    fn literal(symbol: &str) -> Expr {
        let symbol = symbol.to_owned();
        Expr::One(Box::new(move |s: &str| s == symbol))
    }

    fn accepts(nfa: &Nfa, path: &[&str]) -> bool {
        let mut state = nfa.initial();
        for symbol in path {
            state = nfa.advance(&state, symbol);
            if nfa.is_failure(&state) {
                return false;
            }
        }
        nfa.is_final(&state)
    }

    #[test]
    fn test_empty_matches_empty_path() {
        let nfa = Expr::Empty.compile();
        assert!(accepts(&nfa, &[]));
        assert!(!accepts(&nfa, &["a"]));
    }

    #[test]
    fn test_sequence() {
        let nfa = Expr::Sequence(vec![literal("a"), literal("b")]).compile();
        assert!(accepts(&nfa, &["a", "b"]));
        assert!(!accepts(&nfa, &["a"]));
        assert!(!accepts(&nfa, &["b", "a"]));
    }

    #[test]
    fn test_star() {
        let nfa = Expr::Star(Box::new(literal("a"))).compile();
        assert!(accepts(&nfa, &[]));
        assert!(accepts(&nfa, &["a"]));
        assert!(accepts(&nfa, &["a", "a", "a"]));
        assert!(!accepts(&nfa, &["a", "b"]));
    }

    #[test]
    fn test_alternation() {
        let nfa = Expr::Alt(vec![literal("a"), literal("b")]).compile();
        assert!(accepts(&nfa, &["a"]));
        assert!(accepts(&nfa, &["b"]));
        assert!(!accepts(&nfa, &[]));
        assert!(!accepts(&nfa, &["c"]));
    }

    #[test]
    fn test_composite() {
        // a (b | c)* d
        let nfa = Expr::Sequence(vec![
            literal("a"),
            Expr::Star(Box::new(Expr::Alt(vec![literal("b"), literal("c")]))),
            literal("d"),
        ])
        .compile();
        assert!(accepts(&nfa, &["a", "d"]));
        assert!(accepts(&nfa, &["a", "b", "c", "b", "d"]));
        assert!(!accepts(&nfa, &["a", "b"]));
        assert!(!accepts(&nfa, &["b", "d"]));
    }
}
