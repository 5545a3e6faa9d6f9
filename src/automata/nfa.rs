//! Nondeterministic finite automata with predicate-labelled transitions.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::dfa::Dfa;
use super::Automaton;

/// A transition predicate over path symbols.
///
/// Transitions carry arbitrary predicates rather than literal symbols, so
/// one edge can match "any name", "names matching this pattern", or "names
/// carrying this label" without enumerating an alphabet.
pub type Matcher = Box<dyn Fn(&str) -> bool>;

/// A nondeterministic finite automaton.
///
/// States are dense integers. Construction is incremental:
/// [`add_state`](Nfa::add_state), then transitions and epsilon edges, then
/// [`mark_final`](Nfa::mark_final). Visits run either directly (state sets)
/// or through [`lazy_dfa`](Nfa::lazy_dfa), which memoizes the subset
/// construction per symbol actually seen.
#[derive(Default)]
pub struct Nfa {
    transition: Vec<Vec<(Matcher, usize)>>,
    epsilon: Vec<Vec<usize>>,
    finals: FxHashSet<usize>,
    /// Epsilon closures, computed on first use and invalidated when a new
    /// epsilon edge appears.
    closures: RefCell<FxHashMap<usize, Rc<Vec<usize>>>>,
}

impl Nfa {
    /// Creates an automaton with no states.
    #[must_use]
    pub fn new() -> Self {
        Nfa::default()
    }

    /// Adds a state and returns its identifier.
    pub fn add_state(&mut self) -> usize {
        self.transition.push(Vec::new());
        self.epsilon.push(Vec::new());
        self.transition.len() - 1
    }

    /// Number of states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.transition.len()
    }

    /// Marks `state` as final: a visit that terminates on it has matched.
    ///
    /// # Panics
    ///
    /// Panics if `state` does not exist.
    pub fn mark_final(&mut self, state: usize) {
        assert!(state < self.transition.len());
        self.finals.insert(state);
    }

    /// Adds a transition from `source` to `dest` taken for any symbol the
    /// matcher accepts.
    pub fn add_transition(&mut self, source: usize, matcher: Matcher, dest: usize) {
        self.transition[source].push((matcher, dest));
    }

    /// Adds an epsilon edge: reaching `source` nondeterministically also
    /// reaches `dest`.
    pub fn add_epsilon(&mut self, source: usize, dest: usize) {
        self.epsilon[source].push(dest);
        self.closures.borrow_mut().clear();
    }

    /// The set of states reachable from `state` through epsilon edges,
    /// including `state` itself. Sorted.
    pub fn epsilon_closure(&self, state: usize) -> Rc<Vec<usize>> {
        if let Some(closure) = self.closures.borrow().get(&state) {
            return Rc::clone(closure);
        }

        let mut states: BTreeSet<usize> = BTreeSet::new();
        let mut frontier = vec![state];
        while let Some(next) = frontier.pop() {
            if states.insert(next) {
                frontier.extend_from_slice(&self.epsilon[next]);
            }
        }

        let closure = Rc::new(states.into_iter().collect::<Vec<usize>>());
        self.closures
            .borrow_mut()
            .insert(state, Rc::clone(&closure));
        closure
    }

    fn set_is_final(&self, states: &[usize]) -> bool {
        states.iter().any(|state| self.finals.contains(state))
    }

    fn advance_set(&self, source: &[usize], symbol: &str) -> Vec<usize> {
        let mut dest: BTreeSet<usize> = BTreeSet::new();
        for &state in source {
            for (matcher, target) in &self.transition[state] {
                if matcher(symbol) {
                    dest.extend(self.epsilon_closure(*target).iter().copied());
                }
            }
        }
        dest.into_iter().collect()
    }

    /// Converts to a deterministic automaton over the given alphabet.
    ///
    /// Symbols outside the alphabet fail the resulting automaton, so the
    /// alphabet must cover every name the visit can encounter.
    #[must_use]
    pub fn to_dfa(&self, alphabet: &[String]) -> Dfa {
        let mut dfa = Dfa::new();
        let initial: Vec<usize> = self.epsilon_closure(0).as_ref().clone();

        let mut statemap: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        statemap.insert(initial.clone(), dfa.add_state());

        // States whose outgoing transitions have not been filled yet.
        let mut queue = vec![initial];
        while let Some(sources) = queue.pop() {
            let dfa_source = statemap[&sources];
            if self.set_is_final(&sources) {
                dfa.mark_final(dfa_source);
            }

            let mut transition: FxHashMap<&str, BTreeSet<usize>> = FxHashMap::default();
            for &source in &sources {
                for (matcher, dest) in &self.transition[source] {
                    for symbol in alphabet {
                        if matcher(symbol) {
                            transition
                                .entry(symbol.as_str())
                                .or_default()
                                .extend(self.epsilon_closure(*dest).iter().copied());
                        }
                    }
                }
            }

            for (symbol, dest) in transition {
                let dest: Vec<usize> = dest.into_iter().collect();
                let dfa_dest = match statemap.get(&dest) {
                    Some(&known) => known,
                    None => {
                        let fresh = dfa.add_state();
                        statemap.insert(dest.clone(), fresh);
                        queue.push(dest);
                        fresh
                    }
                };
                dfa.add_transition(dfa_source, symbol, dfa_dest);
            }
        }

        dfa
    }

    /// Returns a visitor that determinizes this automaton on the fly.
    #[must_use]
    pub fn lazy_dfa(&self) -> LazyDfa<'_> {
        LazyDfa {
            nfa: self,
            inner: RefCell::new(LazyInner::default()),
        }
    }
}

impl Automaton for Nfa {
    type State = Vec<usize>;

    fn initial(&self) -> Vec<usize> {
        if self.transition.is_empty() {
            return Vec::new();
        }
        self.epsilon_closure(0).as_ref().clone()
    }

    fn advance(&self, state: &Vec<usize>, symbol: &str) -> Vec<usize> {
        self.advance_set(state, symbol)
    }

    fn is_failure(&self, state: &Vec<usize>) -> bool {
        state.is_empty()
    }

    fn is_final(&self, state: &Vec<usize>) -> bool {
        self.set_is_final(state)
    }
}

/// A deterministic visitor over an [`Nfa`] that builds its state table on
/// demand.
///
/// Each distinct set of NFA states seen becomes one lazy-DFA state, and
/// each (state, symbol) pair is resolved through the NFA exactly once.
/// Worthwhile when the alphabet is large or unknown up front.
pub struct LazyDfa<'n> {
    nfa: &'n Nfa,
    inner: RefCell<LazyInner>,
}

#[derive(Default)]
struct LazyInner {
    nfa_states: Vec<Vec<usize>>,
    transition: Vec<FxHashMap<String, Option<usize>>>,
    statemap: FxHashMap<Vec<usize>, usize>,
    finals: FxHashSet<usize>,
}

impl LazyDfa<'_> {
    fn dfa_state(&self, states: Vec<usize>) -> Option<usize> {
        if states.is_empty() {
            return None;
        }
        let mut inner = self.inner.borrow_mut();
        if let Some(&known) = inner.statemap.get(&states) {
            return Some(known);
        }
        let fresh = inner.nfa_states.len();
        inner.statemap.insert(states.clone(), fresh);
        if self.nfa.set_is_final(&states) {
            inner.finals.insert(fresh);
        }
        inner.nfa_states.push(states);
        inner.transition.push(FxHashMap::default());
        Some(fresh)
    }
}

impl Automaton for LazyDfa<'_> {
    type State = Option<usize>;

    fn initial(&self) -> Option<usize> {
        if self.nfa.transition.is_empty() {
            return None;
        }
        self.dfa_state(self.nfa.epsilon_closure(0).as_ref().clone())
    }

    fn advance(&self, state: &Option<usize>, symbol: &str) -> Option<usize> {
        let source = (*state)?;
        if let Some(&cached) = self.inner.borrow().transition[source].get(symbol) {
            return cached;
        }
        let nfa_states = self.inner.borrow().nfa_states[source].clone();
        let dest = self.dfa_state(self.nfa.advance_set(&nfa_states, symbol));
        self.inner.borrow_mut().transition[source].insert(symbol.to_owned(), dest);
        dest
    }

    fn is_failure(&self, state: &Option<usize>) -> bool {
        state.is_none()
    }

    fn is_final(&self, state: &Option<usize>) -> bool {
        match state {
            Some(state) => self.inner.borrow().finals.contains(state),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(symbol: &str) -> Matcher {
        let symbol = symbol.to_owned();
        Box::new(move |s: &str| s == symbol)
    }

    /// a b* c
    fn sample_nfa() -> Nfa {
        let mut nfa = Nfa::new();
        let s0 = nfa.add_state();
        let s1 = nfa.add_state();
        let s2 = nfa.add_state();
        nfa.add_transition(s0, literal("a"), s1);
        nfa.add_transition(s1, literal("b"), s1);
        nfa.add_transition(s1, literal("c"), s2);
        nfa.mark_final(s2);
        nfa
    }

    fn accepts<A: Automaton>(automaton: &A, path: &[&str]) -> bool {
        let mut state = automaton.initial();
        for symbol in path {
            state = automaton.advance(&state, symbol);
            if automaton.is_failure(&state) {
                return false;
            }
        }
        automaton.is_final(&state)
    }

    #[test]
    fn test_nfa_visit() {
        let nfa = sample_nfa();
        assert!(accepts(&nfa, &["a", "c"]));
        assert!(accepts(&nfa, &["a", "b", "b", "c"]));
        assert!(!accepts(&nfa, &["a", "b"]));
        assert!(!accepts(&nfa, &["b", "c"]));
        assert!(!accepts(&nfa, &[]));
    }

    #[test]
    fn test_epsilon_closure() {
        let mut nfa = Nfa::new();
        let s0 = nfa.add_state();
        let s1 = nfa.add_state();
        let s2 = nfa.add_state();
        nfa.add_epsilon(s0, s1);
        nfa.add_epsilon(s1, s2);
        assert_eq!(*nfa.epsilon_closure(s0), vec![s0, s1, s2]);
        assert_eq!(*nfa.epsilon_closure(s1), vec![s1, s2]);
        assert_eq!(*nfa.epsilon_closure(s2), vec![s2]);
    }

    #[test]
    fn test_lazy_dfa_agrees_with_nfa() {
        let nfa = sample_nfa();
        let lazy = nfa.lazy_dfa();
        for path in [
            &["a", "c"][..],
            &["a", "b", "c"],
            &["a", "b"],
            &["c"],
            &["a", "x", "c"],
        ] {
            assert_eq!(accepts(&nfa, path), accepts(&lazy, path), "path {path:?}");
        }
    }

    #[test]
    fn test_lazy_dfa_memoizes_states() {
        let nfa = sample_nfa();
        let lazy = nfa.lazy_dfa();
        assert!(accepts(&lazy, &["a", "b", "b", "b", "c"]));
        // One lazy state per distinct NFA state set: {0}, {1}, {2}.
        assert_eq!(lazy.inner.borrow().nfa_states.len(), 3);
    }

    #[test]
    fn test_to_dfa_over_alphabet() {
        let nfa = sample_nfa();
        let alphabet: Vec<String> = ["a", "b", "c"].iter().map(|s| (*s).to_owned()).collect();
        let dfa = nfa.to_dfa(&alphabet);
        assert!(accepts(&dfa, &["a", "c"]));
        assert!(accepts(&dfa, &["a", "b", "b", "c"]));
        assert!(!accepts(&dfa, &["a"]));
        assert!(!accepts(&dfa, &["c", "a"]));
    }

    #[test]
    fn test_empty_automaton_fails_immediately() {
        let nfa = Nfa::new();
        let state = nfa.initial();
        assert!(nfa.is_failure(&state));
    }
}
