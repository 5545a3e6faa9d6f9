//! Deterministic finite automata over explicit symbols.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use super::Automaton;

/// A deterministic finite automaton.
///
/// State 0 is the initial state. Transitions are keyed by literal symbol;
/// a symbol with no outgoing transition fails the visit. Built either
/// directly or from an [`Nfa`](super::Nfa) via
/// [`to_dfa`](super::Nfa::to_dfa).
#[derive(Debug, Clone, Default)]
pub struct Dfa {
    transition: Vec<FxHashMap<String, usize>>,
    finals: FxHashSet<usize>,
}

impl Dfa {
    /// Creates an automaton with no states.
    #[must_use]
    pub fn new() -> Self {
        Dfa::default()
    }

    /// Adds a state and returns its identifier.
    pub fn add_state(&mut self) -> usize {
        self.transition.push(FxHashMap::default());
        self.transition.len() - 1
    }

    /// Number of states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.transition.len()
    }

    /// Marks `state` as final.
    ///
    /// # Panics
    ///
    /// Panics if `state` does not exist.
    pub fn mark_final(&mut self, state: usize) {
        assert!(state < self.transition.len());
        self.finals.insert(state);
    }

    /// Adds the transition for `symbol` from `source` to `dest`, replacing
    /// any previous transition for the pair.
    pub fn add_transition(&mut self, source: usize, symbol: &str, dest: usize) {
        self.transition[source].insert(symbol.to_owned(), dest);
    }

    /// Returns the automaton matching the reflections of the strings this
    /// one matches.
    #[must_use]
    pub fn reverse(&self) -> Dfa {
        // Reverse every edge; the final states collectively become the
        // initial state and state 0 becomes the final state. Determinize
        // the result with a subset construction over the symbols that
        // actually occur.
        let mut reversed: Vec<FxHashMap<&str, Vec<usize>>> =
            vec![FxHashMap::default(); self.transition.len()];
        for (source, direct) in self.transition.iter().enumerate() {
            for (symbol, &target) in direct {
                reversed[target]
                    .entry(symbol.as_str())
                    .or_default()
                    .push(source);
            }
        }

        let mut result = Dfa::new();
        let initial: Vec<usize> = {
            let set: BTreeSet<usize> = self.finals.iter().copied().collect();
            set.into_iter().collect()
        };

        let mut statemap: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        statemap.insert(initial.clone(), result.add_state());

        let mut queue = vec![initial];
        while let Some(sources) = queue.pop() {
            let result_source = statemap[&sources];
            if sources.contains(&0) {
                result.mark_final(result_source);
            }

            let symbols: BTreeSet<&str> = sources
                .iter()
                .flat_map(|&source| reversed[source].keys().copied())
                .collect();

            for symbol in symbols {
                let dest: Vec<usize> = {
                    let set: BTreeSet<usize> = sources
                        .iter()
                        .filter_map(|&source| reversed[source].get(symbol))
                        .flatten()
                        .copied()
                        .collect();
                    set.into_iter().collect()
                };

                let result_dest = match statemap.get(&dest) {
                    Some(&known) => known,
                    None => {
                        let fresh = result.add_state();
                        statemap.insert(dest.clone(), fresh);
                        queue.push(dest);
                        fresh
                    }
                };
                result.add_transition(result_source, symbol, result_dest);
            }
        }

        result
    }

    /// Returns an equivalent automaton with a minimal number of states.
    #[must_use]
    pub fn minimal(&self) -> Dfa {
        self.reverse().reverse()
    }
}

impl Automaton for Dfa {
    type State = Option<usize>;

    fn initial(&self) -> Option<usize> {
        if self.transition.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn advance(&self, state: &Option<usize>, symbol: &str) -> Option<usize> {
        let source = (*state)?;
        self.transition[source].get(symbol).copied()
    }

    fn is_failure(&self, state: &Option<usize>) -> bool {
        state.is_none()
    }

    fn is_final(&self, state: &Option<usize>) -> bool {
        match state {
            Some(state) => self.finals.contains(state),
            None => false,
        }
    }
}
