//! Competitive iterator used by dynamic pruning.
//!
//! While scanning, the iterator simply follows the documents that have a value for the field.
//! Once few enough ordinals remain unvisited it switches to pruning: it opens the postings of
//! every unvisited value and only yields documents containing at least one of them, so the
//! rest of the leaf can be skipped as soon as every value has been seen.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::aggregator::DebugCounters;
use crate::bit_array::BitArray;
use crate::source::{DocIdIterator, OrdinalValues, TermDictionary};
use crate::{DocId, Ordinal, NO_MORE_DOCS};

/// What an enumerator stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Source {
    Ordinal(Ordinal),
    /// Docs-with-field iterator covering ordinals that have no postings to follow
    Fallback,
}

/// State of the pruning phase
struct Pruning<'a> {
    enumerators: HashMap<Source, Box<dyn DocIdIterator + 'a>>,
    /// Unvisited ordinals without postings, covered by the fallback enumerator
    unresolved: HashSet<Ordinal>,
    /// Current doc of every enumerator, lowest on top
    queue: BinaryHeap<Reverse<(Option<DocId>, Source)>>,
}

impl<'a> Pruning<'a> {
    fn new(
        enumerators: HashMap<Source, Box<dyn DocIdIterator + 'a>>,
        unresolved: HashSet<Ordinal>,
    ) -> Self {
        let mut pruning = Self {
            enumerators,
            unresolved,
            queue: BinaryHeap::new(),
        };
        pruning.rebuild();
        pruning
    }

    /// Drop whatever enumerator waits for `ord`
    fn on_visited_ordinal(&mut self, ord: Ordinal) {
        if self.enumerators.remove(&Source::Ordinal(ord)).is_some() {
            self.rebuild();
        } else if self.unresolved.remove(&ord) && self.unresolved.is_empty() {
            trace!(ord, "all unresolved ordinals visited, dropping fallback");
            self.enumerators.remove(&Source::Fallback);
            self.rebuild();
        }
    }

    /// Rebuild the queue from the remaining enumerators
    fn rebuild(&mut self) {
        self.queue = self
            .enumerators
            .iter()
            .map(|(&source, postings)| Reverse((postings.doc_id(), source)))
            .collect();
    }

    fn advance(&mut self, target: DocId) -> DocId {
        loop {
            let Some(&Reverse((doc, source))) = self.queue.peek() else {
                return NO_MORE_DOCS;
            };
            if let Some(doc) = doc.filter(|&doc| doc >= target) {
                return doc;
            }
            self.queue.pop();
            if let Some(postings) = self.enumerators.get_mut(&source) {
                let doc = postings.advance(target);
                self.queue.push(Reverse((Some(doc), source)));
            }
        }
    }
}

/// Document iterator that only yields documents which may still contribute new ordinals.
pub struct CompetitiveIterator<'a> {
    values: &'a dyn OrdinalValues,
    terms: &'a dyn TermDictionary,
    docs_with_field: Box<dyn DocIdIterator + 'a>,
    num_non_visited: u64,
    max_terms_for_pruning: u64,
    pruning: Option<Pruning<'a>>,
    doc: Option<DocId>,
}

impl<'a> CompetitiveIterator<'a> {
    pub fn new(
        values: &'a dyn OrdinalValues,
        terms: &'a dyn TermDictionary,
        num_non_visited: u64,
        max_terms_for_pruning: u64,
    ) -> Self {
        Self {
            values,
            terms,
            docs_with_field: values.docs_with_field(),
            num_non_visited,
            max_terms_for_pruning,
            pruning: None,
            doc: None,
        }
    }

    /// Whether the iterator is following postings of unvisited values
    #[inline]
    pub fn is_pruning(&self) -> bool {
        self.pruning.is_some()
    }

    /// Number of enumerators left in the pruning queue
    pub fn queue_len(&self) -> usize {
        self.pruning.as_ref().map_or(0, |p| p.enumerators.len())
    }

    /// Open postings of every ordinal not yet set in `visited`.
    pub fn start_pruning(&mut self, visited: &BitArray, counters: &mut DebugCounters) {
        counters.dynamic_pruning_used += 1;

        let mut enumerators: HashMap<Source, Box<dyn DocIdIterator + 'a>> = HashMap::new();
        let mut unresolved = HashSet::new();
        let mut excluded = 0u64;
        let max_ord = self.values.max_ord().min(visited.len());
        for ord in (0..max_ord).filter(|&ord| !visited.get(ord)) {
            let Some(term) = self.values.lookup_ord(ord) else {
                unresolved.insert(ord);
                continue;
            };
            match self.terms.postings(term) {
                Some(postings) => {
                    enumerators.insert(Source::Ordinal(ord), postings);
                }
                None if self.values.contains_ord(ord) == Some(false) => excluded += 1,
                // documents may still carry it, scan for them
                None => {
                    unresolved.insert(ord);
                }
            }
        }
        let pending = enumerators.len();
        if !unresolved.is_empty() {
            enumerators.insert(Source::Fallback, self.values.docs_with_field());
        }
        debug!(
            pending,
            excluded,
            unresolved = unresolved.len(),
            "starting dynamic pruning"
        );

        self.pruning = Some(Pruning::new(enumerators, unresolved));
    }

    /// Called once for every ordinal the first time it is visited.
    pub fn on_visited_ordinal(
        &mut self,
        ord: Ordinal,
        visited: &BitArray,
        counters: &mut DebugCounters,
    ) {
        self.num_non_visited = self.num_non_visited.saturating_sub(1);
        match &mut self.pruning {
            Some(pruning) => pruning.on_visited_ordinal(ord),
            None if self.num_non_visited <= self.max_terms_for_pruning => {
                self.start_pruning(visited, counters)
            }
            None => {}
        }
    }
}

impl DocIdIterator for CompetitiveIterator<'_> {
    #[inline]
    fn doc_id(&self) -> Option<DocId> {
        self.doc
    }

    fn advance(&mut self, target: DocId) -> DocId {
        let doc = match &mut self.pruning {
            None => self.docs_with_field.advance(target),
            Some(pruning) => pruning.advance(target),
        };
        self.doc = Some(doc);
        doc
    }

    fn cost(&self) -> u64 {
        self.docs_with_field.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryIndex;

    fn visited_with(max_ord: u64, ords: &[Ordinal]) -> BitArray {
        let mut bits = BitArray::new(max_ord).unwrap();
        ords.iter().for_each(|&ord| bits.set(ord));
        bits
    }

    #[test]
    fn test_scanning_follows_docs_with_field() {
        let index = InMemoryIndex::new(&[vec![vec!["a"], vec![], vec!["b"], vec!["a"]]]);
        let segment = &index.segments()[0];
        let mut it = CompetitiveIterator::new(segment, segment, 2, 0);
        assert!(!it.is_pruning());
        assert_eq!(it.advance(0), 0);
        assert_eq!(it.advance(1), 2);
        assert_eq!(it.advance(3), 3);
        assert_eq!(it.advance(4), NO_MORE_DOCS);
    }

    #[test]
    fn test_pruning_skips_to_unvisited_values() {
        // ordinals: a=0, b=1, c=2
        let index = InMemoryIndex::new(&[vec![
            vec!["a"],
            vec!["a"],
            vec!["b"],
            vec!["a"],
            vec!["c"],
            vec!["b", "c"],
        ]]);
        let segment = &index.segments()[0];
        let mut counters = DebugCounters::default();
        let mut visited = visited_with(3, &[0]);
        let mut it = CompetitiveIterator::new(segment, segment, 2, 128);
        it.start_pruning(&visited, &mut counters);
        assert!(it.is_pruning());
        assert_eq!(counters.dynamic_pruning_used, 1);
        assert_eq!(it.queue_len(), 2);

        assert_eq!(it.advance(0), 2);
        visited.set(1);
        it.on_visited_ordinal(1, &visited, &mut counters);
        assert_eq!(it.queue_len(), 1);

        assert_eq!(it.advance(3), 4);
        visited.set(2);
        it.on_visited_ordinal(2, &visited, &mut counters);
        assert_eq!(it.queue_len(), 0);
        assert_eq!(it.advance(5), NO_MORE_DOCS);
        assert_eq!(it.doc_id(), Some(NO_MORE_DOCS));
    }

    #[test]
    fn test_pruning_starts_once_few_ordinals_remain() {
        let index = InMemoryIndex::new(&[vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"]]]);
        let segment = &index.segments()[0];
        let mut counters = DebugCounters::default();
        let mut visited = visited_with(4, &[]);
        let mut it = CompetitiveIterator::new(segment, segment, 4, 2);

        for ord in 0..2 {
            assert!(!it.is_pruning());
            assert_eq!(it.advance(ord as DocId), ord as DocId);
            visited.set(ord);
            it.on_visited_ordinal(ord, &visited, &mut counters);
        }
        assert!(it.is_pruning());
        assert_eq!(it.queue_len(), 2);
        assert_eq!(it.advance(2), 2);
    }

    #[test]
    fn test_values_missing_from_leaf_are_excluded() {
        // "z" only lives in the second segment
        let index = InMemoryIndex::new(&[vec![vec!["a"], vec!["b"]], vec![vec!["z"]]]);
        let segment = &index.segments()[0];
        let mut counters = DebugCounters::default();
        let mut it = CompetitiveIterator::new(segment, segment, 3, 128);
        it.start_pruning(&visited_with(3, &[]), &mut counters);
        assert_eq!(it.queue_len(), 2);
    }

    /// Value source that lost the value of one ordinal
    struct MissingValue<'a> {
        inner: &'a dyn OrdinalValues,
        missing: Ordinal,
    }

    impl OrdinalValues for MissingValue<'_> {
        fn max_ord(&self) -> u64 {
            self.inner.max_ord()
        }

        fn ordinals(&self, doc: DocId) -> &[Ordinal] {
            self.inner.ordinals(doc)
        }

        fn lookup_ord(&self, ord: Ordinal) -> Option<&[u8]> {
            (ord != self.missing)
                .then(|| self.inner.lookup_ord(ord))
                .flatten()
        }

        fn contains_ord(&self, ord: Ordinal) -> Option<bool> {
            self.inner.contains_ord(ord)
        }

        fn docs_with_field(&self) -> Box<dyn DocIdIterator + '_> {
            self.inner.docs_with_field()
        }
    }

    #[test]
    fn test_unresolved_values_fall_back_to_scanning() {
        // ordinals: a=0, b=1, c=2; the value of "b" can not be looked up
        let index = InMemoryIndex::new(&[vec![
            vec!["a"],
            vec!["a"],
            vec!["b"],
            vec!["a"],
            vec!["c"],
        ]]);
        let segment = &index.segments()[0];
        let values = MissingValue {
            inner: segment,
            missing: 1,
        };
        let mut counters = DebugCounters::default();
        let mut visited = visited_with(3, &[]);
        let mut it = CompetitiveIterator::new(&values, segment, 3, 128);
        it.start_pruning(&visited, &mut counters);
        // a, c and the fallback
        assert_eq!(it.queue_len(), 3);

        assert_eq!(it.advance(0), 0);
        visited.set(0);
        it.on_visited_ordinal(0, &visited, &mut counters);
        // the fallback keeps every document with a value reachable
        assert_eq!(it.advance(1), 1);
        assert_eq!(it.advance(2), 2);
        visited.set(1);
        it.on_visited_ordinal(1, &visited, &mut counters);
        assert_eq!(it.queue_len(), 1);
        // only "c" is left
        assert_eq!(it.advance(3), 4);
    }

    /// Term dictionary that lost the postings of one term
    struct LosingTerm<'a> {
        inner: &'a dyn TermDictionary,
        lost: &'static [u8],
    }

    impl TermDictionary for LosingTerm<'_> {
        fn postings(&self, term: &[u8]) -> Option<Box<dyn DocIdIterator + '_>> {
            if term == self.lost {
                return None;
            }
            self.inner.postings(term)
        }
    }

    #[test]
    fn test_values_without_postings_fall_back_to_scanning() {
        // ordinals: a=0, b=1, c=2; "b" occurs but its postings are gone
        let index = InMemoryIndex::new(&[vec![vec!["a"], vec!["c"], vec!["b"], vec!["a"]]]);
        let segment = &index.segments()[0];
        let terms = LosingTerm {
            inner: segment,
            lost: b"b",
        };
        let mut counters = DebugCounters::default();
        let mut visited = visited_with(3, &[0, 2]);
        let mut it = CompetitiveIterator::new(segment, &terms, 1, 128);
        it.start_pruning(&visited, &mut counters);
        // only the fallback
        assert_eq!(it.queue_len(), 1);
        assert_eq!(it.advance(0), 0);
        assert_eq!(it.advance(2), 2);
        visited.set(1);
        it.on_visited_ordinal(1, &visited, &mut counters);
        assert_eq!(it.queue_len(), 0);
        assert_eq!(it.advance(3), NO_MORE_DOCS);
    }

    #[test]
    fn test_pruning_ignores_ordinals_past_visited_bits() {
        let index = InMemoryIndex::new(&[vec![vec!["a"], vec!["b"], vec!["c"]]]);
        let segment = &index.segments()[0];
        let mut counters = DebugCounters::default();
        let mut it = CompetitiveIterator::new(segment, segment, 1, 128);
        // bits only cover "a"
        it.start_pruning(&visited_with(1, &[]), &mut counters);
        assert_eq!(it.queue_len(), 1);
        assert_eq!(it.advance(0), 0);
        assert_eq!(it.advance(1), NO_MORE_DOCS);
    }
}
