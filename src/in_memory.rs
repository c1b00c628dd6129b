//! Memory-resident index used to drive collection outside of a search engine.
//!
//! An [`InMemoryIndex`] assigns global ordinals to the sorted distinct values of all its
//! segments, so every [`InMemorySegment`] shares the same ordinal space, and builds per-segment
//! postings for dynamic pruning.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::source::{DocIdIterator, LeafContext, OrdinalValues, TermDictionary};
use crate::{DocId, Ordinal, NO_MORE_DOCS};

/// Iterator over a sorted slice of document ids.
#[derive(Debug, Clone)]
pub struct VecDocIdIterator<'a> {
    docs: &'a [DocId],
    pos: Option<usize>,
}

impl<'a> VecDocIdIterator<'a> {
    pub fn new(docs: &'a [DocId]) -> Self {
        Self { docs, pos: None }
    }
}

impl DocIdIterator for VecDocIdIterator<'_> {
    #[inline]
    fn doc_id(&self) -> Option<DocId> {
        self.pos
            .map(|pos| self.docs.get(pos).copied().unwrap_or(NO_MORE_DOCS))
    }

    fn advance(&mut self, target: DocId) -> DocId {
        if let Some(doc) = self.doc_id() {
            if doc >= target {
                return doc;
            }
        }
        let start = self.pos.unwrap_or(0);
        let offset = self.docs[start..].partition_point(|&doc| doc < target);
        self.pos = Some(start + offset);
        self.doc_id().unwrap_or(NO_MORE_DOCS)
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

/// Iterator matching every document in `[0, max_doc)`.
#[derive(Debug, Clone)]
pub struct AllDocs {
    max_doc: DocId,
    doc: Option<DocId>,
}

impl AllDocs {
    pub fn new(max_doc: DocId) -> Self {
        Self { max_doc, doc: None }
    }
}

impl DocIdIterator for AllDocs {
    #[inline]
    fn doc_id(&self) -> Option<DocId> {
        self.doc
    }

    fn advance(&mut self, target: DocId) -> DocId {
        let doc = match self.doc {
            Some(doc) if doc >= target => doc,
            _ if target < self.max_doc => target,
            _ => NO_MORE_DOCS,
        };
        self.doc = Some(doc);
        doc
    }

    fn cost(&self) -> u64 {
        u64::from(self.max_doc)
    }
}

/// Index of a single field split into segments sharing one ordinal space.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    segments: Vec<InMemorySegment>,
}

impl InMemoryIndex {
    /// Build an index from `segments[segment][doc] = values of doc`.
    pub fn new<V: AsRef<[u8]>>(segments: &[Vec<Vec<V>>]) -> Self {
        let mut terms: Vec<Vec<u8>> = segments
            .iter()
            .flatten()
            .flatten()
            .map(|v| v.as_ref().to_vec())
            .collect();
        terms.sort_unstable();
        terms.dedup();
        let terms: Arc<[Vec<u8>]> = terms.into();

        let segments = segments
            .iter()
            .map(|docs| InMemorySegment::new(Arc::clone(&terms), docs))
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[InMemorySegment] {
        &self.segments
    }

    pub fn max_ord(&self) -> u64 {
        self.segments.first().map_or(0, |s| s.max_ord())
    }
}

/// One segment: per-document ordinals plus postings of the terms it contains.
#[derive(Debug, Clone)]
pub struct InMemorySegment {
    terms: Arc<[Vec<u8>]>,
    ords: Vec<Vec<Ordinal>>,
    docs_with_field: Vec<DocId>,
    /// Whether each global ordinal occurs in this segment
    present: Vec<bool>,
    postings: BTreeMap<Vec<u8>, Vec<DocId>>,
}

impl InMemorySegment {
    fn new<V: AsRef<[u8]>>(terms: Arc<[Vec<u8>]>, docs: &[Vec<V>]) -> Self {
        let mut ords = Vec::with_capacity(docs.len());
        let mut docs_with_field = Vec::new();
        let mut present = vec![false; terms.len()];
        let mut postings: BTreeMap<Vec<u8>, Vec<DocId>> = BTreeMap::new();
        for (doc, values) in docs.iter().enumerate() {
            let doc = doc as DocId;
            let mut doc_ords: Vec<Ordinal> = values
                .iter()
                .filter_map(|v| {
                    terms
                        .binary_search_by(|t| t.as_slice().cmp(v.as_ref()))
                        .ok()
                        .map(|ord| ord as Ordinal)
                })
                .collect();
            doc_ords.sort_unstable();
            doc_ords.dedup();
            if !doc_ords.is_empty() {
                docs_with_field.push(doc);
            }
            for &ord in &doc_ords {
                present[ord as usize] = true;
                postings.entry(terms[ord as usize].clone()).or_default().push(doc);
            }
            ords.push(doc_ords);
        }
        Self {
            terms,
            ords,
            docs_with_field,
            present,
            postings,
        }
    }

    /// Number of documents in the segment
    pub fn max_doc(&self) -> DocId {
        self.ords.len() as DocId
    }

    /// Iterator matching every document of the segment.
    pub fn all_docs(&self) -> AllDocs {
        AllDocs::new(self.max_doc())
    }

    /// Number of distinct terms with postings in this segment
    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    /// Leaf view of the segment. The field counts as indexed; segments without any value
    /// expose no term dictionary.
    pub fn leaf(&self) -> LeafContext<'_> {
        let terms = (!self.postings.is_empty()).then_some(self as &dyn TermDictionary);
        LeafContext::new(self, terms).with_field_indexed(true)
    }

    /// Leaf view without postings, as for a field that only has doc values.
    pub fn doc_values_leaf(&self) -> LeafContext<'_> {
        LeafContext::new(self, None).with_field_indexed(false)
    }
}

impl OrdinalValues for InMemorySegment {
    fn max_ord(&self) -> u64 {
        self.terms.len() as u64
    }

    fn ordinals(&self, doc: DocId) -> &[Ordinal] {
        self.ords.get(doc as usize).map_or(&[], Vec::as_slice)
    }

    fn lookup_ord(&self, ord: Ordinal) -> Option<&[u8]> {
        self.terms.get(ord as usize).map(Vec::as_slice)
    }

    fn contains_ord(&self, ord: Ordinal) -> Option<bool> {
        Some(self.present.get(ord as usize).copied().unwrap_or(false))
    }

    fn docs_with_field(&self) -> Box<dyn DocIdIterator + '_> {
        Box::new(VecDocIdIterator::new(&self.docs_with_field))
    }
}

impl TermDictionary for InMemorySegment {
    fn postings(&self, term: &[u8]) -> Option<Box<dyn DocIdIterator + '_>> {
        self.postings
            .get(term)
            .map(|docs| Box::new(VecDocIdIterator::new(docs)) as Box<dyn DocIdIterator + '_>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_iterator_advance() {
        let docs = [1, 4, 9, 12];
        let mut it = VecDocIdIterator::new(&docs);
        assert_eq!(it.doc_id(), None);
        assert_eq!(it.next_doc(), 1);
        assert_eq!(it.advance(5), 9);
        // already past target
        assert_eq!(it.advance(3), 9);
        assert_eq!(it.next_doc(), 12);
        assert_eq!(it.next_doc(), NO_MORE_DOCS);
        assert_eq!(it.next_doc(), NO_MORE_DOCS);
    }

    #[test]
    fn test_all_docs() {
        let mut it = AllDocs::new(3);
        assert_eq!(it.next_doc(), 0);
        assert_eq!(it.advance(2), 2);
        assert_eq!(it.next_doc(), NO_MORE_DOCS);
        assert_eq!(AllDocs::new(0).next_doc(), NO_MORE_DOCS);
    }

    #[test]
    fn test_global_ordinals() {
        let index = InMemoryIndex::new(&[
            vec![vec!["b"], vec![], vec!["a", "b", "b"]],
            vec![vec!["c"]],
        ]);
        assert_eq!(index.max_ord(), 3);

        let first = &index.segments()[0];
        assert_eq!(first.ordinals(0), &[1]);
        assert!(first.ordinals(1).is_empty());
        assert_eq!(first.ordinals(2), &[0, 1]);
        assert!(first.ordinals(99).is_empty());
        assert_eq!(first.num_terms(), 2);
        assert!(first.postings(b"c").is_none());
        assert_eq!(first.contains_ord(1), Some(true));
        assert_eq!(first.contains_ord(2), Some(false));
        assert_eq!(first.contains_ord(99), Some(false));

        let second = &index.segments()[1];
        assert_eq!(second.ordinals(0), &[2]);
        assert_eq!(second.lookup_ord(2), Some(&b"c"[..]));
        assert_eq!(second.lookup_ord(3), None);

        let mut postings = first.postings(b"b").unwrap();
        assert_eq!(postings.next_doc(), 0);
        assert_eq!(postings.next_doc(), 2);
        assert_eq!(postings.next_doc(), NO_MORE_DOCS);

        let mut with_field = first.docs_with_field();
        assert_eq!(with_field.next_doc(), 0);
        assert_eq!(with_field.next_doc(), 2);
    }
}
