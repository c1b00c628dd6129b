//! Interfaces of the index structures collection reads from.
//!
//! Implementations are expected to be memory resident: none of these calls block, and none of
//! them fail on documents that lack the field.

use crate::{DocId, Ordinal, NO_MORE_DOCS};

/// Forward-only iterator over increasing document ids.
///
/// `doc_id` is `None` until the iterator has been positioned and [`NO_MORE_DOCS`] once it is
/// exhausted.
pub trait DocIdIterator {
    fn doc_id(&self) -> Option<DocId>;

    /// Move to the first document `>= target`. Iterators already at or past `target` stay
    /// where they are.
    fn advance(&mut self, target: DocId) -> DocId;

    fn next_doc(&mut self) -> DocId {
        match self.doc_id() {
            None => self.advance(0),
            Some(NO_MORE_DOCS) => NO_MORE_DOCS,
            Some(doc) => self.advance(doc + 1),
        }
    }

    /// Upper bound on the number of documents this iterator yields.
    fn cost(&self) -> u64;
}

/// Per-document ordinals of one field, in a leaf whose ordinal space is shared with every other
/// leaf of the same aggregation.
pub trait OrdinalValues {
    /// Number of distinct values of the field, ordinals are in `[0, max_ord)`.
    fn max_ord(&self) -> u64;

    /// Ordinals of `doc`, empty when the document has no value for the field.
    fn ordinals(&self, doc: DocId) -> &[Ordinal];

    /// Raw value bytes of `ord`, `None` if the value source has no entry for it.
    fn lookup_ord(&self, ord: Ordinal) -> Option<&[u8]>;

    /// Whether any document of this leaf carries `ord`, `None` when the source can not tell.
    ///
    /// Pruning only skips a value without postings when this confirms it is absent, otherwise
    /// documents are scanned for it.
    fn contains_ord(&self, _ord: Ordinal) -> Option<bool> {
        None
    }

    /// Iterator over documents having at least one value.
    fn docs_with_field(&self) -> Box<dyn DocIdIterator + '_>;
}

/// Inverted index of one field in one leaf.
pub trait TermDictionary {
    /// Postings of `term`, `None` if the term does not occur in this leaf.
    fn postings(&self, term: &[u8]) -> Option<Box<dyn DocIdIterator + '_>>;
}

/// What a leaf exposes for the aggregated field.
#[derive(Clone, Copy)]
pub struct LeafContext<'a> {
    pub values: &'a dyn OrdinalValues,
    /// Term dictionary of the field, `None` when the leaf has no terms for it.
    pub terms: Option<&'a dyn TermDictionary>,
    /// Whether the field is indexed at all; an indexed field without terms has no values here.
    pub field_indexed: bool,
}

impl<'a> LeafContext<'a> {
    pub fn new(values: &'a dyn OrdinalValues, terms: Option<&'a dyn TermDictionary>) -> Self {
        Self {
            values,
            field_indexed: terms.is_some(),
            terms,
        }
    }

    pub fn with_field_indexed(mut self, field_indexed: bool) -> Self {
        self.field_indexed = field_indexed;
        self
    }
}
