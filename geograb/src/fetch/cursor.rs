//! Pagination state for one in-flight fetch.

use std::collections::HashSet;

/// One data query worth of object ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position in the batch sequence, 0-based
    pub index: usize,
    pub ids: Vec<i64>,
}

impl Batch {
    pub fn first_oid(&self) -> Option<i64> {
        self.ids.first().copied()
    }

    pub fn last_oid(&self) -> Option<i64> {
        self.ids.last().copied()
    }
}

/// The identifiers a fetch must retrieve, and those it already has.
///
/// `retrieved` is always a subset of `ids` and only grows. Ids returned by
/// the server that were never requested are ignored.
#[derive(Debug, Clone, Default)]
pub struct FetchCursor {
    ids: Vec<i64>,
    wanted: HashSet<i64>,
    retrieved: HashSet<i64>,
}

impl FetchCursor {
    /// Builds a cursor over `ids`, sorting and de-duplicating them.
    pub fn new(mut ids: Vec<i64>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        let wanted = ids.iter().copied().collect();
        Self {
            ids,
            wanted,
            retrieved: HashSet::new(),
        }
    }

    /// Splits the id set into consecutive batches of at most `batch_size`.
    pub fn batches(&self, batch_size: usize) -> Vec<Batch> {
        self.ids
            .chunks(batch_size.max(1))
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                ids: chunk.to_vec(),
            })
            .collect()
    }

    /// Records `id` as retrieved. Returns `false` for ids outside the set
    /// or already recorded.
    pub fn mark_retrieved(&mut self, id: i64) -> bool {
        self.wanted.contains(&id) && self.retrieved.insert(id)
    }

    pub fn is_retrieved(&self, id: i64) -> bool {
        self.retrieved.contains(&id)
    }

    pub fn total(&self) -> usize {
        self.ids.len()
    }

    pub fn retrieved_count(&self) -> usize {
        self.retrieved.len()
    }

    pub fn is_complete(&self) -> bool {
        self.retrieved.len() == self.ids.len()
    }

    /// Requested ids the server never returned, ascending.
    pub fn missing(&self) -> Vec<i64> {
        self.ids
            .iter()
            .copied()
            .filter(|id| !self.retrieved.contains(id))
            .collect()
    }
}

/// Offset paging state, for servers whose ids query is capped.
///
/// Pages are requested in object id order. Paging stops at the first page
/// shorter than requested, unless the server flagged it as truncated by its
/// own transfer limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCursor {
    page_size: usize,
    next_offset: usize,
    pages: usize,
    done: bool,
}

impl OffsetCursor {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            next_offset: 0,
            pages: 0,
            done: false,
        }
    }

    /// `(resultOffset, resultRecordCount)` of the next page, if any.
    pub fn next_page(&self) -> Option<(usize, usize)> {
        (!self.done).then_some((self.next_offset, self.page_size))
    }

    /// Advances past a page that returned `returned` features.
    pub fn advance(&mut self, returned: usize, exceeded_transfer_limit: bool) {
        self.pages += 1;
        self.next_offset += returned;
        if returned == 0 || (returned < self.page_size && !exceeded_transfer_limit) {
            self.done = true;
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
