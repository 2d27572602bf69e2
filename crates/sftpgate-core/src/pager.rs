// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Entry-at-a-time paging of a directory listing

use sftpgate_proto::NameEntry;
use std::collections::VecDeque;

/// Buffered listing for one open directory handle.
///
/// An unprimed pager asks the policy for a listing; a primed one hands out
/// buffered entries until it runs dry, at which point it reports end of
/// listing and drops back to unprimed.
#[derive(Debug, Default)]
pub struct DirectoryPager {
    pending: Option<VecDeque<NameEntry>>,
}

impl DirectoryPager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_primed(&self) -> bool {
        self.pending.is_some()
    }

    /// Buffer a fresh listing and return its first entry.
    ///
    /// An empty listing leaves the pager unprimed and returns `None`, which
    /// the caller reports as end of listing.
    pub fn prime(&mut self, entries: Vec<NameEntry>) -> Option<NameEntry> {
        let mut queue = VecDeque::from(entries);
        let first = queue.pop_front()?;
        self.pending = Some(queue);
        Some(first)
    }

    /// Next buffered entry, or `None` once the listing is exhausted
    pub fn next_entry(&mut self) -> Option<NameEntry> {
        let queue = self.pending.as_mut()?;
        match queue.pop_front() {
            Some(entry) => Some(entry),
            None => {
                self.pending = None;
                None
            }
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.as_ref().map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sftpgate_proto::FileAttributes;

    fn entry(name: &str) -> NameEntry {
        NameEntry::new(name, FileAttributes::default())
    }

    #[test]
    fn empty_listing_stays_unprimed() {
        let mut pager = DirectoryPager::new();
        assert!(pager.prime(Vec::new()).is_none());
        assert!(!pager.is_primed());
        assert!(pager.next_entry().is_none());
    }

    #[test]
    fn entries_come_out_in_order_then_reset() {
        let mut pager = DirectoryPager::new();
        let first = pager.prime(vec![entry("a"), entry("b"), entry("c")]);
        assert_eq!(first.map(|e| e.filename), Some("a".to_string()));
        assert_eq!(pager.remaining(), 2);
        assert_eq!(pager.next_entry().map(|e| e.filename), Some("b".to_string()));
        assert_eq!(pager.next_entry().map(|e| e.filename), Some("c".to_string()));
        assert!(pager.is_primed());
        assert!(pager.next_entry().is_none());
        assert!(!pager.is_primed());
    }

    #[test]
    fn single_entry_listing_ends_on_next_call() {
        let mut pager = DirectoryPager::new();
        assert!(pager.prime(vec![entry("only")]).is_some());
        assert!(pager.is_primed());
        assert_eq!(pager.remaining(), 0);
        assert!(pager.next_entry().is_none());
        assert!(!pager.is_primed());
    }
}
