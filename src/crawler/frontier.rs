//! Crawl frontier
//!
//! A deduplicated, typed queue of links. Each URL is stored once (the first
//! insertion wins) and batches come out category-first, preserving insertion
//! order within a kind.

use crate::crawler::link::Link;
use indexmap::IndexMap;
use std::fmt;

/// Role of a link in the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkKind {
    /// Listing page, mined for further links
    Category,
    /// Product page, handed to the parser adapter
    Product,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category => f.write_str("category"),
            Self::Product => f.write_str("product"),
        }
    }
}

/// A link together with its role
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub link: Link,
    pub kind: LinkKind,
}

/// The crawl queue
#[derive(Debug, Default)]
pub struct Frontier {
    entries: IndexMap<String, FrontierEntry>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds links of one kind, ignoring URLs already present
    ///
    /// # Returns
    ///
    /// The number of links actually added
    pub fn add_links<I, L>(&mut self, links: I, kind: LinkKind) -> usize
    where
        I: IntoIterator<Item = L>,
        L: Into<Link>,
    {
        let mut added = 0;
        for link in links {
            let link = link.into();
            let url = link.url();
            if self.entries.contains_key(&url) {
                continue;
            }
            self.entries.insert(url, FrontierEntry { link, kind });
            added += 1;
        }
        added
    }

    /// Returns up to `count` unvisited links
    ///
    /// With `kind = None` categories come before products. The frontier
    /// itself is not modified; callers mark links visited once a batch has
    /// been dispatched.
    pub fn next(&self, kind: Option<LinkKind>, count: usize) -> Vec<Link> {
        let kinds: &[LinkKind] = match kind {
            Some(LinkKind::Category) => &[LinkKind::Category],
            Some(LinkKind::Product) => &[LinkKind::Product],
            None => &[LinkKind::Category, LinkKind::Product],
        };

        kinds
            .iter()
            .flat_map(|wanted| {
                self.entries
                    .values()
                    .filter(move |entry| entry.kind == *wanted && !entry.link.is_visited())
            })
            .take(count)
            .map(|entry| entry.link.clone())
            .collect()
    }

    /// Looks up an entry by identity URL
    pub fn get(&self, url: &str) -> Option<&FrontierEntry> {
        self.entries.get(url)
    }

    /// Returns the kind recorded for a URL
    pub fn kind_of(&self, url: &str) -> Option<LinkKind> {
        self.entries.get(url).map(|entry| entry.kind)
    }

    /// Marks the given URLs visited; unknown URLs are ignored
    pub fn mark_visited<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            if let Some(entry) = self.entries.get_mut(url.as_ref()) {
                entry.link.mark_visited();
            }
        }
    }

    /// Marks every link of a kind visited
    pub fn visit_all(&mut self, kind: LinkKind) {
        for entry in self.entries.values_mut().filter(|e| e.kind == kind) {
            entry.link.mark_visited();
        }
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of entries, visited or not
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries of one kind, visited or not
    pub fn count_kind(&self, kind: LinkKind) -> usize {
        self.entries.values().filter(|e| e.kind == kind).count()
    }

    /// Number of entries not yet visited
    pub fn pending(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !e.link.is_visited())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
