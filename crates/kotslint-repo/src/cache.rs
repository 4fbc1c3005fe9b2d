//! Process-wide cache of released versions
//!
//! Only positive answers are recorded and entries are never removed, so a
//! version that was seen to exist keeps existing for the life of the
//! process.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::index::Product;

static GLOBAL: Lazy<Arc<VersionCache>> = Lazy::new(|| Arc::new(VersionCache::new()));

/// Set of `(product, version)` pairs known to exist
#[derive(Debug, Default)]
pub struct VersionCache {
    known: RwLock<HashSet<(Product, String)>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every lookup in the process
    pub fn global() -> Arc<VersionCache> {
        Arc::clone(&GLOBAL)
    }

    pub fn contains(&self, product: Product, version: &str) -> bool {
        let key = (product, normalize(version));
        self.known
            .read()
            .map(|known| known.contains(&key))
            .unwrap_or(false)
    }

    pub(crate) fn insert(&self, product: Product, version: &str) {
        if let Ok(mut known) = self.known.write() {
            known.insert((product, normalize(version)));
        }
    }
}

fn normalize(version: &str) -> String {
    version.trim_start_matches('v').to_string()
}
