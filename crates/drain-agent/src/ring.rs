// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::hash::Hasher;
use std::num::NonZeroUsize;

use fnv::FnvHasher;

/// Shards source ids over a fixed destination pool.
///
/// The pool size never changes after startup, so a given id maps to the
/// same destination for the life of the process.
#[derive(Debug, Clone, Copy)]
pub struct HashRing {
    size: NonZeroUsize,
}

impl HashRing {
    #[must_use]
    pub fn new(size: NonZeroUsize) -> Self {
        HashRing { size }
    }

    /// Index of the destination `id` routes to.
    #[must_use]
    pub fn resolve(&self, id: &str) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write(id.as_bytes());
        (hasher.finish() % self.size.get() as u64) as usize
    }
}
