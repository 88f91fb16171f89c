// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Allocates the smallest unused positive integer out of a set, the scheme
//! the event bus uses for subscriber ids so that ids stay small and stable
//! even as subscribers come and go.

use std::collections::BTreeSet;

/// Tracks which positive ids are currently checked out and hands out the
/// smallest one that is free.
#[derive(Clone, Debug, Default)]
pub struct IdPool {
    taken: BTreeSet<i32>,
}

impl IdPool {
    pub fn new() -> Self {
        IdPool::default()
    }

    /// Allocates and returns the smallest positive id not already taken.
    pub fn allocate(&mut self) -> i32 {
        let mut candidate = 1;
        while self.taken.contains(&candidate) {
            candidate += 1;
        }
        self.taken.insert(candidate);
        candidate
    }

    /// Returns an id to the pool so it can be handed out again.
    pub fn release(&mut self, id: i32) {
        self.taken.remove(&id);
    }

    /// Marks `id` as taken without allocating it, e.g. when recreating a
    /// pool's state from something persisted on disk.
    pub fn mark_taken(&mut self, id: i32) {
        self.taken.insert(id);
    }

    pub fn is_taken(&self, id: i32) -> bool {
        self.taken.contains(&id)
    }

    pub fn taken_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.taken.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_smallest_free_id() {
        let mut pool = IdPool::new();
        assert_eq!(pool.allocate(), 1);
        assert_eq!(pool.allocate(), 2);
        assert_eq!(pool.allocate(), 3);
        pool.release(1);
        assert_eq!(pool.allocate(), 1);
        assert_eq!(pool.allocate(), 4);
    }

    #[test]
    fn release_of_untaken_id_is_a_noop() {
        let mut pool = IdPool::new();
        pool.release(5);
        assert_eq!(pool.allocate(), 1);
    }
}
