/*!
 * Refresh Context
 *
 * Work queue shared by one worker scan. Sequential contexts drain on the
 * calling thread; concurrent contexts drain on a bounded set of scoped threads
 * until the outstanding-task counter reaches zero.
 */

use ahash::RandomState;
use crossbeam_queue::SegQueue;
use dashmap::DashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::limits::MAX_REFRESH_PARALLELISM;
use crate::core::types::FileId;

pub(crate) struct RefreshContext {
    pending: SegQueue<FileId>,
    /// Every id submitted during this scan
    submitted: DashSet<FileId, RandomState>,
    outstanding: AtomicUsize,
    /// Files skipped because of cancellation
    to_become_dirty: SegQueue<FileId>,
    parallelism: usize,
}

impl RefreshContext {
    pub fn sequential() -> Self {
        Self::with_parallelism(0)
    }

    pub fn concurrent(parallelism: usize) -> Self {
        Self::with_parallelism(parallelism.min(MAX_REFRESH_PARALLELISM))
    }

    fn with_parallelism(parallelism: usize) -> Self {
        Self {
            pending: SegQueue::new(),
            submitted: DashSet::with_hasher(RandomState::new()),
            outstanding: AtomicUsize::new(0),
            to_become_dirty: SegQueue::new(),
            parallelism,
        }
    }

    pub fn is_concurrent(&self) -> bool {
        self.parallelism > 0
    }

    /// Schedule a file for processing; each file is processed once per scan
    pub fn submit(&self, id: FileId) {
        if !self.submitted.insert(id) {
            return;
        }
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.pending.push(id);
    }

    /// Remember a file the cancelled scan did not finish
    pub fn postpone(&self, id: FileId) {
        self.to_become_dirty.push(id);
    }

    /// Process submitted files (and whatever they submit) until none remain
    pub fn run<F>(&self, process: F)
    where
        F: Fn(&RefreshContext, FileId) + Sync,
    {
        if !self.is_concurrent() {
            self.drain(&process);
            return;
        }

        let span = tracing::Span::current();
        std::thread::scope(|scope| {
            for _ in 0..self.parallelism {
                let span = span.clone();
                let process = &process;
                scope.spawn(move || {
                    let _entered = span.enter();
                    self.drain(process);
                });
            }
        });
    }

    fn drain<F>(&self, process: &F)
    where
        F: Fn(&RefreshContext, FileId) + Sync,
    {
        loop {
            match self.pending.pop() {
                Some(id) => {
                    process(self, id);
                    self.outstanding.fetch_sub(1, Ordering::AcqRel);
                }
                None => {
                    // Another thread may still submit children
                    if self.outstanding.load(Ordering::Acquire) == 0 {
                        return;
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    pub fn take_postponed(&self) -> Vec<FileId> {
        let mut postponed = Vec::with_capacity(self.to_become_dirty.len());
        while let Some(id) = self.to_become_dirty.pop() {
            postponed.push(id);
        }
        postponed
    }
}
