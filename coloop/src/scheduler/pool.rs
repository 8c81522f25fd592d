use core::cell::Cell;

use crate::task::TaskId;

use super::Tcb;

/// Ordered set of live task control blocks
///
/// The links live in the control blocks themselves and are addressed by
/// index, so inserting and unlinking are O(1). Unused control blocks
/// are chained through the same `next` link into a free list.
pub(crate) struct Pool {
    head: Cell<Option<TaskId>>,
    tail: Cell<Option<TaskId>>,
    free: Cell<Option<TaskId>>,
    len: Cell<usize>,
}

impl Pool {
    pub(crate) fn new(tcbs: &[Tcb]) -> Self {
        for (i, tcb) in tcbs.iter().enumerate() {
            tcb.next.set(tcbs.get(i + 1).map(Tcb::id));
            tcb.prev.set(None);
        }

        Self {
            head: Cell::new(None),
            tail: Cell::new(None),
            free: Cell::new(tcbs.first().map(Tcb::id)),
            len: Cell::new(0),
        }
    }

    /// Take a control block off the free list
    pub(crate) fn alloc(&self, tcbs: &[Tcb]) -> Option<TaskId> {
        let id = self.free.get()?;

        self.free.set(tcbs[id.index()].next.get());

        Some(id)
    }

    /// Link control block at the end of the pool
    pub(crate) fn push_back(&self, tcbs: &[Tcb], id: TaskId) {
        let tcb = &tcbs[id.index()];

        tcb.prev.set(self.tail.get());
        tcb.next.set(None);

        match self.tail.get() {
            Some(tail) => tcbs[tail.index()].next.set(Some(id)),
            None => self.head.set(Some(id)),
        }

        self.tail.set(Some(id));
        self.len.set(self.len.get() + 1);
    }

    /// Unlink control block from the pool and return it to the free list
    pub(crate) fn unlink(&self, tcbs: &[Tcb], id: TaskId) {
        let tcb = &tcbs[id.index()];
        let prev = tcb.prev.get();
        let next = tcb.next.get();

        match prev {
            Some(prev) => tcbs[prev.index()].next.set(next),
            None => self.head.set(next),
        }

        match next {
            Some(next) => tcbs[next.index()].prev.set(prev),
            None => self.tail.set(prev),
        }

        tcb.prev.set(None);
        tcb.next.set(self.free.get());
        self.free.set(Some(id));
        self.len.set(self.len.get() - 1);
    }

    pub(crate) fn head(&self) -> Option<TaskId> {
        self.head.get()
    }

    pub(crate) fn tail(&self) -> Option<TaskId> {
        self.tail.get()
    }

    pub(crate) fn next(&self, tcbs: &[Tcb], id: TaskId) -> Option<TaskId> {
        tcbs[id.index()].next.get()
    }

    pub(crate) fn len(&self) -> usize {
        self.len.get()
    }

    /// Iterate over linked control blocks in pool order. The pool must
    /// not be modified while iterating.
    pub(crate) fn iter<'a>(&self, tcbs: &'a [Tcb]) -> impl Iterator<Item = &'a Tcb> + 'a {
        let mut cursor = self.head.get();

        core::iter::from_fn(move || {
            let tcb = &tcbs[cursor?.index()];
            cursor = tcb.next.get();
            Some(tcb)
        })
    }
}
