//! The backtrack log of deferred semantic actions.

use super::grammar::ActionId;
use crate::codemap::Span;
use std::collections::TryReserveError;

/// What a deferred record does when it is replayed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Op<K> {
    /// Resets `size` value slots of the owning frame.
    Frame {
        /// The number of slots in the frame.
        size: usize,
    },
    /// Opens an accumulator scope at the start of the capture.
    Open,
    /// Closes the top accumulator scope into a composite token.
    Close(K),
    /// Closes the top accumulator scope by splicing it into its parent.
    Flatten,
    /// Appends a leaf token covering the capture.
    Emit(K),
    /// Moves the result value of a returned child frame into a label slot.
    Bind {
        /// The base slot of the child frame.
        from: usize,
    },
    /// Runs a grammar-supplied semantic action.
    Action(ActionId),
}

/// One deferred action record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Thunk<K> {
    /// The operation to perform.
    pub op: Op<K>,
    /// The input region matched by the expression that logged the record.
    pub capture: Span,
    /// The value slot the operation reads or writes.
    pub slot: usize,
}

impl<K> Thunk<K> {
    /// Moves all value slot references by `delta`.
    #[inline]
    fn rebase(self, delta: isize) -> Self {
        let op = match self.op {
            Op::Bind { from } => Op::Bind {
                from: from.wrapping_add_signed(delta),
            },
            op => op,
        };
        Self {
            op,
            capture: self.capture,
            slot: self.slot.wrapping_add_signed(delta),
        }
    }
}

/// An append-only log of [`Thunk`]s written while matching.
///
/// Records are replayed in logging order when the parse commits, or discarded
/// by truncating back to a mark when the alternative that logged them fails.
#[derive(Debug)]
pub(crate) struct ThunkLog<K> {
    /// The logged records.
    thunks: Vec<Thunk<K>>,
}

impl<K> ThunkLog<K> {
    /// Creates an empty log with room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut thunks = Vec::new();
        thunks.try_reserve(capacity)?;
        Ok(Self { thunks })
    }

    /// Appends a record.
    #[inline]
    pub fn log(&mut self, thunk: Thunk<K>) -> Result<(), TryReserveError> {
        if self.thunks.len() == self.thunks.capacity() {
            self.thunks.try_reserve(self.thunks.capacity().max(1))?;
        }
        self.thunks.push(thunk);
        Ok(())
    }

    /// Returns the current log position, for use as a backtrack checkpoint.
    #[inline]
    pub fn mark(&self) -> usize {
        self.thunks.len()
    }

    /// Discards all records logged after `mark`.
    #[inline]
    pub fn truncate(&mut self, mark: usize) {
        self.thunks.truncate(mark);
    }

    /// Returns the records logged after `mark`.
    #[inline]
    pub fn since(&self, mark: usize) -> &[Thunk<K>] {
        &self.thunks[mark.min(self.thunks.len())..]
    }

    /// Removes the records up to `end` for replay, in logging order.
    #[inline]
    pub fn commit(&mut self, end: usize) -> std::vec::Drain<'_, Thunk<K>> {
        let end = end.min(self.thunks.len());
        self.thunks.drain(..end)
    }
}

impl<K: Copy> ThunkLog<K> {
    /// Appends copies of `thunks` with their value slots moved by `delta`.
    pub fn extend_rebased(
        &mut self,
        thunks: &[Thunk<K>],
        delta: isize,
    ) -> Result<(), TryReserveError> {
        self.thunks.try_reserve(thunks.len())?;
        self.thunks
            .extend(thunks.iter().map(|thunk| thunk.rebase(delta)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(kind: char, start: usize) -> Thunk<char> {
        Thunk {
            op: Op::Emit(kind),
            capture: Span::new(start, start + 1),
            slot: 0,
        }
    }

    #[test]
    fn truncate_discards_tail() {
        let mut log = ThunkLog::with_capacity(1).unwrap();
        log.log(emit('a', 0)).unwrap();
        let mark = log.mark();
        log.log(emit('b', 1)).unwrap();
        log.log(emit('c', 2)).unwrap();
        assert_eq!(log.since(mark).len(), 2);
        log.truncate(mark);
        log.log(emit('d', 1)).unwrap();
        let replayed = log.commit(usize::MAX).map(|t| t.op).collect::<Vec<_>>();
        assert_eq!(replayed, [Op::Emit('a'), Op::Emit('d')]);
        assert_eq!(log.mark(), 0);
    }

    #[test]
    fn commit_is_in_order_and_once() {
        let mut log = ThunkLog::with_capacity(0).unwrap();
        for (i, kind) in "abcdef".chars().enumerate() {
            log.log(emit(kind, i)).unwrap();
        }
        let first = log.commit(3).map(|t| t.capture.start).collect::<Vec<_>>();
        assert_eq!(first, [0, 1, 2]);
        let rest = log.commit(usize::MAX).map(|t| t.capture.start).collect::<Vec<_>>();
        assert_eq!(rest, [3, 4, 5]);
        assert_eq!(log.commit(usize::MAX).count(), 0);
    }

    #[test]
    fn rebase_moves_slots_only() {
        let mut log = ThunkLog::<char>::with_capacity(4).unwrap();
        let cached = [
            Thunk {
                op: Op::Frame { size: 2 },
                capture: Span::new(4, 9),
                slot: 10,
            },
            Thunk {
                op: Op::Bind { from: 12 },
                capture: Span::new(4, 9),
                slot: 11,
            },
        ];
        log.extend_rebased(&cached, -7).unwrap();
        let thunks = log.since(0);
        assert_eq!(thunks[0].slot, 3);
        assert_eq!(thunks[0].capture, Span::new(4, 9));
        assert_eq!(thunks[1].op, Op::Bind { from: 5 });
        assert_eq!(thunks[1].slot, 4);
    }
}
