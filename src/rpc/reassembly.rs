//! Ordered reassembly of out-of-order chunk results

/// Index-addressed slots filled as chunk results arrive
///
/// Only the first value for a slot is kept; later duplicates are reported
/// and dropped.
#[derive(Debug)]
pub struct ReassemblyBuffer<T> {
    slots: Vec<Option<T>>,
    filled: usize,
}

impl<T> ReassemblyBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
            filled: 0,
        }
    }

    /// Store `value` at `index`; returns false for duplicates or out-of-range indices
    pub fn insert(&mut self, index: usize, value: T) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(value);
                self.filled += 1;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Indices still waiting for a value
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Values in index order, or `None` if any slot is empty
    pub fn into_ordered(self) -> Option<Vec<T>> {
        self.slots.into_iter().collect()
    }
}
