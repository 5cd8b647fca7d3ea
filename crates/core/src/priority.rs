//! Stable priority-ordered list.

/// A list ordered by descending priority; ties keep insertion order.
#[derive(Debug, Clone)]
pub struct PriorityList<T> {
    elems: Vec<(i32, u64, T)>,
    counter: u64,
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self {
            elems: Vec::new(),
            counter: 0,
        }
    }
}

impl<T> PriorityList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value`; the list stays sorted.
    pub fn insert(&mut self, priority: i32, value: T) {
        let seq = self.counter;
        self.counter += 1;
        let pos = self
            .elems
            .partition_point(|(p, s, _)| (-*p, *s) < (-priority, seq));
        self.elems.insert(pos, (priority, seq, value));
    }

    /// Remove every element matching `pred`, returning how many were removed.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.elems.len();
        self.elems.retain(|(_, _, v)| !pred(v));
        before - self.elems.len()
    }

    /// Iterate in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elems.iter().map(|(_, _, v)| v)
    }

    /// Iterate over `(priority, value)` in priority order.
    pub fn iter_with_priority(&self) -> impl Iterator<Item = (i32, &T)> {
        self.elems.iter().map(|(p, _, v)| (*p, v))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_by_descending_priority() {
        let mut list = PriorityList::new();
        list.insert(1, "low");
        list.insert(100, "high");
        list.insert(-1, "last");
        list.insert(50, "mid");

        let order: Vec<_> = list.iter().copied().collect();
        assert_eq!(order, vec!["high", "mid", "low", "last"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut list = PriorityList::new();
        list.insert(1, "a");
        list.insert(1, "b");
        list.insert(2, "c");
        list.insert(1, "d");

        let order: Vec<_> = list.iter().copied().collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_remove_where() {
        let mut list = PriorityList::new();
        list.insert(1, 10);
        list.insert(1, 20);
        list.insert(5, 10);

        assert_eq!(list.remove_where(|v| *v == 10), 2);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter_with_priority().collect::<Vec<_>>(), vec![(1, &20)]);
        assert!(!list.is_empty());
    }
}
