//! Key-grouped batches and their offset bookkeeping.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;

use futures::future::try_join_all;

use crate::range::Offset;

/// A routing key that groups values within a batch.
///
/// The encoding must be deterministic: equal keys must produce equal
/// strings so they collide into the same group.
pub trait BatchKey: Clone + Send + Sync + 'static {
    fn encode(&self) -> String;
}

struct BatchGroup<K, V> {
    key: K,
    values: Vec<V>,
}

/// Values grouped by routing key, insertion order preserved per group.
pub struct KeyedBatch<K, V> {
    groups: HashMap<String, BatchGroup<K, V>>,
}

impl<K: BatchKey, V> KeyedBatch<K, V> {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Appends a value to the group for `key`, creating the group on
    /// first use.
    pub fn add(&mut self, key: K, value: V) {
        match self.groups.entry(key.encode()) {
            Entry::Occupied(entry) => entry.into_mut().values.push(value),
            Entry::Vacant(entry) => {
                entry.insert(BatchGroup {
                    key,
                    values: vec![value],
                });
            }
        }
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Total number of values across all groups.
    pub fn num_values(&self) -> usize {
        self.groups.values().map(|group| group.values.len()).sum()
    }

    /// Iterates groups in no particular order.
    pub fn groups(&self) -> impl Iterator<Item = (&K, &[V])> {
        self.groups
            .values()
            .map(|group| (&group.key, group.values.as_slice()))
    }

    /// Invokes `f` once per group, polling all invocations in parallel.
    /// Completes when every invocation completes; fails with the first
    /// error observed.
    pub async fn map<'a, F, Fut, E>(&'a self, f: F) -> Result<(), E>
    where
        F: Fn(&'a K, &'a [V]) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        try_join_all(
            self.groups
                .values()
                .map(|group| f(&group.key, &group.values)),
        )
        .await?;
        Ok(())
    }
}

impl<K: BatchKey, V> Default for KeyedBatch<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for KeyedBatch<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedBatch")
            .field("groups", &self.groups.len())
            .finish()
    }
}

/// A [`KeyedBatch`] stamped with the highest log offset that
/// contributed to it. Empty exactly when the offset is unset.
#[derive(Debug)]
pub struct OffsetBatch<K, V> {
    batch: KeyedBatch<K, V>,
    offset: Option<Offset>,
}

impl<K: BatchKey, V> OffsetBatch<K, V> {
    pub fn new() -> Self {
        Self {
            batch: KeyedBatch::new(),
            offset: None,
        }
    }

    pub fn add(&mut self, key: K, value: V, offset: Offset) {
        self.batch.add(key, value);
        self.offset = Some(offset);
    }

    pub fn is_empty(&self) -> bool {
        self.offset.is_none()
    }

    pub fn offset(&self) -> Option<Offset> {
        self.offset
    }

    pub fn batch(&self) -> &KeyedBatch<K, V> {
        &self.batch
    }

    pub fn clear(&mut self) {
        self.batch.clear();
        self.offset = None;
    }

    /// Takes the accumulated batch and its offset, leaving this slot
    /// empty. Returns `None` when nothing has accumulated.
    pub fn take(&mut self) -> Option<(KeyedBatch<K, V>, Offset)> {
        let offset = self.offset.take()?;
        let batch = std::mem::take(&mut self.batch);
        Some((batch, offset))
    }
}

impl<K: BatchKey, V> Default for OffsetBatch<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestKey(&'static str);

    impl BatchKey for TestKey {
        fn encode(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn equal_keys_collide_into_one_group_in_arrival_order() {
        let mut batch = KeyedBatch::new();
        batch.add(TestKey("a"), 1);
        batch.add(TestKey("b"), 2);
        batch.add(TestKey("a"), 3);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.num_values(), 3);

        let (_, values) = batch
            .groups()
            .find(|(key, _)| **key == TestKey("a"))
            .expect("group for key a");
        assert_eq!(values, &[1, 3]);
    }

    #[test]
    fn clear_drops_all_groups() {
        let mut batch = KeyedBatch::new();
        batch.add(TestKey("a"), 1);
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.num_values(), 0);
    }

    #[tokio::test]
    async fn map_visits_every_group() {
        let mut batch = KeyedBatch::new();
        batch.add(TestKey("a"), 1);
        batch.add(TestKey("b"), 2);
        batch.add(TestKey("b"), 3);

        let visited = Mutex::new(Vec::new());
        batch
            .map(|key, values| {
                let visited = &visited;
                async move {
                    visited.lock().expect("lock").push((key.0, values.len()));
                    Ok::<_, ()>(())
                }
            })
            .await
            .expect("map");

        let mut visited = visited.into_inner().expect("lock");
        visited.sort();
        assert_eq!(visited, vec![("a", 1), ("b", 2)]);
    }

    #[tokio::test]
    async fn map_fails_with_the_group_error() {
        let mut batch = KeyedBatch::new();
        batch.add(TestKey("a"), 1);
        batch.add(TestKey("b"), 2);

        let result = batch
            .map(|key, _| {
                let failing = key.0 == "b";
                async move { if failing { Err("boom") } else { Ok(()) } }
            })
            .await;
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn offset_batch_is_empty_until_stamped() {
        let mut batch = OffsetBatch::new();
        assert!(batch.is_empty());
        assert!(batch.take().is_none());

        batch.add(TestKey("a"), 1, 7);
        batch.add(TestKey("a"), 2, 9);
        assert!(!batch.is_empty());
        assert_eq!(batch.offset(), Some(9));

        let (taken, offset) = batch.take().expect("accumulated batch");
        assert_eq!(offset, 9);
        assert_eq!(taken.num_values(), 2);
        assert!(batch.is_empty());
    }
}
