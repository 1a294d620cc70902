use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{KeyValueStore, KvError};

/// Process-local slots. Clones share the same map, so every view handed a
/// clone sees the same values.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKv {
    slots: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKv {
    pub fn with_seed<K, V>(seed: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let kv = Self::default();
        kv.slots
            .write()
            .extend(seed.into_iter().map(|(k, v)| (k.into(), v.into())));
        kv
    }
}

impl KeyValueStore for InMemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.slots.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.slots.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
