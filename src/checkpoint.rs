//! Resumable key-value state shared by every pipeline stage.
//!
//! A [`CheckpointStore`] is loaded from its state file when a stage starts,
//! answers "was this key already processed?", accepts new entries, and writes
//! itself back either every `flush_every` new entries or on demand. A key
//! that is present is never recomputed by the stages, which is what makes an
//! interrupted run resumable: a crash loses at most one flush interval.
//!
//! The on-disk representation is delegated to a [`StateCodec`] so the same
//! store backs the JSON caches and the TSV tables.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::KiraError;
use crate::store::Store;

pub trait StateCodec {
    type Key: Clone + Eq + Hash + fmt::Debug;
    type Value: Clone;

    fn decode(bytes: &[u8]) -> Result<Vec<(Self::Key, Self::Value)>, String>;
    fn encode(entries: &[(&Self::Key, &Self::Value)]) -> Result<Vec<u8>, String>;
}

pub struct CheckpointStore<C: StateCodec> {
    path: Utf8PathBuf,
    order: Vec<C::Key>,
    entries: HashMap<C::Key, C::Value>,
    flush_every: Option<usize>,
    pending: usize,
    dirty: bool,
    _codec: PhantomData<C>,
}

impl<C: StateCodec> CheckpointStore<C> {
    /// Loads `path` if it exists, otherwise starts empty.
    ///
    /// `flush_every` of `None` disables the periodic flush; the caller then
    /// decides when to call [`flush`](Self::flush).
    pub fn open(path: Utf8PathBuf, flush_every: Option<usize>) -> Result<Self, KiraError> {
        let mut store = Self {
            path,
            order: Vec::new(),
            entries: HashMap::new(),
            flush_every: flush_every.filter(|every| *every > 0),
            pending: 0,
            dirty: false,
            _codec: PhantomData,
        };
        if let Some(bytes) = Store::read_optional(&store.path)? {
            let decoded = C::decode(&bytes).map_err(|message| KiraError::StateFile {
                path: store.path.to_string(),
                message,
            })?;
            for (key, value) in decoded {
                store.insert(key, value);
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn contains(&self, key: &C::Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &C::Key) -> Option<&C::Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries added since the last flush.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&C::Key, &C::Value)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|value| (key, value)))
    }

    /// Records `value` under `key`. Returns `true` when this put triggered a
    /// periodic flush.
    pub fn put(&mut self, key: C::Key, value: C::Value) -> Result<bool, KiraError> {
        self.insert(key, value);
        self.pending += 1;
        self.dirty = true;
        match self.flush_every {
            Some(every) if self.pending >= every => {
                self.flush()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        let before = self.order.len();
        let entries = &mut self.entries;
        self.order.retain(|key| {
            let kept = entries
                .get(key)
                .map(|value| keep(key, value))
                .unwrap_or(false);
            if !kept {
                entries.remove(key);
            }
            kept
        });
        if self.order.len() != before {
            self.dirty = true;
        }
    }

    /// Writes the full state atomically, regardless of the pending count.
    pub fn flush(&mut self) -> Result<(), KiraError> {
        let entries = self.iter().collect::<Vec<_>>();
        let bytes = C::encode(&entries).map_err(|message| KiraError::StateFile {
            path: self.path.to_string(),
            message,
        })?;
        Store::write_bytes_atomic(&self.path, &bytes)?;
        self.pending = 0;
        self.dirty = false;
        Ok(())
    }

    /// Flushes only if something changed since the last write.
    pub fn flush_if_dirty(&mut self) -> Result<bool, KiraError> {
        if !self.dirty {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    fn insert(&mut self, key: C::Key, value: C::Value) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }
}

/// Pretty-printed JSON object keyed by string.
pub struct JsonMapCodec<V>(PhantomData<V>);

impl<V> StateCodec for JsonMapCodec<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    type Key = String;
    type Value = V;

    fn decode(bytes: &[u8]) -> Result<Vec<(String, V)>, String> {
        let map: BTreeMap<String, V> =
            serde_json::from_slice(bytes).map_err(|err| err.to_string())?;
        Ok(map.into_iter().collect())
    }

    fn encode(entries: &[(&String, &V)]) -> Result<Vec<u8>, String> {
        let map = entries.iter().copied().collect::<BTreeMap<_, _>>();
        let mut bytes = serde_json::to_vec_pretty(&map).map_err(|err| err.to_string())?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
