use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const NS_BUTTONS: &str = "buttons";
pub const NS_SETTINGS: &str = "settings";

pub trait KvStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StorageError>;
    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StorageError>;
    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StorageError>;
    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StorageError>;
    fn get_u64(&self, namespace: &str, key: &str) -> Result<Option<u64>, StorageError>;
    fn set_u64(&mut self, namespace: &str, key: &str, value: u64) -> Result<(), StorageError>;
    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError>;
    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;
    /// Returns whether the key existed.
    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, StorageError>;

    fn get_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>, StorageError> {
        Ok(self.get_u8(namespace, key)?.map(|value| value != 0))
    }

    fn set_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StorageError> {
        self.set_u8(namespace, key, u8::from(value))
    }
}

pub fn load_or<T>(
    result: Result<Option<T>, StorageError>,
    namespace: &str,
    key: &str,
    default: T,
) -> T {
    match result {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(err) => {
            warn!("failed to read `{namespace}/{key}`, using default: {err}");
            default
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredValue {
    U8(u8),
    U16(u16),
    U64(u64),
    Str(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    namespaces: BTreeMap<String, BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn value(&self, namespace: &str, key: &str) -> Option<&StoredValue> {
        self.namespaces.get(namespace)?.get(key)
    }

    fn insert(&mut self, namespace: &str, key: &str, value: StoredValue) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn mismatch(namespace: &str, key: &str) -> StorageError {
        StorageError::TypeMismatch {
            namespace: namespace.to_string(),
            key: key.to_string(),
        }
    }
}

impl KvStore for MemoryStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StorageError> {
        match self.value(namespace, key) {
            None => Ok(None),
            Some(StoredValue::U8(value)) => Ok(Some(*value)),
            Some(_) => Err(Self::mismatch(namespace, key)),
        }
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StorageError> {
        self.insert(namespace, key, StoredValue::U8(value));
        Ok(())
    }

    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StorageError> {
        match self.value(namespace, key) {
            None => Ok(None),
            Some(StoredValue::U16(value)) => Ok(Some(*value)),
            Some(_) => Err(Self::mismatch(namespace, key)),
        }
    }

    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StorageError> {
        self.insert(namespace, key, StoredValue::U16(value));
        Ok(())
    }

    fn get_u64(&self, namespace: &str, key: &str) -> Result<Option<u64>, StorageError> {
        match self.value(namespace, key) {
            None => Ok(None),
            Some(StoredValue::U64(value)) => Ok(Some(*value)),
            Some(_) => Err(Self::mismatch(namespace, key)),
        }
    }

    fn set_u64(&mut self, namespace: &str, key: &str, value: u64) -> Result<(), StorageError> {
        self.insert(namespace, key, StoredValue::U64(value));
        Ok(())
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        match self.value(namespace, key) {
            None => Ok(None),
            Some(StoredValue::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(Self::mismatch(namespace, key)),
        }
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.insert(namespace, key, StoredValue::Str(value.to_string()));
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some())
    }
}
