//! Tiered key-value persistence for session material and connection flags.
//!
//! Two store shapes back the credential tiers: a structured store holding
//! JSON values and a plain string store. Both are process-local and cheap;
//! the remote identity-provider tier lives in `weft-engine`. An OS-keyring
//! string store is available behind the `os-keyring` feature for desktop
//! hosts.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde_json::Value;
use thiserror::Error;

/// Legacy flat key names kept for back-compat with the reference web client.
pub mod legacy_keys {
    pub const USER_ID: &str = "mx_user_id";
    pub const ACCESS_TOKEN: &str = "mx_access_token";
    pub const DEVICE_ID: &str = "mx_device_id";
    pub const HOMESERVER_URL: &str = "mx_hs_url";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entry not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Plain string store; the "simple string store" credential tier.
pub trait StringStore: Send + Sync {
    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;

    fn get_string(&self, namespace: &str, key: &str) -> Result<String, StoreError>;

    fn delete_string(&self, namespace: &str, key: &str) -> Result<(), StoreError>;
}

/// Structured store holding JSON values; the fast structured credential tier.
pub trait StructuredStore: Send + Sync {
    fn set_value(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StoreError>;

    fn get_value(&self, namespace: &str, key: &str) -> Result<Value, StoreError>;

    fn delete_value(&self, namespace: &str, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryStringStore {
    data: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl StringStore for InMemoryStringStore {
    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))?;
        data.insert((namespace.to_owned(), key.to_owned()), value.to_owned());
        Ok(())
    }

    fn get_string(&self, namespace: &str, key: &str) -> Result<String, StoreError> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))?;
        data.get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn delete_string(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))?;
        if data
            .remove(&(namespace.to_owned(), key.to_owned()))
            .is_none()
        {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStructuredStore {
    data: Arc<RwLock<HashMap<(String, String), Value>>>,
}

impl StructuredStore for InMemoryStructuredStore {
    fn set_value(&self, namespace: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))?;
        data.insert((namespace.to_owned(), key.to_owned()), value.clone());
        Ok(())
    }

    fn get_value(&self, namespace: &str, key: &str) -> Result<Value, StoreError> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))?;
        data.get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn delete_value(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Backend("poisoned lock".to_owned()))?;
        if data
            .remove(&(namespace.to_owned(), key.to_owned()))
            .is_none()
        {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// OS-keyring backed string store for credential material on desktop hosts.
#[cfg(feature = "os-keyring")]
#[derive(Default, Clone, Copy)]
pub struct OsKeyringStringStore;

#[cfg(feature = "os-keyring")]
impl StringStore for OsKeyringStringStore {
    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let entry = keyring::Entry::new(namespace, key)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        entry
            .set_password(value)
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn get_string(&self, namespace: &str, key: &str) -> Result<String, StoreError> {
        let entry = keyring::Entry::new(namespace, key)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        entry.get_password().map_err(|err| match err {
            keyring::Error::NoEntry => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        })
    }

    fn delete_string(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let entry = keyring::Entry::new(namespace, key)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        entry.delete_credential().map_err(|err| match err {
            keyring::Error::NoEntry => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        })
    }
}

/// Pins a namespace onto a string store.
#[derive(Clone)]
pub struct ScopedStringStore<S: StringStore> {
    inner: S,
    namespace: String,
}

impl<S: StringStore> ScopedStringStore<S> {
    pub fn new(inner: S, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_string(&self.namespace, key, value)
    }

    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        self.inner.get_string(&self.namespace, key)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete_string(&self.namespace, key)
    }
}
