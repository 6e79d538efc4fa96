use {
    std::{
        collections::BTreeMap,
        fmt,
        fs,
        path::Path,
        sync::{Arc, Mutex, MutexGuard},
    },
    futures::{FutureExt, future::BoxFuture},
    rusqlite::{Connection, types::{Value as SqlValue, ValueRef}},
    serde::{Serialize, Deserialize},
    thiserror::Error,
};

/// Key-value store an action receives as a collaborator. Actions only ever use `get` and `set`,
/// the rest is here for tooling.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<StoredValue>, StorageError>>;
    fn set<'a>(&'a self, key: &'a str, value: StoredValue) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Returns true if the key existed.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>>;

    /// All keys, sorted.
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>>;

    /// Deletes every key visible through this store. Returns how many keys were deleted.
    fn clear(&self) -> BoxFuture<'_, Result<usize, StorageError>> {
        async move {
            let mut deleted = 0;
            for key in self.list().await? {
                if self.delete(&key).await? {
                    deleted += 1;
                }
            }
            Ok(deleted)
        }.boxed()
    }

    /// Sets entries one by one, stopping at the first failure.
    fn set_many(&self, entries: Vec<(String, StoredValue)>) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            for (key, value) in entries {
                self.set(&key, value).await?;
            }
            Ok(())
        }.boxed()
    }
}

/// Value as it is held by the store. Stores are loosely typed: a counter written as an integer
/// may be read back by somebody else as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for StoredValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage operation failed because of internal error in storage implementation
    /// If this happens, something is very broken (similar to 503 response in http).
    #[error("internal io error: {description}")]
    InternalError {
        description: String,
    },

    /// Key used in this operation violates one of constraints set by this storage backend.
    #[error("key used in this operation violates one of constraints set by this storage backend: {description}")]
    KeyConstraintError {
        description: String,
    },
}

#[derive(Error, Debug)]
pub enum StoreInitError {
    #[error("failed to create directory for store: {0:?}")]
    FailedToCreateDirectory(std::io::Error),

    #[error("failed to open connection: {0:?}")]
    ConnectionOpenError(rusqlite::Error),

    #[error("failed to init database: {0:?}")]
    DatabaseInitError(rusqlite::Error),
}

/// Process-local store. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredValue>>, StorageError> {
        self.entries.lock()
            .map_err(|err| StorageError::InternalError { description: format!("failed to lock memory store: {err:?}") })
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<StoredValue>, StorageError>> {
        async move { Ok(self.entries()?.get(key).cloned()) }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: StoredValue) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            self.entries()?.insert(key.to_owned(), value);
            Ok(())
        }.boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move { Ok(self.entries()?.remove(key).is_some()) }.boxed()
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move { Ok(self.entries()?.keys().cloned().collect()) }.boxed()
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreInitError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(StoreInitError::FailedToCreateDirectory)?;
            }
        }

        Self::from_connection(Connection::open(path).map_err(StoreInitError::ConnectionOpenError)?)
    }

    pub fn in_memory() -> Result<Self, StoreInitError> {
        Self::from_connection(Connection::open_in_memory().map_err(StoreInitError::ConnectionOpenError)?)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreInitError> {
        // no declared type on value: integers stay integers and text stays text
        connection.execute("create table if not exists kv (key text primary key, value)", ())
            .map_err(StoreInitError::DatabaseInitError)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.connection.lock()
            .map_err(|err| StorageError::InternalError { description: format!("failed to acquire sqlite connection: {err:?}") })
    }
}

impl KvStore for SqliteStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<StoredValue>, StorageError>> {
        async move {
            let connection = self.connection()?;
            let mut stmt = connection.prepare("select value from kv where key = ?1")
                .map_err(|err| StorageError::InternalError { description: format!("failed to prepare sqlite query: {err:?}") })?;
            let mut rows = stmt.query([key])
                .map_err(|err| StorageError::InternalError { description: format!("failed to execute sqlite query: {err:?}") })?;

            let row = rows.next()
                .map_err(|err| StorageError::InternalError { description: format!("failed to read row from sqlite result: {err:?}") })?;
            let row = match row {
                Some(v) => v,
                None => return Ok(None),
            };

            let value = row.get_ref(0)
                .map_err(|err| StorageError::InternalError { description: format!("failed to decode sqlite result: {err:?}") })?;
            Ok(match value {
                ValueRef::Null => None,
                ValueRef::Integer(v) => Some(StoredValue::Integer(v)),
                ValueRef::Real(v) => Some(StoredValue::Text(v.to_string())),
                ValueRef::Text(v) | ValueRef::Blob(v) => Some(StoredValue::Text(String::from_utf8_lossy(v).into_owned())),
            })
        }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: StoredValue) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let value = match value {
                StoredValue::Integer(v) => SqlValue::Integer(v),
                StoredValue::Text(v) => SqlValue::Text(v),
            };
            self.connection()?
                .execute("insert or replace into kv (key, value) values (?1, ?2)", (key, value))
                .map_err(|err| StorageError::InternalError { description: format!("failed to execute sqlite query: {err:?}") })
                .map(|_| ())
        }.boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move {
            self.connection()?
                .execute("delete from kv where key = ?1", [key])
                .map_err(|err| StorageError::InternalError { description: format!("failed to execute sqlite query: {err:?}") })
                .map(|deleted| deleted > 0)
        }.boxed()
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move {
            let connection = self.connection()?;
            let mut stmt = connection.prepare("select key from kv order by key")
                .map_err(|err| StorageError::InternalError { description: format!("failed to prepare sqlite query: {err:?}") })?;
            let keys = stmt.query_map((), |row| row.get::<_, String>(0))
                .map_err(|err| StorageError::InternalError { description: format!("failed to execute sqlite query: {err:?}") })?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| StorageError::InternalError { description: format!("failed to decode sqlite result: {err:?}") })?;
            Ok(keys)
        }.boxed()
    }
}

/// Prefixes every key, so that several namespaces can share one backing store.
pub struct NamespacedStore<T> {
    namespace: String,
    inner: T,
}

impl<T> NamespacedStore<T> {
    pub fn new(namespace: impl Into<String>, inner: T) -> Self {
        Self {
            namespace: namespace.into(),
            inner,
        }
    }

    fn namespaced_key(&self, key: &str) -> Result<String, StorageError> {
        if key.is_empty() {
            return Err(StorageError::KeyConstraintError { description: "key should not be empty".to_owned() });
        }

        let mut namespaced_key = String::with_capacity(self.namespace.len() + key.len());
        namespaced_key.push_str(&self.namespace);
        namespaced_key.push_str(key);
        Ok(namespaced_key)
    }
}

impl<T: KvStore> KvStore for NamespacedStore<T> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<StoredValue>, StorageError>> {
        async move { self.inner.get(&self.namespaced_key(key)?).await }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: StoredValue) -> BoxFuture<'a, Result<(), StorageError>> {
        async move { self.inner.set(&self.namespaced_key(key)?, value).await }.boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move { self.inner.delete(&self.namespaced_key(key)?).await }.boxed()
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move {
            Ok(self.inner.list().await?
                .into_iter()
                .filter_map(|key| key.strip_prefix(&self.namespace).map(|v| v.to_owned()))
                .collect())
        }.boxed()
    }
}

impl<T: Clone> Clone for NamespacedStore<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            inner: self.inner.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BoxedStore {
    inner: Arc<dyn KvStore>,
}

impl BoxedStore {
    pub fn new<T: KvStore + 'static>(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl KvStore for BoxedStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<StoredValue>, StorageError>> {
        self.inner.get(key)
    }

    fn set<'a>(&'a self, key: &'a str, value: StoredValue) -> BoxFuture<'a, Result<(), StorageError>> {
        self.inner.set(key, value)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        self.inner.delete(key)
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        self.inner.list()
    }
}
