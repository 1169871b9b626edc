//! In-memory cursor store, for dry runs and tests

use std::sync::{Arc, Mutex};

use livetap_domain::{
    ingestion::{Cursor, StoreError},
    ports::CursorStore,
};

/// CursorStore that forgets everything when the process exits
#[derive(Debug, Clone, Default)]
pub struct MemoryCursorStore {
    cursor: Arc<Mutex<Option<Cursor>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(cursor: Cursor) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(Some(cursor))),
        }
    }

    /// Last saved cursor, `None` if nothing was saved
    pub fn current(&self) -> Option<Cursor> {
        self.cursor.lock().ok().and_then(|cursor| cursor.clone())
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> impl std::future::Future<Output = Result<Cursor, StoreError>> + Send {
        let result = self
            .cursor
            .lock()
            .map(|cursor| cursor.clone().unwrap_or_default())
            .map_err(|_| StoreError::io("cursor lock poisoned"));

        async move { result }
    }

    fn save(&self, cursor: &Cursor) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        let result = self
            .cursor
            .lock()
            .map(|mut current| *current = Some(cursor.clone()))
            .map_err(|_| StoreError::io("cursor lock poisoned"));

        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store_loads_beginning() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.load().await.unwrap(), Cursor::Beginning);
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn test_clones_share_the_cursor() {
        let store = MemoryCursorStore::starting_at(Cursor::at("a"));
        let other = store.clone();

        other.save(&Cursor::at("b")).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Cursor::at("b"));
        assert_eq!(store.current(), Some(Cursor::at("b")));
    }
}
