//! Word store boundary
//!
//! The shared list lives somewhere else (a realtime database in the
//! original deployment); this module only fixes the contract: an ordered
//! bulk fetch plus an at-least-once insert feed that may overlap the fetch
//! window. Consumers deduplicate by id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One row of the shared list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWord {
    pub id: String,
    pub text: String,
    pub inserted_at: u64,
}

/// Live insert notification. Delivery is at-least-once and may duplicate
/// rows already returned by `fetch_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordInsert {
    pub id: String,
    pub text: String,
}

pub trait WordStore: Send + Sync {
    /// All rows, in insertion order.
    fn fetch_all(&self) -> Result<Vec<StoredWord>, String>;

    /// Subscribe to inserts made after this call. Each subscriber gets its
    /// own channel.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<WordInsert>;

    /// Submit a new word, returning its id.
    fn insert(&self, text: &str) -> Result<String, String>;
}

/// In-process store backing the CLI and the tests.
pub struct MemoryStore {
    rows: Mutex<Vec<StoredWord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<WordInsert>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Pre-populate rows that `fetch_all` will return, without notifying
    /// subscribers. These become the seed batch.
    pub fn with_seed<S: AsRef<str>>(words: &[S]) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.lock().unwrap();
            for w in words {
                let n = store.next_id.fetch_add(1, Ordering::SeqCst);
                rows.push(StoredWord {
                    id: format!("w{n}"),
                    text: w.as_ref().to_string(),
                    inserted_at: n,
                });
            }
        }
        store
    }

    /// Re-deliver an existing row to all subscribers, as a real backend is
    /// allowed to do. Test hook for the dedup path.
    pub fn redeliver(&self, id: &str) {
        let row = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned();
        if let Some(row) = row {
            self.notify(WordInsert {
                id: row.id,
                text: row.text,
            });
        }
    }

    fn notify(&self, insert: WordInsert) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(insert.clone()).is_ok());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WordStore for MemoryStore {
    fn fetch_all(&self) -> Result<Vec<StoredWord>, String> {
        Ok(self.rows.lock().unwrap().clone())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<WordInsert> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn insert(&self, text: &str) -> Result<String, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty word".to_string());
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = StoredWord {
            id: format!("w{n}"),
            text: text.to_string(),
            inserted_at: n,
        };
        self.rows.lock().unwrap().push(row.clone());
        self.notify(WordInsert {
            id: row.id.clone(),
            text: row.text,
        });
        Ok(row.id)
    }
}

/// Load a seed word list from a JSON file: either `["가", "나"]` or an
/// array of `{id, text, inserted_at}` rows.
pub fn load_seed_file(path: &std::path::Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    if let Ok(words) = serde_json::from_str::<Vec<String>>(&raw) {
        return Ok(words);
    }
    let rows: Vec<StoredWord> = serde_json::from_str(&raw)?;
    Ok(rows.into_iter().map(|r| r.text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn insert_notifies_every_subscriber() {
        let store = MemoryStore::new();
        let mut a = store.subscribe();
        let mut b = store.subscribe();

        let id = store.insert("사과").unwrap();
        assert_eq!(a.try_recv().unwrap().id, id);
        assert_eq!(b.try_recv().unwrap().text, "사과");
    }

    #[test]
    fn seed_rows_do_not_notify() {
        let store = MemoryStore::with_seed(&["가", "나"]);
        let mut rx = store.subscribe();
        assert_eq!(store.fetch_all().unwrap().len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn redeliver_duplicates_an_existing_row() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let id = store.insert("바다").unwrap();
        store.redeliver(&id);
        assert_eq!(rx.try_recv().unwrap().id, id);
        assert_eq!(rx.try_recv().unwrap().id, id);
    }

    #[test]
    fn empty_words_are_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert("   ").is_err());
    }

    #[test]
    fn seed_file_accepts_plain_strings_and_rows() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"["가","나"]"#).unwrap();
        assert_eq!(load_seed_file(f.path()).unwrap(), vec!["가", "나"]);

        let mut g = tempfile::NamedTempFile::new().unwrap();
        write!(
            g,
            r#"[{{"id":"w0","text":"바람","inserted_at":0}}]"#
        )
        .unwrap();
        assert_eq!(load_seed_file(g.path()).unwrap(), vec!["바람"]);
    }
}
