//! The shared word list and its admission rules
//!
//! The list is append-only. Rows present at the first bulk load form the
//! seed batch, played once; everything admitted later is the tail, looped
//! forever. The split index is fixed the moment the bulk load lands and is
//! never recalculated. Live insert events are deduplicated by id against
//! everything already admitted, and events racing the bulk load are
//! buffered until the load completes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::melody::{PITCH_MAX, PITCH_MIN};
use crate::store::{WordInsert, WordStore};

struct ListState {
    words: Vec<String>,
    initial_count: usize,
    version: u64,
}

/// Shared, versioned word list. Every append bumps the version watch so
/// the scheduler can react.
pub struct SharedWords {
    state: Mutex<ListState>,
    version_tx: watch::Sender<u64>,
}

impl SharedWords {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            state: Mutex::new(ListState {
                words: Vec::new(),
                initial_count: 0,
                version: 0,
            }),
            version_tx,
        }
    }

    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Install the bulk-load result and fix the seed/tail split. Only the
    /// first call has any effect.
    fn load_seed(&self, words: Vec<String>) {
        let mut state = self.state.lock().unwrap();
        if state.initial_count > 0 || !state.words.is_empty() {
            return;
        }
        state.initial_count = words.len();
        state.words = words;
        state.version += 1;
        let v = state.version;
        drop(state);
        let _ = self.version_tx.send(v);
    }

    fn append(&self, word: String) {
        let mut state = self.state.lock().unwrap();
        state.words.push(word);
        state.version += 1;
        let v = state.version;
        drop(state);
        let _ = self.version_tx.send(v);
    }

    pub fn seed_snapshot(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.words[..state.initial_count].to_vec()
    }

    pub fn tail_snapshot(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.words[state.initial_count..].to_vec()
    }

    pub fn all_words(&self) -> Vec<String> {
        self.state.lock().unwrap().words.clone()
    }

    pub fn initial_count(&self) -> usize {
        self.state.lock().unwrap().initial_count
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SharedWords {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-phase admission: phase 1 (bulk load) populates the id set and the
/// seed count atomically; phase 2 replays anything buffered in between,
/// then processes live events. Ids seen twice are dropped.
pub struct Admission {
    processed: HashSet<String>,
    ready: bool,
    buffered: Vec<WordInsert>,
}

impl Admission {
    pub fn new() -> Self {
        Self {
            processed: HashSet::new(),
            ready: false,
            buffered: Vec::new(),
        }
    }

    /// Phase 1: record every seed id, then open the gate. Returns the
    /// events that were buffered while the gate was closed, already
    /// deduplicated, in arrival order.
    pub fn complete_bulk_load<'a, I>(&mut self, seed_ids: I) -> Vec<WordInsert>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in seed_ids {
            self.processed.insert(id.to_string());
        }
        self.ready = true;
        let buffered = std::mem::take(&mut self.buffered);
        buffered
            .into_iter()
            .filter(|ev| self.processed.insert(ev.id.clone()))
            .collect()
    }

    /// Phase 2: admit one live event. `None` while the gate is closed
    /// (buffered) or when the id is a duplicate.
    pub fn admit(&mut self, event: WordInsert) -> Option<WordInsert> {
        if !self.ready {
            self.buffered.push(event);
            return None;
        }
        if self.processed.insert(event.id.clone()) {
            Some(event)
        } else {
            debug!(id = %event.id, "duplicate insert dropped");
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

impl Default for Admission {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed the shared list from a store: subscribe first (so nothing in the
/// fetch window is lost), bulk-load the seed, then admit live inserts
/// forever. A fetch failure leaves the list empty; live inserts still
/// arrive and simply form a zero-seed tail.
pub async fn run_word_intake(store: Arc<dyn WordStore>, words: Arc<SharedWords>) {
    let mut inserts = store.subscribe();
    let mut admission = Admission::new();

    match store.fetch_all() {
        Ok(rows) => {
            info!(count = rows.len(), "seed batch loaded");
            let texts: Vec<String> = rows.iter().map(|r| r.text.clone()).collect();
            words.load_seed(texts);
            for ev in admission.complete_bulk_load(rows.iter().map(|r| r.id.as_str())) {
                words.append(ev.text);
            }
        }
        Err(e) => {
            error!("seed fetch failed, starting empty: {}", e);
            words.load_seed(Vec::new());
            for ev in admission.complete_bulk_load(std::iter::empty()) {
                words.append(ev.text);
            }
        }
    }

    while let Some(ev) = inserts.recv().await {
        if let Some(ev) = admission.admit(ev) {
            debug!(word = %ev.text, "word admitted to tail");
            words.append(ev.text);
        }
    }
}

/// Per-word pitch scalar overrides, set from the control surface. A word
/// without an entry plays at 1.0. Entries never expire.
pub struct PitchOverrides {
    map: Mutex<HashMap<String, f32>>,
}

impl PitchOverrides {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Override for a word, if one was set.
    pub fn get(&self, word: &str) -> Option<f32> {
        self.map.lock().unwrap().get(word).copied()
    }

    /// Effective pitch: the override or the 1.0 default.
    pub fn pitch_of(&self, word: &str) -> f32 {
        self.get(word).unwrap_or(1.0)
    }

    pub fn set(&self, word: &str, pitch: f32) {
        self.map
            .lock()
            .unwrap()
            .insert(word.to_string(), pitch.clamp(PITCH_MIN, PITCH_MAX));
    }

    pub fn reset(&self, word: &str) {
        self.map.lock().unwrap().remove(word);
    }

    /// Pin every listed word back to 1.0.
    pub fn reset_all<S: AsRef<str>>(&self, words: &[S]) {
        let mut map = self.map.lock().unwrap();
        for w in words {
            map.insert(w.as_ref().to_string(), 1.0);
        }
    }

    /// Scatter every listed word across the full pitch range.
    pub fn randomize_all<S: AsRef<str>, R: Rng>(&self, words: &[S], rng: &mut R) {
        let mut map = self.map.lock().unwrap();
        for w in words {
            let pitch = PITCH_MIN + rng.gen::<f32>() * 2.0;
            map.insert(w.as_ref().to_string(), pitch.clamp(PITCH_MIN, PITCH_MAX));
        }
    }
}

impl Default for PitchOverrides {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn ev(id: &str, text: &str) -> WordInsert {
        WordInsert {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn gate_buffers_until_bulk_load_completes() {
        let mut adm = Admission::new();
        assert!(adm.admit(ev("w5", "racer")).is_none());
        assert!(!adm.is_ready());

        let released = adm.complete_bulk_load(["w0", "w1"].into_iter());
        assert_eq!(released, vec![ev("w5", "racer")]);
        assert!(adm.is_ready());
    }

    #[test]
    fn buffered_duplicates_of_seed_rows_are_dropped() {
        let mut adm = Admission::new();
        assert!(adm.admit(ev("w1", "dup")).is_none());
        assert!(adm.admit(ev("w9", "fresh")).is_none());
        let released = adm.complete_bulk_load(["w0", "w1"].into_iter());
        assert_eq!(released, vec![ev("w9", "fresh")]);
    }

    #[test]
    fn live_duplicates_are_dropped() {
        let mut adm = Admission::new();
        adm.complete_bulk_load(["w0"].into_iter());
        assert!(adm.admit(ev("w0", "seed again")).is_none());
        assert!(adm.admit(ev("w1", "new")).is_some());
        assert!(adm.admit(ev("w1", "new again")).is_none());
    }

    #[test]
    fn seed_split_is_fixed_once() {
        let words = SharedWords::new();
        words.load_seed(vec!["가".into(), "나".into(), "다".into()]);
        assert_eq!(words.initial_count(), 3);

        words.append("라".into());
        words.append("마".into());
        assert_eq!(words.initial_count(), 3);
        assert_eq!(words.seed_snapshot(), vec!["가", "나", "다"]);
        assert_eq!(words.tail_snapshot(), vec!["라", "마"]);

        // A second bulk load must not reshuffle the split.
        words.load_seed(vec!["x".into()]);
        assert_eq!(words.initial_count(), 3);
        assert_eq!(words.len(), 5);
    }

    #[test]
    fn version_bumps_on_every_append() {
        let words = SharedWords::new();
        let rx = words.watch_version();
        words.load_seed(vec!["가".into()]);
        words.append("나".into());
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn intake_builds_seed_then_tail() {
        use crate::store::MemoryStore;

        let store = Arc::new(MemoryStore::with_seed(&["가", "나", "다"]));
        let words = Arc::new(SharedWords::new());
        let intake = tokio::spawn(run_word_intake(store.clone(), words.clone()));

        let mut rx = words.watch_version();
        rx.changed().await.unwrap(); // seed loaded
        assert_eq!(words.initial_count(), 3);

        store.insert("라").unwrap();
        store.insert("마").unwrap();
        while words.len() < 5 {
            rx.changed().await.unwrap();
        }
        assert_eq!(words.tail_snapshot(), vec!["라", "마"]);

        // Re-delivery of a seed row must not grow the list.
        store.redeliver("w0");
        tokio::task::yield_now().await;
        assert_eq!(words.len(), 5);

        intake.abort();
    }

    #[test]
    fn overrides_default_clamp_and_randomize() {
        let p = PitchOverrides::new();
        assert_eq!(p.pitch_of("없음"), 1.0);

        p.set("가", 9.0);
        assert_eq!(p.pitch_of("가"), PITCH_MAX);
        p.set("가", 0.1);
        assert_eq!(p.pitch_of("가"), PITCH_MIN);

        p.reset("가");
        assert_eq!(p.get("가"), None);

        let mut rng = SmallRng::seed_from_u64(1);
        p.randomize_all(&["가", "나"], &mut rng);
        for w in ["가", "나"] {
            let v = p.pitch_of(w);
            assert!((PITCH_MIN..=PITCH_MAX).contains(&v));
        }
        p.reset_all(&["가", "나"]);
        assert_eq!(p.pitch_of("가"), 1.0);
        assert_eq!(p.pitch_of("나"), 1.0);
    }
}
