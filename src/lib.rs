//! # Sori - Hangul Word-Loop Music Engine
//!
//! Sori speaks a shared, growing word list aloud and turns each word into
//! music by decomposing its Hangul syllables: the initial consonant picks
//! the note, the vowel picks the timbre, the final consonant gates
//! percussion. A tempo-driven scheduler loops the user-contributed tail of
//! the list forever, optionally accelerating toward 1000 BPM.
//!
//! ## Core pieces
//!
//! - **Decomposition**: [`hangul::decompose`] splits a syllable into its
//!   three phonetic slots via the syllable-block arithmetic
//! - **Mapping**: [`mapping`] turns slots plus a pitch scalar into note,
//!   timbre, bass, and percussion triggers
//! - **Melody**: [`melody::MelodyGenerator`] supplies a pitch scalar per
//!   played word from scale tables, waves, ramps, or a random draw
//! - **Tempo**: [`tempo::TempoController`] holds the target/effective BPM
//!   pair and the auto-acceleration ramp
//! - **Scheduler**: [`scheduler::Scheduler`] plays the seed batch once,
//!   then loops the tail, restarting cooperatively on every reactive change
//! - **Channels**: [`audio::AudioEngine`] (fundsp voices through a cpal
//!   mixer) and [`speech::SpeechChannel`] (cancellable, timeout-guarded)
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sori::engine::{EngineConfig, PartyEngine};
//! use sori::speech::EspeakSpeech;
//! use sori::store::MemoryStore;
//!
//! # async fn demo() {
//! let store = Arc::new(MemoryStore::with_seed(&["안녕", "세계"]));
//! let engine = PartyEngine::new(store, Arc::new(EspeakSpeech), EngineConfig::default());
//! engine.start_audio();
//! engine.start();
//! engine.submit_word("강").unwrap();
//! # }
//! ```

pub mod audio;
pub mod engine;
pub mod hangul;
pub mod mapping;
pub mod melody;
pub mod scheduler;
pub mod speech;
pub mod store;
pub mod tempo;
pub mod voice;
pub mod words;
