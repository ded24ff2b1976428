//! Engine assembly
//!
//! Wires the word store, tempo controller, melody generator, audio and
//! speech channels into one running party engine, and exposes the control
//! surface the UI binds to. Control changes bump an epoch watch; the
//! scheduler reacts by restarting its loop.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::{AudioEngine, Volumes};
use crate::melody::{MelodyGenerator, MelodyMode};
use crate::scheduler::{play_music, EnableFlags, Scheduler, SchedulerContext, SEED_SPEECH_RATE};
use crate::speech::{SpeechBackend, SpeechChannel};
use crate::store::WordStore;
use crate::tempo::TempoController;
use crate::words::{run_word_intake, PitchOverrides, SharedWords};

/// Startup options for one engine instance.
pub struct EngineConfig {
    pub bpm: u32,
    pub accelerate: bool,
    pub melody_mode: MelodyMode,
    pub melody_enabled: bool,
    pub music_enabled: bool,
    pub speech_enabled: bool,
    pub volumes: Volumes,
    /// Seed for the melody and bass rngs; `None` draws one.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: 60,
            accelerate: false,
            melody_mode: MelodyMode::Major,
            melody_enabled: true,
            music_enabled: true,
            speech_enabled: true,
            volumes: Volumes::default(),
            rng_seed: None,
        }
    }
}

/// The running engine. All mutating methods are the control surface; each
/// one that affects playback bumps the scheduler epoch.
pub struct PartyEngine {
    ctx: Arc<SchedulerContext>,
    store: Arc<dyn WordStore>,
    epoch_tx: watch::Sender<u64>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PartyEngine {
    pub fn new(
        store: Arc<dyn WordStore>,
        speech_backend: Arc<dyn SpeechBackend>,
        config: EngineConfig,
    ) -> Self {
        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let tempo = Arc::new(TempoController::new(config.bpm));
        let mut melody = MelodyGenerator::seeded(config.melody_mode, seed);
        melody.set_enabled(config.melody_enabled);

        let ctx = Arc::new(SchedulerContext {
            words: Arc::new(SharedWords::new()),
            tempo,
            melody: Mutex::new(melody),
            overrides: Arc::new(PitchOverrides::new()),
            audio: Arc::new(AudioEngine::new(config.volumes)),
            speech: Arc::new(SpeechChannel::new(speech_backend)),
            flags: Arc::new(EnableFlags::new(config.music_enabled, config.speech_enabled)),
            bass_rng: Mutex::new(SmallRng::seed_from_u64(seed ^ 0x9e37_79b9)),
        });

        let (epoch_tx, _) = watch::channel(0);
        let (shutdown_tx, _) = watch::channel(false);
        let engine = Self {
            ctx,
            store,
            epoch_tx,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        };
        if config.accelerate {
            engine.ctx.tempo.start_acceleration();
        }
        engine
    }

    /// Shared context, mostly for tests and the CLI status line.
    pub fn context(&self) -> Arc<SchedulerContext> {
        self.ctx.clone()
    }

    /// Spawn the word intake and the playback scheduler. Call once.
    pub fn start(&self) {
        let intake = tokio::spawn(run_word_intake(self.store.clone(), self.ctx.words.clone()));
        let scheduler = Scheduler::new(
            self.ctx.clone(),
            self.epoch_tx.subscribe(),
            self.shutdown_tx.subscribe(),
        );
        // The scheduler owns a spawned playback run, so it is shut down
        // through its watch rather than aborted: aborting the supervisor
        // would detach the run and leave it looping.
        tokio::spawn(scheduler.run());
        self.tasks.lock().unwrap().push(intake);
        info!("party engine started");
    }

    fn bump_epoch(&self) {
        self.epoch_tx.send_modify(|e| *e += 1);
    }

    // --- word list ---

    pub fn submit_word(&self, text: &str) -> Result<String, String> {
        self.store.insert(text)
    }

    pub fn words(&self) -> Vec<String> {
        self.ctx.words.all_words()
    }

    pub fn tail_words(&self) -> Vec<String> {
        self.ctx.words.tail_snapshot()
    }

    // --- tempo ---

    pub fn set_bpm(&self, bpm: u32) {
        self.ctx.tempo.set_target(bpm);
        self.ctx.audio.set_tempo(self.ctx.tempo.effective());
        self.bump_epoch();
    }

    pub fn set_accelerate(&self, on: bool) {
        if on {
            self.ctx.tempo.start_acceleration();
        } else {
            self.ctx.tempo.stop_acceleration();
        }
        self.bump_epoch();
    }

    pub fn effective_bpm(&self) -> u32 {
        self.ctx.tempo.effective()
    }

    // --- melody ---

    pub fn set_melody_mode(&self, mode: MelodyMode) {
        self.ctx.melody.lock().unwrap().set_mode(mode);
        self.bump_epoch();
    }

    pub fn set_melody_enabled(&self, on: bool) {
        self.ctx.melody.lock().unwrap().set_enabled(on);
        self.bump_epoch();
    }

    // --- output channels ---

    /// Bring up the audio backend, in response to a user gesture. Failure
    /// logs and leaves the engine speech-only.
    pub fn start_audio(&self) {
        if let Err(e) = self.ctx.audio.initialize() {
            warn!("audio init failed, continuing speech-only: {}", e);
        }
    }

    pub fn set_music_enabled(&self, on: bool) {
        self.ctx.flags.music.store(on, Ordering::SeqCst);
        self.bump_epoch();
    }

    pub fn set_speech_enabled(&self, on: bool) {
        self.ctx.flags.speech.store(on, Ordering::SeqCst);
        self.bump_epoch();
    }

    pub fn set_volumes(&self, volumes: Volumes) {
        // Volumes apply opportunistically on the next mixed frame; no
        // scheduler restart needed.
        self.ctx.audio.set_volumes(volumes);
    }

    // --- per-word pitch ---

    pub fn set_word_pitch(&self, word: &str, pitch: f32) {
        self.ctx.overrides.set(word, pitch);
        self.bump_epoch();
    }

    pub fn reset_word_pitch(&self, word: &str) {
        self.ctx.overrides.reset(word);
        self.bump_epoch();
    }

    pub fn reset_all_pitches(&self) {
        let tail = self.ctx.words.tail_snapshot();
        self.ctx.overrides.reset_all(&tail);
        self.bump_epoch();
    }

    pub fn randomize_all_pitches(&self) {
        let tail = self.ctx.words.tail_snapshot();
        let mut rng = self.ctx.bass_rng.lock().unwrap();
        self.ctx.overrides.randomize_all(&tail, &mut *rng);
        drop(rng);
        self.bump_epoch();
    }

    // --- previews ---

    /// Preview one word through the combined path at the fixed seed rate.
    pub async fn preview_word(&self, word: &str) {
        let pitch = self.ctx.overrides.pitch_of(word);
        if self.ctx.audio.is_ready() {
            tokio::spawn(play_music(self.ctx.clone(), word.to_string(), pitch));
        }
        self.ctx.speech.speak(word, SEED_SPEECH_RATE, pitch).await;
    }

    /// Music-only preview of the phonetic derivation.
    pub async fn preview_music(&self, word: &str) {
        let pitch = self.ctx.overrides.pitch_of(word);
        play_music(self.ctx.clone(), word.to_string(), pitch).await;
    }

    /// Stop all background tasks. The engine cannot be restarted.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.ctx.audio.dispose();
    }
}

impl Drop for PartyEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
