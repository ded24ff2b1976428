//! Playback scheduler
//!
//! One cooperative timeline: Idle -> PlayingSeed (once) -> LoopingTail
//! (forever). A supervisor owns the current run; whenever a reactive
//! dependency changes (word-list version or the control epoch) it signals
//! the run's liveness flag, cancels pending speech, waits for the run to
//! exit, and starts a fresh one. Runs check the flag after every await, so
//! the word in flight finishes and nothing overlaps.
//!
//! The seed-played flag is monotonic: once the seed batch has been played
//! it is never replayed, no matter how many restarts follow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::SmallRng;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

use crate::audio::AudioEngine;
use crate::hangul::decompose;
use crate::mapping::event_for;
use crate::melody::MelodyGenerator;
use crate::speech::SpeechChannel;
use crate::tempo::{interval_for, TempoController};
use crate::words::{PitchOverrides, SharedWords};

/// Seed words always play at this fixed rate/tempo.
pub const SEED_SPEECH_RATE: f32 = 0.8;
pub const SEED_BPM: u32 = 60;

/// Spacing between the syllables of one word on the music path.
pub const CHAR_GAP: Duration = Duration::from_millis(100);

/// Output enable switches, flipped live from the control surface.
pub struct EnableFlags {
    pub music: AtomicBool,
    pub speech: AtomicBool,
}

impl EnableFlags {
    pub fn new(music: bool, speech: bool) -> Self {
        Self {
            music: AtomicBool::new(music),
            speech: AtomicBool::new(speech),
        }
    }
}

/// Everything a playback run needs, shared by handle.
pub struct SchedulerContext {
    pub words: Arc<SharedWords>,
    pub tempo: Arc<TempoController>,
    pub melody: Mutex<MelodyGenerator>,
    pub overrides: Arc<PitchOverrides>,
    pub audio: Arc<AudioEngine>,
    pub speech: Arc<SpeechChannel>,
    pub flags: Arc<EnableFlags>,
    /// Bass-trigger rolls come from here so tests can seed them.
    pub bass_rng: Mutex<SmallRng>,
}

impl SchedulerContext {
    /// Extreme-mode speech rate: 0.2x at rest, 5x at the bpm ceiling.
    pub fn speech_rate_for(bpm: u32) -> f32 {
        (0.2 + bpm as f32 / 100.0).min(5.0)
    }
}

pub struct Scheduler {
    ctx: Arc<SchedulerContext>,
    epoch_rx: watch::Receiver<u64>,
    shutdown_rx: watch::Receiver<bool>,
    seed_played: Arc<AtomicBool>,
}

impl Scheduler {
    /// `epoch_rx` carries control-surface changes (tempo target,
    /// acceleration toggle, enable flags, melody mode); word-list changes
    /// arrive through the list's own version watch. `shutdown_rx` ends the
    /// supervisor itself, after it has torn down the current run.
    pub fn new(
        ctx: Arc<SchedulerContext>,
        epoch_rx: watch::Receiver<u64>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            epoch_rx,
            shutdown_rx,
            seed_played: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drive playback until shutdown is signalled. The supervisor must not
    /// be aborted directly: the run it spawned would be left looping with
    /// its liveness flag still set.
    pub async fn run(mut self) {
        let mut words_rx = self.ctx.words.watch_version();

        loop {
            let alive = Arc::new(AtomicBool::new(true));
            let wake = Arc::new(Notify::new());
            let run = PlaybackRun {
                ctx: self.ctx.clone(),
                alive: alive.clone(),
                wake: wake.clone(),
                seed_played: self.seed_played.clone(),
            };
            let handle = tokio::spawn(run.run());

            // Wait for any reactive dependency to move.
            let mut stopping = false;
            tokio::select! {
                _ = words_rx.changed() => debug!("word list changed, restarting loop"),
                _ = self.epoch_rx.changed() => debug!("controls changed, restarting loop"),
                _ = self.shutdown_rx.changed() => {
                    debug!("shutdown, stopping playback");
                    stopping = true;
                }
            }

            // Cooperative teardown: let the in-flight word finish, cancel
            // pending speech, and wait for the old run to exit before the
            // next one starts.
            alive.store(false, Ordering::SeqCst);
            // notify_one stores a permit, so a run that has not reached its
            // park point yet still wakes and observes the dead flag.
            wake.notify_one();
            self.ctx.speech.cancel().await;
            let _ = handle.await;

            if stopping {
                return;
            }
        }
    }
}

struct PlaybackRun {
    ctx: Arc<SchedulerContext>,
    alive: Arc<AtomicBool>,
    wake: Arc<Notify>,
    seed_played: Arc<AtomicBool>,
}

impl PlaybackRun {
    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn run(self) {
        if !self.seed_played.load(Ordering::SeqCst) {
            self.play_seed().await;
        }
        self.loop_tail().await;
    }

    /// Play the seed batch once, at fixed rate and tempo.
    async fn play_seed(&self) {
        if self.ctx.words.is_empty() {
            // Bulk load has not landed; the flag stays unset so the seed
            // still plays after the restart the load will trigger.
            return;
        }
        let seed = self.ctx.words.seed_snapshot();
        if !seed.is_empty() {
            info!(count = seed.len(), "playing seed batch");
        }
        for word in &seed {
            if !self.alive() {
                return;
            }
            self.play_word(word, SEED_SPEECH_RATE, 1.0).await;
            if !self.alive() {
                return;
            }
            tokio::time::sleep(interval_for(SEED_BPM)).await;
        }
        if self.alive() {
            self.seed_played.store(true, Ordering::SeqCst);
            debug!("seed batch complete");
        }
    }

    /// Loop the tail forever. With an empty tail the run parks until the
    /// supervisor wakes it for teardown.
    async fn loop_tail(&self) {
        loop {
            if !self.alive() {
                return;
            }
            let tail = self.ctx.words.tail_snapshot();
            if tail.is_empty() {
                self.wake.notified().await;
                continue;
            }

            for word in &tail {
                if !self.alive() {
                    return;
                }
                // Effective tempo is read fresh per word so ramp steps
                // land within one word of latency.
                let bpm = self.ctx.tempo.effective();
                self.ctx.audio.set_tempo(bpm);
                let rate = SchedulerContext::speech_rate_for(bpm);
                let pitch = {
                    let melody_pitch = self.ctx.melody.lock().unwrap().next_pitch();
                    self.ctx.overrides.get(word).unwrap_or(melody_pitch)
                };
                debug!(word = %word, bpm, rate, pitch, "tail word");
                self.play_word(word, rate, pitch).await;
                if !self.alive() {
                    return;
                }
                tokio::time::sleep(interval_for(bpm)).await;
            }

            if !self.alive() {
                return;
            }
            // Breather between passes.
            tokio::time::sleep(interval_for(self.ctx.tempo.effective()) * 2).await;
        }
    }

    /// The combined path: speech is awaited (it paces the loop), music is
    /// fired per syllable on its own task and never awaited or retracted.
    async fn play_word(&self, word: &str, rate: f32, pitch: f32) {
        if self.ctx.flags.music.load(Ordering::SeqCst) && self.ctx.audio.is_ready() {
            tokio::spawn(play_music(self.ctx.clone(), word.to_string(), pitch));
        }
        if self.ctx.flags.speech.load(Ordering::SeqCst) {
            self.ctx.speech.speak(word, rate, pitch).await;
        }
    }
}

/// Walk the word's characters, mapping each decomposable syllable onto a
/// note event. Non-Hangul characters contribute nothing here but were
/// already spoken as part of the word.
pub async fn play_music(ctx: Arc<SchedulerContext>, word: String, pitch: f32) {
    let chars: Vec<char> = word.chars().collect();
    for (i, ch) in chars.iter().enumerate() {
        if let Some(d) = decompose(*ch) {
            let event = {
                let mut rng = ctx.bass_rng.lock().unwrap();
                event_for(&d, pitch, &mut *rng)
            };
            ctx.audio.play_event(&event);
        }
        if i + 1 < chars.len() {
            tokio::time::sleep(CHAR_GAP).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_rate_tracks_bpm_with_a_ceiling() {
        assert!((SchedulerContext::speech_rate_for(60) - 0.8).abs() < 1e-6);
        assert!((SchedulerContext::speech_rate_for(100) - 1.2).abs() < 1e-6);
        assert_eq!(SchedulerContext::speech_rate_for(1000), 5.0);
        assert_eq!(SchedulerContext::speech_rate_for(100_000), 5.0);
    }
}
