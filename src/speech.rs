//! Speech output channel
//!
//! Wraps a platform speech backend with the safety the loop needs: at most
//! one in-flight utterance, explicit cancellation before each new one, a
//! 3-second completion timeout, and the rule that no speech failure ever
//! reaches the scheduler.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// Hard cap on how long one utterance may hold up the loop.
pub const SPEECH_TIMEOUT: Duration = Duration::from_secs(3);

/// One request to the speech engine. Rate is accepted in [0.2, 5.0] and
/// pitch in [0.5, 2.5]; backends map these onto whatever their engine
/// understands.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: &str, rate: f32, pitch: f32) -> Self {
        Self {
            text: text.to_string(),
            lang: "ko-KR".to_string(),
            rate,
            pitch,
            volume: 0.9,
        }
    }
}

/// Boundary to the platform speech engine.
///
/// `start` begins speaking and returns a receiver that resolves when the
/// utterance ends, for whatever reason. The backend watches `cancel` and
/// stops early when it fires (or when the sender is dropped). Backends
/// must never panic the caller: failure to speak resolves the receiver.
pub trait SpeechBackend: Send + Sync {
    fn start(&self, utterance: Utterance, cancel: oneshot::Receiver<()>) -> oneshot::Receiver<()>;
}

/// Speech backend that resolves immediately without sound. Used when
/// speech is unsupported on the host.
pub struct NullSpeech;

impl SpeechBackend for NullSpeech {
    fn start(&self, _utterance: Utterance, _cancel: oneshot::Receiver<()>) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(());
        done_rx
    }
}

/// Speech backend shelling out to `espeak`. Cancellation kills the child
/// process; spawn failures are logged and treated as completion.
pub struct EspeakSpeech;

impl EspeakSpeech {
    /// espeak speaks in words per minute; 1.0x maps to its default 175.
    fn wpm(rate: f32) -> u32 {
        (175.0 * rate.clamp(0.2, 5.0)).round() as u32
    }

    /// espeak pitch runs 0..99 with 50 as neutral.
    fn pitch_steps(pitch: f32) -> u32 {
        ((pitch.clamp(0.5, 2.5) * 50.0).round() as u32).min(99)
    }

    /// espeak amplitude runs 0..200 with 100 as neutral.
    fn amplitude(volume: f32) -> u32 {
        ((volume.clamp(0.0, 1.0) * 200.0).round() as u32).min(200)
    }
}

impl SpeechBackend for EspeakSpeech {
    fn start(&self, utterance: Utterance, cancel: oneshot::Receiver<()>) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let voice = utterance.lang.split('-').next().unwrap_or("ko").to_string();
            let child = tokio::process::Command::new("espeak")
                .arg("-v")
                .arg(voice)
                .arg("-s")
                .arg(Self::wpm(utterance.rate).to_string())
                .arg("-p")
                .arg(Self::pitch_steps(utterance.pitch).to_string())
                .arg("-a")
                .arg(Self::amplitude(utterance.volume).to_string())
                .arg(&utterance.text)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();

            let mut child = match child {
                Ok(c) => c,
                Err(e) => {
                    warn!("speech engine unavailable, skipping: {}", e);
                    let _ = done_tx.send(());
                    return;
                }
            };

            tokio::select! {
                status = child.wait() => {
                    if let Err(e) = status {
                        warn!("speech process error, skipping: {}", e);
                    }
                }
                _ = cancel => {
                    debug!("utterance cancelled: {}", utterance.text);
                    let _ = child.kill().await;
                }
            }
            let _ = done_tx.send(());
        });

        done_rx
    }
}

/// The channel the scheduler talks to. Holds the cancel handle of the
/// in-flight utterance so a new `speak` (or a teardown) can cut it off.
pub struct SpeechChannel {
    backend: Arc<dyn SpeechBackend>,
    in_flight: Mutex<Option<oneshot::Sender<()>>>,
}

impl SpeechChannel {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(None),
        }
    }

    /// Speak one word. Resolves when the backend reports completion, on
    /// any backend error, or after [`SPEECH_TIMEOUT`], whichever comes
    /// first. Never returns an error to the loop.
    pub async fn speak(&self, text: &str, rate: f32, pitch: f32) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut slot = self.in_flight.lock().await;
            if let Some(prev) = slot.take() {
                let _ = prev.send(());
            }
            *slot = Some(cancel_tx);
        }

        let done = self
            .backend
            .start(Utterance::new(text, rate, pitch), cancel_rx);

        match tokio::time::timeout(SPEECH_TIMEOUT, done).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("speech backend dropped completion: {}", text),
            Err(_) => debug!("speech timeout, moving on: {}", text),
        }
    }

    /// Cancel whatever is speaking right now. Called on scheduler
    /// teardown.
    pub async fn cancel(&self) {
        if let Some(prev) = self.in_flight.lock().await.take() {
            let _ = prev.send(());
        }
    }
}
