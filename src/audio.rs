//! Real-time audio output using cpal
//!
//! Works with JACK, ALSA, OpenSL ES (Android/Termux), etc. Note events are
//! rendered to short buffers by [`crate::voice`] and streamed through a
//! shared mixer: lead voices are polyphonic, the bass is monophonic, and
//! everything passes through a delay/reverb ambience send into one master
//! gain.
//!
//! The [`AudioEngine`] wrapper owns the lifecycle: it starts uninitialized,
//! becomes ready after an explicit `initialize` (a user action in the
//! original party UI), and can be disposed. Playback before `initialize`
//! is a silent no-op, never an error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use crate::mapping::NoteEvent;
use crate::voice;

/// Linear volume levels for the master bus and the three voice parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volumes {
    pub master: f32,
    pub lead: f32,
    pub bass: f32,
    pub drum: f32,
}

impl Default for Volumes {
    fn default() -> Self {
        Self {
            master: 0.7,
            lead: 0.8,
            bass: 0.6,
            drum: 0.5,
        }
    }
}

impl Volumes {
    fn clamped(self) -> Self {
        Self {
            master: self.master.clamp(0.0, 1.0),
            lead: self.lead.clamp(0.0, 1.0),
            bass: self.bass.clamp(0.0, 1.0),
            drum: self.drum.clamp(0.0, 1.0),
        }
    }
}

/// Which voice a buffer belongs to, for live per-part gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePart {
    Lead,
    Bass,
    Drum,
}

/// Boundary to the tone-generation backend. The production implementation
/// is [`CpalOutput`]; tests substitute a recording sink.
pub trait ToneOutput: Send + Sync {
    /// Fire all applicable voices for one syllable. Returns immediately;
    /// the caller never awaits sound completion.
    fn play_event(&self, event: &NoteEvent);

    /// Apply new volumes live, without re-initialization.
    fn set_volumes(&self, volumes: Volumes);

    /// Push the current tempo into the channel's clock. This only affects
    /// rendered note lengths, never the scheduler's timing.
    fn set_tempo(&self, bpm: u32);
}

struct PlayCommand {
    samples: Vec<f32>,
    part: VoicePart,
}

struct Voice {
    samples: Vec<f32>,
    position: usize,
    part: VoicePart,
    active: bool,
}

/// Feedback delay plus a longer comb acting as a cheap reverb tail,
/// summed back into the dry signal as a send.
struct Ambience {
    delay: Vec<f32>,
    delay_pos: usize,
    reverb: Vec<f32>,
    reverb_pos: usize,
}

const DELAY_FEEDBACK: f32 = 0.3;
const DELAY_WET: f32 = 0.2;
const REVERB_FEEDBACK: f32 = 0.72;
const REVERB_WET: f32 = 0.3;

impl Ambience {
    fn new(sample_rate: u32) -> Self {
        let delay_len = (sample_rate as usize / 4).max(1); // 250 ms slap
        let reverb_len = (sample_rate as usize * 11 / 100).max(1);
        Self {
            delay: vec![0.0; delay_len],
            delay_pos: 0,
            reverb: vec![0.0; reverb_len],
            reverb_pos: 0,
        }
    }

    fn process(&mut self, dry: f32) -> f32 {
        let echoed = self.delay[self.delay_pos];
        self.delay[self.delay_pos] = dry + echoed * DELAY_FEEDBACK;
        self.delay_pos = (self.delay_pos + 1) % self.delay.len();

        let tail = self.reverb[self.reverb_pos];
        self.reverb[self.reverb_pos] = dry + echoed * DELAY_WET + tail * REVERB_FEEDBACK;
        self.reverb_pos = (self.reverb_pos + 1) % self.reverb.len();

        dry + echoed * DELAY_WET + tail * REVERB_WET
    }
}

struct Mixer {
    voices: Vec<Voice>,
    pending: VecDeque<PlayCommand>,
    volumes: Volumes,
    ambience: Ambience,
}

impl Mixer {
    fn push(&mut self, cmd: PlayCommand) {
        // Monophonic bass: a new bass buffer cuts the previous one.
        if cmd.part == VoicePart::Bass {
            for v in &mut self.voices {
                if v.part == VoicePart::Bass {
                    v.active = false;
                }
            }
        }
        self.pending.push_back(cmd);
    }

    fn process_audio<T>(&mut self, output: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        // Promote pending buffers into voices, reusing inactive slots.
        while let Some(cmd) = self.pending.pop_front() {
            let voice = match self.voices.iter_mut().position(|v| !v.active) {
                Some(idx) => &mut self.voices[idx],
                None => {
                    self.voices.push(Voice {
                        samples: Vec::new(),
                        position: 0,
                        part: VoicePart::Lead,
                        active: false,
                    });
                    self.voices.last_mut().unwrap()
                }
            };
            voice.samples = cmd.samples;
            voice.position = 0;
            voice.part = cmd.part;
            voice.active = true;
        }

        for frame in output.chunks_mut(channels) {
            let mut mixed = 0.0f32;

            for voice in &mut self.voices {
                if !voice.active {
                    continue;
                }
                if voice.position >= voice.samples.len() {
                    voice.active = false;
                    continue;
                }
                let gain = match voice.part {
                    VoicePart::Lead => self.volumes.lead,
                    VoicePart::Bass => self.volumes.bass,
                    VoicePart::Drum => self.volumes.drum,
                };
                mixed += voice.samples[voice.position] * gain;
                voice.position += 1;
            }

            let wet = self.ambience.process(mixed);

            // Soft clipping to prevent distortion
            let out = (wet * self.volumes.master).tanh() * 0.8;

            for channel in frame.iter_mut() {
                *channel = T::from_sample(out);
            }
        }
    }
}

/// cpal-backed tone output: renders note buffers and mixes them into the
/// default output device.
pub struct CpalOutput {
    sample_rate: u32,
    bpm: std::sync::atomic::AtomicU32,
    mixer: Arc<Mutex<Mixer>>,
    _stream: cpal::Stream,
}

impl CpalOutput {
    pub fn new(volumes: Volumes) -> Result<Self, Box<dyn std::error::Error>> {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());

        let device = host
            .default_output_device()
            .ok_or("No audio output device found")?;
        info!("Audio device: {}", device.name()?);

        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let mixer = Arc::new(Mutex::new(Mixer {
            voices: Vec::new(),
            pending: VecDeque::new(),
            volumes: volumes.clamped(),
            ambience: Ambience::new(sample_rate),
        }));

        let mixer_clone = mixer.clone();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), mixer_clone, channels)
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), mixer_clone, channels)
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), mixer_clone, channels)
            }
            _ => return Err("Unsupported sample format".into()),
        }?;

        stream.play()?;
        info!("Audio stream started at {} Hz", sample_rate);

        Ok(Self {
            sample_rate,
            bpm: std::sync::atomic::AtomicU32::new(120),
            mixer,
            _stream: stream,
        })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: Arc<Mutex<Mixer>>,
        channels: usize,
    ) -> Result<cpal::Stream, Box<dyn std::error::Error>>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut mixer = mixer.lock().unwrap();
                mixer.process_audio(data, channels);
            },
            |err| warn!("Audio stream error: {}", err),
            None,
        )?;
        Ok(stream)
    }
}

// `cpal::Stream` is marked !Send + !Sync for the sake of platforms like
// Android's AAudio; on the hosts we target (ALSA/JACK) the handle is only
// kept alive here and never accessed across threads after construction.
unsafe impl Send for CpalOutput {}
unsafe impl Sync for CpalOutput {}

impl ToneOutput for CpalOutput {
    fn play_event(&self, event: &NoteEvent) {
        let bpm = self.bpm.load(std::sync::atomic::Ordering::Relaxed);
        let sr = self.sample_rate as f64;

        let lead = voice::render_lead(event.note.frequency(), event.timbre, bpm, sr);
        let mut mixer = self.mixer.lock().unwrap();
        mixer.push(PlayCommand {
            samples: lead,
            part: VoicePart::Lead,
        });
        if event.play_bass {
            mixer.push(PlayCommand {
                samples: voice::render_bass(event.bass_note.frequency(), bpm, sr),
                part: VoicePart::Bass,
            });
        }
        if event.play_percussion {
            mixer.push(PlayCommand {
                samples: voice::render_percussion(sr),
                part: VoicePart::Drum,
            });
        }
    }

    fn set_volumes(&self, volumes: Volumes) {
        self.mixer.lock().unwrap().volumes = volumes.clamped();
    }

    fn set_tempo(&self, bpm: u32) {
        self.bpm.store(bpm, std::sync::atomic::Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Uninitialized,
    Ready,
    Disposed,
}

struct EngineInner {
    state: EngineState,
    output: Option<Arc<dyn ToneOutput>>,
    volumes: Volumes,
}

/// Lifecycle wrapper around a [`ToneOutput`], shared by handle.
///
/// `uninitialized -> ready -> disposed`; volumes are mutable while ready.
/// Initialization failure is recoverable: the engine stays uninitialized
/// and playback degrades to speech-only.
pub struct AudioEngine {
    inner: Mutex<EngineInner>,
}

impl AudioEngine {
    pub fn new(volumes: Volumes) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                state: EngineState::Uninitialized,
                output: None,
                volumes,
            }),
        }
    }

    /// Bring up the cpal backend. Idempotent while ready; an error after
    /// disposal.
    pub fn initialize(&self) -> Result<(), Box<dyn std::error::Error>> {
        let volumes = {
            let inner = self.inner.lock().unwrap();
            match inner.state {
                EngineState::Ready => return Ok(()),
                EngineState::Disposed => return Err("audio engine disposed".into()),
                EngineState::Uninitialized => inner.volumes,
            }
        };
        // Built outside the lock: device setup can block.
        let output = CpalOutput::new(volumes)?;
        self.install(Arc::new(output));
        Ok(())
    }

    /// Install a pre-built backend. Used by tests and by callers that
    /// bring their own output.
    pub fn install(&self, output: Arc<dyn ToneOutput>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == EngineState::Disposed {
            return;
        }
        output.set_volumes(inner.volumes);
        inner.output = Some(output);
        inner.state = EngineState::Ready;
        debug!("audio engine ready");
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().unwrap().state == EngineState::Ready
    }

    pub fn volumes(&self) -> Volumes {
        self.inner.lock().unwrap().volumes
    }

    pub fn set_volumes(&self, volumes: Volumes) {
        let mut inner = self.inner.lock().unwrap();
        inner.volumes = volumes.clamped();
        if let Some(output) = &inner.output {
            output.set_volumes(inner.volumes);
        }
    }

    pub fn set_tempo(&self, bpm: u32) {
        let inner = self.inner.lock().unwrap();
        if let Some(output) = &inner.output {
            output.set_tempo(bpm);
        }
    }

    /// Fire-and-forget. Silently ignored unless the engine is ready.
    pub fn play_event(&self, event: &NoteEvent) {
        let output = {
            let inner = self.inner.lock().unwrap();
            if inner.state != EngineState::Ready {
                return;
            }
            inner.output.clone()
        };
        if let Some(output) = output {
            output.play_event(event);
        }
    }

    pub fn dispose(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.output = None;
        inner.state = EngineState::Disposed;
    }
}
