//! Sori CLI - run the word-loop party engine from a terminal

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use sori::engine::{EngineConfig, PartyEngine};
use sori::hangul::decompose;
use sori::mapping::{bass_note_for, note_for, percussion_trigger, Timbre};
use sori::melody::MelodyMode;
use sori::speech::{EspeakSpeech, NullSpeech, SpeechBackend};
use sori::store::{load_seed_file, MemoryStore};

#[derive(Parser)]
#[command(name = "sori")]
#[command(about = "Hangul word-loop music engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the loop; words typed on stdin join the tail live
    Play {
        /// JSON seed file: ["가","나"] or rows with id/text
        #[arg(short, long)]
        seed_file: Option<PathBuf>,

        /// Seed words given inline
        #[arg(short, long)]
        word: Vec<String>,

        /// Target tempo in beats per minute (30-1000)
        #[arg(short, long, default_value = "60")]
        bpm: u32,

        /// Start with the auto-acceleration ramp running
        #[arg(short, long)]
        accelerate: bool,

        /// Melody mode: major, minor, pentatonic, blues, wave,
        /// ascending, descending, random
        #[arg(short, long, default_value = "major")]
        melody: MelodyModeArg,

        /// Disable the melody pitch patterns (everything plays at 1.0)
        #[arg(long)]
        no_melody: bool,

        /// Disable the synthesized music channel
        #[arg(long)]
        no_music: bool,

        /// Disable the speech channel
        #[arg(long)]
        no_speech: bool,

        /// Master volume 0.0-1.0
        #[arg(long, default_value = "0.7")]
        master: f32,
    },

    /// Print the phonetic derivation table for a word
    Map {
        /// The word to decompose
        word: String,

        /// Pitch scalar to map with (0.5-2.5)
        #[arg(short, long, default_value = "1.0")]
        pitch: f32,
    },
}

#[derive(Clone)]
struct MelodyModeArg(MelodyMode);

impl std::str::FromStr for MelodyModeArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MelodyModeArg)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            seed_file,
            word,
            bpm,
            accelerate,
            melody,
            no_melody,
            no_music,
            no_speech,
            master,
        } => {
            let mut seed_words = word;
            if let Some(path) = seed_file {
                seed_words.extend(load_seed_file(&path)?);
            }

            let store = Arc::new(MemoryStore::with_seed(&seed_words));
            let speech: Arc<dyn SpeechBackend> = if no_speech {
                Arc::new(NullSpeech)
            } else {
                Arc::new(EspeakSpeech)
            };

            let config = EngineConfig {
                bpm,
                accelerate,
                melody_mode: melody.0,
                melody_enabled: !no_melody,
                music_enabled: !no_music,
                speech_enabled: !no_speech,
                volumes: sori::audio::Volumes {
                    master,
                    ..Default::default()
                },
                rng_seed: None,
            };

            let engine = PartyEngine::new(store, speech, config);
            if !no_music {
                engine.start_audio();
            }
            engine.start();
            info!(seed = seed_words.len(), bpm, "loop running; type words, ctrl-c to quit");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    line = lines.next_line() => match line? {
                        Some(text) => {
                            let text = text.trim();
                            if text.is_empty() {
                                continue;
                            }
                            match engine.submit_word(text) {
                                Ok(id) => info!(id = %id, word = %text, "submitted"),
                                Err(e) => warn!("rejected: {}", e),
                            }
                        }
                        None => break,
                    },
                }
            }
            engine.shutdown();
        }

        Commands::Map { word, pitch } => {
            let pitch = pitch.clamp(0.5, 2.5);
            println!("{word} @ pitch {pitch}");
            for ch in word.chars() {
                match decompose(ch) {
                    Some(d) => {
                        let note = note_for(d.initial, pitch);
                        let bass = bass_note_for(d.initial, pitch);
                        let timbre = Timbre::from_medial(d.medial);
                        let drum = if percussion_trigger(d.final_) {
                            "drum"
                        } else {
                            "-"
                        };
                        println!(
                            "  {ch}  slots ({}, {}, {})  note {}  timbre {:?}  bass {}  {}",
                            d.initial, d.medial, d.final_, note, timbre, bass, drum
                        );
                    }
                    None => println!("  {ch}  (not a Hangul syllable, spoken only)"),
                }
            }
        }
    }

    Ok(())
}
