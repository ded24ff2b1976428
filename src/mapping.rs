//! Phonetic slot to musical parameter mapping
//!
//! Each slot class of a decomposed syllable drives one perceptual dimension:
//! the initial consonant picks pitch, the medial vowel picks timbre, the
//! final consonant gates percussion. Bass is the one intentionally random
//! policy, rolled fresh for every character.

use rand::Rng;

use crate::hangul::Decomposition;

/// 12-tone pitch class set, C through B.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Base octave choices, indexed by `(initial / 5) % 4`.
const OCTAVES: [i32; 4] = [3, 4, 5, 6];

/// A concrete pitch: pitch class plus octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub class: usize,
    pub octave: i32,
}

impl Note {
    /// Scientific pitch name, e.g. "C#4".
    pub fn name(&self) -> String {
        format!("{}{}", NOTE_NAMES[self.class], self.octave)
    }

    /// Equal-temperament frequency in Hz (A4 = 440).
    pub fn frequency(&self) -> f32 {
        let midi = (self.octave + 1) * 12 + self.class as i32;
        440.0 * 2.0_f32.powf((midi - 69) as f32 / 12.0)
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lead/bass oscillator shape, picked by the medial vowel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timbre {
    Sine,
    Sawtooth,
    Square,
    Triangle,
}

impl Timbre {
    pub fn from_medial(medial: u32) -> Self {
        match medial % 4 {
            0 => Timbre::Sine,
            1 => Timbre::Sawtooth,
            2 => Timbre::Square,
            _ => Timbre::Triangle,
        }
    }
}

/// Map an initial-consonant slot and a pitch scalar onto a note.
///
/// Pitch class is `initial % 12`; the base octave comes from a 4-entry
/// table indexed by `(initial / 5) % 4`, then gets scaled by the pitch
/// scalar and clamped to octaves 2..=6.
pub fn note_for(initial: u32, pitch_scalar: f32) -> Note {
    let class = (initial % 12) as usize;
    let base = OCTAVES[((initial / 5) % 4) as usize];
    let octave = ((base as f32 * pitch_scalar).round() as i32).clamp(2, 6);
    Note { class, octave }
}

/// Bass follows the lead note an octave-scale below.
pub fn bass_note_for(initial: u32, pitch_scalar: f32) -> Note {
    note_for(initial, pitch_scalar * 0.5)
}

/// Final consonants in every third slot fire the percussion voice.
pub fn percussion_trigger(final_slot: u32) -> bool {
    final_slot > 0 && final_slot % 3 == 0
}

/// Roll the bass voice: fires with probability 0.3, independently per
/// character. The rng is injected so tests can pin the sequence.
pub fn bass_trigger<R: Rng>(rng: &mut R) -> bool {
    rng.gen::<f32>() > 0.7
}

/// Everything one syllable contributes to the audio channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub note: Note,
    pub timbre: Timbre,
    pub bass_note: Note,
    pub play_bass: bool,
    pub play_percussion: bool,
}

/// Derive the full note event for one decomposed syllable.
pub fn event_for<R: Rng>(d: &Decomposition, pitch_scalar: f32, rng: &mut R) -> NoteEvent {
    NoteEvent {
        note: note_for(d.initial, pitch_scalar),
        timbre: Timbre::from_medial(d.medial),
        bass_note: bass_note_for(d.initial, pitch_scalar),
        play_bass: bass_trigger(rng),
        play_percussion: percussion_trigger(d.final_),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hangul::decompose;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn note_for_initial_zero_is_c3() {
        let n = note_for(0, 1.0);
        assert_eq!(n.name(), "C3");
    }

    #[test]
    fn octave_scaling_and_clamping() {
        // initial 0 -> base octave 3
        assert_eq!(note_for(0, 2.5).octave, 6); // round(7.5) clamped down
        assert_eq!(note_for(0, 0.5).octave, 2); // round(1.5) = 2
        // initial 5 -> octave index 1 -> base 4
        assert_eq!(note_for(5, 1.0).octave, 4);
        assert_eq!(note_for(5, 0.4).octave, 2); // round(1.6) clamped up
    }

    #[test]
    fn pitch_class_wraps_mod_12() {
        assert_eq!(note_for(12, 1.0).class, 0);
        assert_eq!(note_for(13, 1.0).class, 1);
        assert_eq!(note_for(18, 1.0).class, 6);
    }

    #[test]
    fn timbre_cycles_through_four_shapes() {
        assert_eq!(Timbre::from_medial(0), Timbre::Sine);
        assert_eq!(Timbre::from_medial(1), Timbre::Sawtooth);
        assert_eq!(Timbre::from_medial(2), Timbre::Square);
        assert_eq!(Timbre::from_medial(3), Timbre::Triangle);
        assert_eq!(Timbre::from_medial(20), Timbre::Sine);
    }

    #[test]
    fn percussion_only_on_nonzero_multiples_of_three() {
        assert!(!percussion_trigger(0));
        assert!(!percussion_trigger(1));
        assert!(percussion_trigger(3));
        assert!(!percussion_trigger(4));
        assert!(percussion_trigger(21));
        assert!(percussion_trigger(27));
    }

    #[test]
    fn bass_trigger_is_reproducible_with_seeded_rng() {
        let mut a = SmallRng::seed_from_u64(7);
        let mut b = SmallRng::seed_from_u64(7);
        let rolls_a: Vec<bool> = (0..32).map(|_| bass_trigger(&mut a)).collect();
        let rolls_b: Vec<bool> = (0..32).map(|_| bass_trigger(&mut b)).collect();
        assert_eq!(rolls_a, rolls_b);
        // With p = 0.3 a 32-roll window essentially always contains both outcomes.
        assert!(rolls_a.iter().any(|&x| x));
        assert!(rolls_a.iter().any(|&x| !x));
    }

    #[test]
    fn gang_event_fires_percussion() {
        let d = decompose('강').unwrap();
        let mut rng = SmallRng::seed_from_u64(0);
        let ev = event_for(&d, 1.0, &mut rng);
        assert_eq!(ev.note.name(), "C3");
        assert_eq!(ev.timbre, Timbre::Sine);
        assert_eq!(ev.bass_note.octave, 2);
        assert!(ev.play_percussion);
    }
}
