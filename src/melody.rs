//! Melody generation over the playback cursor
//!
//! The scheduler asks for one pitch scalar per played word. Most modes are
//! pure functions of the monotonically increasing play index; `random` is
//! the deliberate exception and draws from an injectable rng.

use std::collections::HashMap;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Pitch scalar bounds shared with the per-word override sliders.
pub const PITCH_MIN: f32 = 0.5;
pub const PITCH_MAX: f32 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MelodyMode {
    Random,
    Wave,
    Ascending,
    Descending,
    Major,
    Minor,
    Pentatonic,
    Blues,
}

lazy_static::lazy_static! {
    static ref SCALES: HashMap<MelodyMode, Vec<f32>> = {
        let mut m = HashMap::new();
        m.insert(MelodyMode::Major, vec![1.0, 1.12, 1.26, 1.33, 1.5, 1.68, 1.89, 2.0]);
        m.insert(MelodyMode::Minor, vec![1.0, 1.12, 1.19, 1.33, 1.5, 1.59, 1.78, 2.0]);
        m.insert(MelodyMode::Pentatonic, vec![1.0, 1.12, 1.26, 1.5, 1.68]);
        m.insert(MelodyMode::Blues, vec![1.0, 1.19, 1.33, 1.41, 1.5, 1.78]);
        m
    };
}

impl MelodyMode {
    pub const ALL: [MelodyMode; 8] = [
        MelodyMode::Random,
        MelodyMode::Wave,
        MelodyMode::Ascending,
        MelodyMode::Descending,
        MelodyMode::Major,
        MelodyMode::Minor,
        MelodyMode::Pentatonic,
        MelodyMode::Blues,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MelodyMode::Random => "random",
            MelodyMode::Wave => "wave",
            MelodyMode::Ascending => "ascending",
            MelodyMode::Descending => "descending",
            MelodyMode::Major => "major",
            MelodyMode::Minor => "minor",
            MelodyMode::Pentatonic => "pentatonic",
            MelodyMode::Blues => "blues",
        }
    }
}

impl FromStr for MelodyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MelodyMode::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown melody mode: {s}"))
    }
}

/// Pitch scalar for a given play index, mode, and rng.
///
/// Pure for every mode except `Random`, which draws uniformly from
/// [0.5, 2.0) and ignores the index.
pub fn pitch_for<R: Rng>(play_index: u64, mode: MelodyMode, rng: &mut R) -> f32 {
    match mode {
        MelodyMode::Random => 0.5 + rng.gen::<f32>() * 1.5,
        MelodyMode::Wave => 0.8 + 0.6 * ((play_index as f32) * 0.8).sin(),
        MelodyMode::Ascending => 0.6 + (play_index % 8) as f32 * 0.2,
        MelodyMode::Descending => 1.8 - (play_index % 8) as f32 * 0.2,
        scale => {
            let table = &SCALES[&scale];
            table[(play_index % table.len() as u64) as usize]
        }
    }
}

/// Stateful generator owning the playback cursor.
///
/// The cursor only ever advances; it survives scheduler restarts and is
/// never reset while the engine instance lives.
pub struct MelodyGenerator {
    cursor: u64,
    mode: MelodyMode,
    enabled: bool,
    rng: SmallRng,
}

impl MelodyGenerator {
    /// Construct with a fixed seed so `Random` mode is reproducible; the
    /// engine draws one seed per instance.
    pub fn seeded(mode: MelodyMode, seed: u64) -> Self {
        Self {
            cursor: 0,
            mode,
            enabled: true,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> MelodyMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MelodyMode) {
        self.mode = mode;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Pitch for the current cursor position; the cursor advances whether
    /// or not melody is enabled so re-enabling picks up where the pattern
    /// would have been.
    pub fn next_pitch(&mut self) -> f32 {
        let index = self.cursor;
        self.cursor += 1;
        if !self.enabled {
            return 1.0;
        }
        pitch_for(index, self.mode, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn scale_tables_wrap() {
        let mut r = rng();
        assert_eq!(pitch_for(0, MelodyMode::Major, &mut r), 1.0);
        assert_eq!(pitch_for(7, MelodyMode::Major, &mut r), 2.0);
        assert_eq!(pitch_for(8, MelodyMode::Major, &mut r), 1.0);
        assert_eq!(pitch_for(5, MelodyMode::Pentatonic, &mut r), 1.0);
        assert_eq!(pitch_for(6, MelodyMode::Blues, &mut r), 1.0);
    }

    #[test]
    fn ascending_and_descending_ramp_mod_8() {
        let mut r = rng();
        assert_eq!(pitch_for(0, MelodyMode::Ascending, &mut r), 0.6);
        assert!((pitch_for(7, MelodyMode::Ascending, &mut r) - 2.0).abs() < 1e-6);
        assert_eq!(pitch_for(8, MelodyMode::Ascending, &mut r), 0.6);
        assert_eq!(pitch_for(0, MelodyMode::Descending, &mut r), 1.8);
        assert!((pitch_for(7, MelodyMode::Descending, &mut r) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn wave_follows_the_sine_formula() {
        let mut r = rng();
        for i in 0..32u64 {
            let expected = 0.8 + 0.6 * ((i as f32) * 0.8).sin();
            assert!((pitch_for(i, MelodyMode::Wave, &mut r) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn random_stays_in_range_and_is_seed_reproducible() {
        let mut a = SmallRng::seed_from_u64(3);
        let mut b = SmallRng::seed_from_u64(3);
        for i in 0..100 {
            let x = pitch_for(i, MelodyMode::Random, &mut a);
            let y = pitch_for(i, MelodyMode::Random, &mut b);
            assert_eq!(x, y);
            assert!((0.5..2.0).contains(&x));
        }
    }

    #[test]
    fn disabled_generator_returns_unity_but_still_advances() {
        let mut gen = MelodyGenerator::seeded(MelodyMode::Major, 0);
        gen.set_enabled(false);
        assert_eq!(gen.next_pitch(), 1.0);
        assert_eq!(gen.next_pitch(), 1.0);
        assert_eq!(gen.cursor(), 2);
        gen.set_enabled(true);
        // Cursor kept moving while disabled, so we resume at index 2.
        assert_eq!(gen.next_pitch(), SCALES[&MelodyMode::Major][2]);
    }

    #[test]
    fn mode_parsing_round_trips() {
        for mode in MelodyMode::ALL {
            assert_eq!(mode.name().parse::<MelodyMode>().unwrap(), mode);
        }
        assert!("polka".parse::<MelodyMode>().is_err());
    }
}
