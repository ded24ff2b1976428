//! Voice rendering with fundsp
//!
//! Each trigger renders a short mono buffer offline (oscillator or noise
//! through an amplitude envelope) which the mixer then streams. Envelope
//! shapes follow the three voices: a pluck-ish lead, a fatter filtered
//! bass, and a brown-noise percussion burst.

use fundsp::hacker32::*;

use crate::mapping::Timbre;

/// Lead note length is an eighth note at the channel tempo; bass holds a
/// quarter, percussion a sixteenth.
pub fn lead_hold_secs(bpm: u32) -> f32 {
    30.0 / Ord::max(bpm, 1) as f32
}

pub fn bass_hold_secs(bpm: u32) -> f32 {
    60.0 / Ord::max(bpm, 1) as f32
}

fn adsr_level(t: f32, attack: f32, decay: f32, sustain: f32, hold: f32, release: f32) -> f32 {
    if t < attack {
        t / attack
    } else if t < attack + decay {
        let k = (t - attack) / decay;
        1.0 + k * (sustain - 1.0)
    } else if t < hold {
        sustain
    } else if t < hold + release {
        sustain * (1.0 - (t - hold) / release)
    } else {
        0.0
    }
}

fn render(mut graph: Box<dyn AudioUnit>, sample_rate: f64, duration: f32) -> Vec<f32> {
    let frames = (sample_rate * duration as f64) as usize;

    graph.reset();
    graph.set_sample_rate(sample_rate);

    let input = [0.0f32; 0];
    let mut output = [0.0f32; 1];
    let mut buffer = Vec::with_capacity(frames);
    for _ in 0..frames {
        graph.tick(&input, &mut output);
        buffer.push(output[0]);
    }
    buffer
}

/// Render one lead note: the syllable's timbre through a 0.1/0.3/0.4/0.8
/// envelope, held for an eighth note at `bpm`.
pub fn render_lead(freq: f32, timbre: Timbre, bpm: u32, sample_rate: f64) -> Vec<f32> {
    let hold = lead_hold_secs(bpm).max(0.15);
    let env = move |t: f32| adsr_level(t, 0.1, 0.3, 0.4, hold, 0.8);

    let graph: Box<dyn AudioUnit> = match timbre {
        Timbre::Sine => Box::new(sine_hz(freq) * envelope(env)),
        Timbre::Sawtooth => Box::new(saw_hz(freq) * envelope(env)),
        Timbre::Square => Box::new(square_hz(freq) * envelope(env)),
        Timbre::Triangle => Box::new(triangle_hz(freq) * envelope(env)),
    };

    render(graph, sample_rate, hold + 0.8)
}

/// Render one bass note: square wave into a resonant lowpass at 300 Hz,
/// longer 0.1/0.3/0.8/1.0 envelope, held for a quarter note.
pub fn render_bass(freq: f32, bpm: u32, sample_rate: f64) -> Vec<f32> {
    let hold = bass_hold_secs(bpm).max(0.25);
    let env = move |t: f32| adsr_level(t, 0.1, 0.3, 0.8, hold, 1.0);

    let graph: Box<dyn AudioUnit> =
        Box::new((square_hz(freq) * envelope(env)) >> lowpass_hz(300.0, 2.0));

    render(graph, sample_rate, hold + 1.0)
}

/// Render one percussion hit: brown noise with a 5 ms attack and 100 ms
/// decay, no sustain.
pub fn render_percussion(sample_rate: f64) -> Vec<f32> {
    let env = move |t: f32| adsr_level(t, 0.005, 0.1, 0.0, 0.105, 0.02);
    let graph: Box<dyn AudioUnit> = Box::new(brown() * envelope(env));
    render(graph, sample_rate, 0.13)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adsr_shape() {
        assert_eq!(adsr_level(0.0, 0.1, 0.3, 0.4, 1.0, 0.8), 0.0);
        assert!((adsr_level(0.1, 0.1, 0.3, 0.4, 1.0, 0.8) - 1.0).abs() < 1e-5);
        assert!((adsr_level(0.4, 0.1, 0.3, 0.4, 1.0, 0.8) - 0.4).abs() < 1e-5);
        assert!((adsr_level(0.7, 0.1, 0.3, 0.4, 1.0, 0.8) - 0.4).abs() < 1e-5);
        assert_eq!(adsr_level(2.0, 0.1, 0.3, 0.4, 1.0, 0.8), 0.0);
    }

    #[test]
    fn hold_lengths_scale_with_tempo() {
        assert_eq!(lead_hold_secs(120), 0.25);
        assert_eq!(bass_hold_secs(120), 0.5);
        assert!(lead_hold_secs(1000) < lead_hold_secs(60));
    }

    #[test]
    fn rendered_buffers_are_nonempty_and_bounded() {
        let lead = render_lead(440.0, Timbre::Sine, 120, 8000.0);
        assert!(!lead.is_empty());
        assert!(lead.iter().all(|s| s.abs() <= 1.01));
        // A sine through a positive envelope must actually produce signal.
        assert!(lead.iter().any(|s| s.abs() > 0.01));

        let bass = render_bass(110.0, 120, 8000.0);
        assert!(!bass.is_empty());

        let perc = render_percussion(8000.0);
        assert!(!perc.is_empty());
        assert!(perc.iter().any(|s| s.abs() > 0.001));
    }
}
