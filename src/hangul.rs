//! Hangul syllable decomposition
//!
//! Every precomposed Hangul syllable (U+AC00..U+D7A3) encodes its three
//! phonetic slots arithmetically: `offset = initial * 588 + medial * 28 + final`.
//! Characters outside the block carry no musical information and decompose
//! to `None`; the playback path still speaks them as part of their word.

/// First code point of the precomposed syllable block (가).
pub const SYLLABLE_BASE: u32 = 0xAC00;

/// Number of precomposed syllables: 19 initials * 21 medials * 28 finals.
pub const SYLLABLE_COUNT: u32 = 11_172;

/// The three phonetic slots of one syllable.
///
/// `initial` is in 0..19, `medial` in 0..21, `final_` in 0..28 where 0
/// means "no final consonant".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposition {
    pub initial: u32,
    pub medial: u32,
    pub final_: u32,
}

impl Decomposition {
    /// Offset of this decomposition relative to the block start.
    pub fn offset(&self) -> u32 {
        self.initial * 588 + self.medial * 28 + self.final_
    }
}

/// Decompose a single character into its phonetic slots.
///
/// Returns `None` for anything outside the syllable block (Latin, digits,
/// punctuation, jamo, other scripts).
pub fn decompose(ch: char) -> Option<Decomposition> {
    let code = (ch as u32).checked_sub(SYLLABLE_BASE)?;
    if code >= SYLLABLE_COUNT {
        return None;
    }

    Some(Decomposition {
        initial: code / 588,
        medial: (code % 588) / 28,
        final_: code % 28,
    })
}
