//! Locale masks attached to archive entries.

use std::fmt;

/// A locale bitmask
///
/// Languages that a game does not ship typically have their bits set on every
/// entry that isn't [`Locale::DEFAULT`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Locale(pub u32);

impl Locale {
    /// Valid for all languages
    pub const DEFAULT: u32 = 0xFFFF_FFFF;
    /// Bits above the last known language
    pub const UNUSED_FLAGS: u32 = 0xFFFF_E000;
    /// Language bits that are not shipped by any known title
    pub const UNUSED_LANGUAGES: u32 = 0x0000_1D60;

    /// English
    pub const ENGLISH: u32 = 1 << 0;
    /// French
    pub const FRENCH: u32 = 1 << 1;
    /// German
    pub const GERMAN: u32 = 1 << 2;
    /// Italian
    pub const ITALIAN: u32 = 1 << 3;
    /// Spanish
    pub const SPANISH: u32 = 1 << 4;
    /// Japanese
    pub const JAPANESE: u32 = 1 << 5;
    /// Portuguese
    pub const PORTUGUESE: u32 = 1 << 6;
    /// Polish
    pub const POLISH: u32 = 1 << 7;
    /// British English
    pub const ENGLISH_UK: u32 = 1 << 8;
    /// Russian
    pub const RUSSIAN: u32 = 1 << 9;
    /// Czech
    pub const CZECH: u32 = 1 << 10;
    /// Dutch
    pub const DUTCH: u32 = 1 << 11;
    /// Hungarian
    pub const HUNGARIAN: u32 = 1 << 12;

    const NAMES: [(u32, &'static str); 13] = [
        (Self::ENGLISH, "English"),
        (Self::FRENCH, "French"),
        (Self::GERMAN, "German"),
        (Self::ITALIAN, "Italian"),
        (Self::SPANISH, "Spanish"),
        (Self::JAPANESE, "Japanese"),
        (Self::PORTUGUESE, "Portuguese"),
        (Self::POLISH, "Polish"),
        (Self::ENGLISH_UK, "EnglishUK"),
        (Self::RUSSIAN, "Russian"),
        (Self::CZECH, "Czech"),
        (Self::DUTCH, "Dutch"),
        (Self::HUNGARIAN, "Hungarian"),
    ];

    /// Whether the entry applies to every language
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }

    /// Names of the language bits that are set, in bit order
    pub fn languages(&self) -> impl Iterator<Item = &'static str> + '_ {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
    }
}

impl From<u32> for Locale {
    fn from(value: u32) -> Self {
        Locale(value)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            return f.write_str("Default");
        }

        let mut first = true;
        for name in self.languages() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            first = false;
        }

        let unknown = self.0 & Self::UNUSED_FLAGS;
        if unknown != 0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{unknown:#010X}")?;
            first = false;
        }

        if first {
            f.write_str("None")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Locale;

    #[test]
    fn display_default() {
        assert_eq!(Locale(Locale::DEFAULT).to_string(), "Default");
    }

    #[test]
    fn display_languages_and_unknown_bits() {
        let locale = Locale(Locale::ENGLISH | Locale::GERMAN | 0x0001_0000);
        assert_eq!(locale.to_string(), "English, German, 0x00010000");
    }

    #[test]
    fn display_empty_mask() {
        assert_eq!(Locale(0).to_string(), "None");
    }
}
