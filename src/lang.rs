//! Reply languages supported by the bot. Anything that isn't recognisably English
//! falls back to Russian, matching the audience of the original bot.

use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
pub enum Language {
    #[default]
    #[strum(serialize = "ru")]
    Ru,
    #[strum(serialize = "en")]
    En,
}

impl Language {
    /// Maps a Telegram `language_code` (IETF tag, e.g. `en-US`) onto a reply language.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(code) if code.starts_with("en") => Language::En,
            _ => Language::Ru,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn from_code() {
        assert_eq!(Language::En, Language::from_code(Some("en")));
        assert_eq!(Language::En, Language::from_code(Some("en-US")));
        assert_eq!(Language::Ru, Language::from_code(Some("ru")));
        assert_eq!(Language::Ru, Language::from_code(Some("de")));
        assert_eq!(Language::Ru, Language::from_code(None));
    }

    #[test]
    fn from_str() {
        assert_eq!(Language::Ru, Language::from_str("ru").unwrap());
        assert_eq!(Language::En, Language::from_str("en").unwrap());
        assert!(Language::from_str("fr").is_err());
    }

    #[test]
    fn display() {
        assert_eq!("ru", Language::Ru.to_string());
        assert_eq!("en", Language::En.to_string());
    }
}
