//! Presence palette and per-session color choice.
//!
//! Colors end up inside inline `style` attributes, so every token is
//! validated against a narrow CSS grammar before it is accepted.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Colors offered to sessions when no palette is configured.
pub const DEFAULT_PALETTE: [&str; 5] = ["#FFC0CB", "#FFD700", "#98FB98", "#87CEFA", "#FFA07A"];

/// A CSS color token safe to splice into a style declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PresenceColor(String);

impl PresenceColor {
    /// Parse and validate a color token.
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        let token = token.trim();
        if is_css_color(token) {
            Ok(Self(token.to_string()))
        } else {
            Err(ConfigError::InvalidColor(token.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PresenceColor {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PresenceColor> for String {
    fn from(color: PresenceColor) -> Self {
        color.0
    }
}

impl fmt::Display for PresenceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `token` is a hex color, a numeric color function or a keyword.
pub fn is_css_color(token: &str) -> bool {
    if let Some(hex) = token.strip_prefix('#') {
        return matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(open) = token.find('(') {
        let name = &token[..open];
        let Some(args) = token[open + 1..].strip_suffix(')') else {
            return false;
        };
        return matches!(name, "rgb" | "rgba" | "hsl" | "hsla")
            && !args.trim().is_empty()
            && args
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '%' | ' ' | '/' | '-'));
    }
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic())
}

/// Fixed, non-empty set of colors sessions choose from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<PresenceColor>,
}

impl Palette {
    pub fn new(colors: Vec<PresenceColor>) -> Result<Self, ConfigError> {
        if colors.is_empty() {
            return Err(ConfigError::EmptyPalette);
        }
        Ok(Self { colors })
    }

    /// Build a palette from raw tokens, rejecting any invalid one.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, ConfigError> {
        let colors = tokens
            .iter()
            .map(|t| PresenceColor::parse(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(colors)
    }

    pub fn colors(&self) -> &[PresenceColor] {
        &self.colors
    }

    /// Uniform pick. No attempt is made to avoid colors other sessions hold.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> PresenceColor {
        self.colors
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| self.colors[0].clone())
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE
                .iter()
                .map(|c| PresenceColor(c.to_string()))
                .collect(),
        }
    }
}

/// The local session's presence attributes, fixed for the page's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPresence {
    color: PresenceColor,
}

impl SessionPresence {
    /// Choose once from `palette` using the thread RNG.
    pub fn random(palette: &Palette) -> Self {
        Self::choose_from(palette, &mut rand::thread_rng())
    }

    pub fn choose_from<R: Rng + ?Sized>(palette: &Palette, rng: &mut R) -> Self {
        let color = palette.choose(rng);
        log::debug!("Session presence color {}", color);
        Self { color }
    }

    /// Fixed color, for tests and embedders.
    pub fn with_color(color: PresenceColor) -> Self {
        Self { color }
    }

    pub fn color(&self) -> &PresenceColor {
        &self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_default_palette() {
        let palette = Palette::default();
        let tokens: Vec<&str> = palette.colors().iter().map(|c| c.as_str()).collect();
        assert_eq!(tokens, DEFAULT_PALETTE);
    }

    #[test]
    fn test_color_validation() {
        for ok in ["#FFF", "#ffc0cb", "#FFC0CB80", "rgb(1, 2, 3)", "hsla(120, 50%, 50%, 0.3)", "teal"] {
            assert!(PresenceColor::parse(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in [
            "",
            "#GGG",
            "#12345",
            "red; background: url(x)",
            "rgb(1,2,3);",
            "expression(alert(1))",
            "url(evil)",
        ] {
            assert!(PresenceColor::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_empty_palette_rejected() {
        assert_eq!(Palette::new(vec![]), Err(ConfigError::EmptyPalette));
        let empty: [&str; 0] = [];
        assert_eq!(Palette::from_tokens(&empty), Err(ConfigError::EmptyPalette));
    }

    #[test]
    fn test_choice_comes_from_palette() {
        let palette = Palette::default();
        for _ in 0..50 {
            let presence = SessionPresence::random(&palette);
            assert!(palette.colors().contains(presence.color()));
        }
    }

    #[test]
    fn test_deterministic_choice() {
        let palette = Palette::from_tokens(&["#000", "#111"]).unwrap();
        let mut rng = StepRng::new(0, 0);
        let a = SessionPresence::choose_from(&palette, &mut rng);
        let b = SessionPresence::choose_from(&palette, &mut rng);
        assert_eq!(a, b);
    }

    #[test]
    fn test_color_deserialize_validates() {
        let ok: PresenceColor = serde_json::from_str("\"#FFD700\"").unwrap();
        assert_eq!(ok.as_str(), "#FFD700");
        assert!(serde_json::from_str::<PresenceColor>("\"red;x:y\"").is_err());
    }
}
