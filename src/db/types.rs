use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Closed choice-key alphabet for multiple-choice questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "choicekey")]
pub(crate) enum ChoiceKey {
    A,
    B,
    C,
    D,
    E,
}

impl ChoiceKey {
    /// Parses a submitted key; `None` for anything outside A–E.
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "A" | "a" => Some(Self::A),
            "B" | "b" => Some(Self::B),
            "C" | "c" => Some(Self::C),
            "D" | "d" => Some(Self::D),
            "E" | "e" => Some(Self::E),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_closed_alphabet() {
        assert_eq!(ChoiceKey::parse("A"), Some(ChoiceKey::A));
        assert_eq!(ChoiceKey::parse("e"), Some(ChoiceKey::E));
        assert_eq!(ChoiceKey::parse(" c "), Some(ChoiceKey::C));
    }

    #[test]
    fn parse_rejects_foreign_keys() {
        assert_eq!(ChoiceKey::parse("F"), None);
        assert_eq!(ChoiceKey::parse(""), None);
        assert_eq!(ChoiceKey::parse("AB"), None);
        assert_eq!(ChoiceKey::parse("1"), None);
    }
}
