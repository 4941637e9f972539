use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// One cell of the adjacency matrix.
///
/// Only [`Relation::Placeholder`] is eligible to be overwritten by a suggestion;
/// every other value, [`Relation::Empty`] included, is committed data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Relation {
    #[serde(rename = ".")]
    Empty,
    #[serde(rename = "p")]
    Placeholder,
    #[serde(rename = "o")]
    Diagonal,
    #[serde(rename = "<")]
    DependsOn,
    #[serde(rename = ">")]
    DependedOnBy,
    #[serde(rename = "x")]
    Mutual,
    #[serde(rename = "d")]
    Documentation,
    #[serde(rename = "s")]
    SemanticWeak,
    #[serde(rename = "S")]
    SemanticStrong,
    #[serde(rename = "n")]
    VerifiedNone,
}

impl Relation {
    pub const ALL: [Self; 10] = [
        Self::Empty,
        Self::Placeholder,
        Self::Diagonal,
        Self::DependsOn,
        Self::DependedOnBy,
        Self::Mutual,
        Self::Documentation,
        Self::SemanticWeak,
        Self::SemanticStrong,
        Self::VerifiedNone,
    ];

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Empty => '.',
            Self::Placeholder => 'p',
            Self::Diagonal => 'o',
            Self::DependsOn => '<',
            Self::DependedOnBy => '>',
            Self::Mutual => 'x',
            Self::Documentation => 'd',
            Self::SemanticWeak => 's',
            Self::SemanticStrong => 'S',
            Self::VerifiedNone => 'n',
        }
    }

    #[must_use]
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '.' => Some(Self::Empty),
            'p' => Some(Self::Placeholder),
            'o' => Some(Self::Diagonal),
            '<' => Some(Self::DependsOn),
            '>' => Some(Self::DependedOnBy),
            'x' => Some(Self::Mutual),
            'd' => Some(Self::Documentation),
            's' => Some(Self::SemanticWeak),
            'S' => Some(Self::SemanticStrong),
            'n' => Some(Self::VerifiedNone),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Placeholder => "placeholder",
            Self::Diagonal => "diagonal",
            Self::DependsOn => "depends_on",
            Self::DependedOnBy => "depended_on_by",
            Self::Mutual => "mutual",
            Self::Documentation => "documentation",
            Self::SemanticWeak => "semantic_weak",
            Self::SemanticStrong => "semantic_strong",
            Self::VerifiedNone => "verified_none",
        }
    }

    /// Accepts either the single-character form or the snake-case name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut chars = value.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            return Self::from_char(ch);
        }
        Self::ALL.into_iter().find(|relation| relation.as_str() == value)
    }

    /// Committed cells are never overwritten by suggestions.
    #[must_use]
    pub fn is_committed(self) -> bool {
        !matches!(self, Self::Placeholder | Self::Diagonal)
    }

    /// Whether the cell projects to an edge in exports.
    #[must_use]
    pub fn is_edge(self) -> bool {
        !matches!(self, Self::Empty | Self::Placeholder | Self::Diagonal)
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
