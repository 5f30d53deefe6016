use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Which timestamps survive when two wide frames are aligned on their index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Timestamps present in both frames.
    #[default]
    Inner,
    /// Every timestamp of the left frame.
    Left,
    /// Every timestamp of the right frame.
    Right,
    /// Timestamps present in either frame.
    Outer,
}

impl JoinKind {
    pub const ALL: [Self; 4] = [Self::Inner, Self::Left, Self::Right, Self::Outer];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
        }
    }
}

impl Display for JoinKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "outer" => Ok(Self::Outer),
            other => Err(ValidationError::InvalidJoinKind {
                value: other.to_owned(),
            }),
        }
    }
}
