use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// How a write resolves a collision on `(timestamp, entity_code, metric_name)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Overwrite the stored value.
    #[default]
    Update,
    /// Keep the stored row unchanged.
    Ignore,
    /// Abort the whole write.
    Error,
}

impl ConflictPolicy {
    pub const ALL: [Self; 3] = [Self::Update, Self::Ignore, Self::Error];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Ignore => "ignore",
            Self::Error => "error",
        }
    }
}

impl Display for ConflictPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(Self::Update),
            "ignore" => Ok(Self::Ignore),
            "error" => Ok(Self::Error),
            other => Err(ValidationError::InvalidConflictPolicy {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_policies_round_trip() {
        for policy in ConflictPolicy::ALL {
            let parsed = policy.as_str().parse::<ConflictPolicy>().expect("must parse");
            assert_eq!(parsed, policy);
        }
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::Update);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = "replace".parse::<ConflictPolicy>().expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidConflictPolicy { .. }));
    }
}
