use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Matches the bounded `VARCHAR(20)` storage column.
pub const MAX_ENTITY_CODE_LEN: usize = 20;

/// Identifier of a cross-sectional unit, such as a security ticker.
///
/// Case is preserved; surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityCode(String);

impl EntityCode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyEntityCode);
        }

        let len = trimmed.chars().count();
        if len > MAX_ENTITY_CODE_LEN {
            return Err(ValidationError::EntityCodeTooLong {
                len,
                max: MAX_ENTITY_CODE_LEN,
            });
        }

        if let Some(index) = trimmed.chars().position(char::is_control) {
            return Err(ValidationError::EntityCodeControlChar { index });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for EntityCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for EntityCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityCode> for String {
    fn from(value: EntityCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_case_and_trims() {
        let code = EntityCode::parse("  000001.sz ").expect("must parse");
        assert_eq!(code.as_str(), "000001.sz");
    }

    #[test]
    fn rejects_empty_and_oversized_codes() {
        assert_eq!(EntityCode::parse("   "), Err(ValidationError::EmptyEntityCode));

        let long = "X".repeat(MAX_ENTITY_CODE_LEN + 1);
        assert!(matches!(
            EntityCode::parse(&long),
            Err(ValidationError::EntityCodeTooLong { .. })
        ));
    }

    #[test]
    fn rejects_control_characters() {
        let err = EntityCode::parse("AB\u{0007}C").expect_err("must fail");
        assert_eq!(err, ValidationError::EntityCodeControlChar { index: 2 });
    }
}
