//! Strongly typed instance names used to partition stored tokens.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("Instance name cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Instance name contains whitespace.")]
	ContainsWhitespace,
	/// The identifier contains characters that are unsafe inside a file name.
	#[error("Instance name contains the reserved character {0:?}.")]
	ReservedCharacter(char),
	/// The identifier exceeded the allowed character count.
	#[error("Instance name exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Name of a configured LMS instance (e.g. `default`, `school-prod`).
///
/// Names double as token file stems, so they reject whitespace, path separators, and a leading
/// dot.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceName(String);
impl InstanceName {
	/// Creates a new instance name after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for InstanceName {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for InstanceName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<InstanceName> for String {
	fn from(value: InstanceName) -> Self {
		value.0
	}
}
impl TryFrom<String> for InstanceName {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for InstanceName {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for InstanceName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Instance({})", self.0)
	}
}
impl Display for InstanceName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for InstanceName {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if let Some(c) = view.chars().find(|c| matches!(c, '/' | '\\' | ':' | '\0')) {
		return Err(IdentifierError::ReservedCharacter(c));
	}
	if view.starts_with('.') {
		return Err(IdentifierError::ReservedCharacter('.'));
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn names_reject_whitespace_and_path_characters() {
		assert!(InstanceName::new(" prod").is_err(), "Leading whitespace must be rejected.");
		assert!(InstanceName::new("").is_err());
		assert_eq!(
			InstanceName::new("../etc"),
			Err(IdentifierError::ReservedCharacter('/')),
			"Path separators must be rejected.",
		);
		assert_eq!(InstanceName::new(".hidden"), Err(IdentifierError::ReservedCharacter('.')));

		let name = InstanceName::new("school-prod").expect("Instance fixture should be valid.");

		assert_eq!(name.as_ref(), "school-prod");
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let name: InstanceName =
			serde_json::from_str("\"default\"").expect("Instance should deserialize.");

		assert_eq!(name.as_ref(), "default");
		assert!(serde_json::from_str::<InstanceName>("\"with space\"").is_err());
	}

	#[test]
	fn length_limit_is_enforced() {
		InstanceName::new("a".repeat(IDENTIFIER_MAX_LEN)).expect("Exact length should succeed.");

		assert!(InstanceName::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}
}
