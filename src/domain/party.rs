//! Responsible parties and the directory they are looked up in.
//!
//! A responsible party is an external actor, a traveling buyer or a
//! warehouse, that can fulfil part of a requirement. The registry only
//! needs point lookup by id; the [`Roster`] implementation keeps the whole
//! directory in a `parties.toml` file at the store root.

use std::{fmt, ops::Deref, path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// A validated short code identifying a party ([A-Z0-9]+).
///
/// Codes appear in listings and audit output where the full display name
/// would be too wide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartyCode(NonEmptyString);

impl PartyCode {
    /// Creates a new `PartyCode` from a string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCodeError` if the string is empty or contains
    /// characters other than uppercase letters and digits.
    pub fn new(s: String) -> Result<Self, InvalidCodeError> {
        let non_empty = NonEmptyString::new(s.clone()).map_err(|_| InvalidCodeError(s.clone()))?;

        if !s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(InvalidCodeError(s));
        }

        Ok(Self(non_empty))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<&str> for PartyCode {
    type Error = InvalidCodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl FromStr for PartyCode {
    type Err = InvalidCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl Deref for PartyCode {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl fmt::Display for PartyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PartyCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PartyCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Error returned when a string doesn't match the required pattern [A-Z0-9]+.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid party code '{0}': must be non-empty and contain only A-Z and 0-9")]
pub struct InvalidCodeError(String);

/// A responsible party record as exposed by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// Opaque identifier the party is looked up by.
    pub id: String,
    /// Name shown in listings and audit output.
    pub display_name: String,
    /// Short code for narrow output.
    pub code: PartyCode,
    /// Whether the party is a traveling buyer (as opposed to a warehouse).
    pub is_traveler: bool,
    /// The party's next scheduled trip, used to default estimated arrival
    /// dates on new assignments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_trip: Option<DateTime<Utc>>,
}

/// Point lookup of responsible parties.
///
/// The registry resolves a party exactly once, when an assignment is
/// created; the returned record is snapshotted into the assignment and never
/// re-queried.
pub trait PartyDirectory {
    /// Look up a party by id, returning `None` if it is not known.
    fn get_by_id(&self, id: &str) -> Option<Party>;
}

/// A party directory backed by a `parties.toml` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Roster {
    parties: Vec<Party>,
}

impl Roster {
    /// Builds a roster from an in-memory list of parties.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::DuplicateId` if two parties share an id.
    pub fn from_parties(parties: Vec<Party>) -> Result<Self, RosterError> {
        for (index, party) in parties.iter().enumerate() {
            if parties[..index].iter().any(|other| other.id == party.id) {
                return Err(RosterError::DuplicateId(party.id.clone()));
            }
        }
        Ok(Self { parties })
    }

    /// Loads the roster from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// invalid, or two parties share an id.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let content = std::fs::read_to_string(path)?;
        let roster: Self = toml::from_str(&content)?;
        Self::from_parties(roster.parties)
    }

    /// Saves the roster to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the roster cannot be serialized or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), RosterError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The parties in the roster, in file order.
    #[must_use]
    pub fn parties(&self) -> &[Party] {
        &self.parties
    }
}

impl PartyDirectory for Roster {
    fn get_by_id(&self, id: &str) -> Option<Party> {
        self.parties.iter().find(|party| party.id == id).cloned()
    }
}

/// Errors that can occur when loading or saving a roster.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// Two parties share the same id.
    #[error("duplicate party id '{0}' in roster")]
    DuplicateId(String),
    /// The roster file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The roster file is not valid TOML.
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    /// The roster could not be serialized to TOML.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

/// The serialized versions of the roster file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        parties: Vec<Party>,
    },
}

impl From<Versions> for Roster {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 { parties } => Self { parties },
        }
    }
}

impl From<Roster> for Versions {
    fn from(roster: Roster) -> Self {
        Self::V1 {
            parties: roster.parties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(id: &str, code: &str) -> Party {
        Party {
            id: id.to_string(),
            display_name: format!("Party {id}"),
            code: PartyCode::try_from(code).unwrap(),
            is_traveler: true,
            next_trip: None,
        }
    }

    #[test]
    fn code_rejects_lowercase() {
        assert!(PartyCode::try_from("ana").is_err());
    }

    #[test]
    fn code_rejects_empty() {
        assert!(PartyCode::new(String::new()).is_err());
    }

    #[test]
    fn code_accepts_letters_and_digits() {
        assert_eq!(PartyCode::try_from("ANA1").unwrap().as_str(), "ANA1");
    }

    #[test]
    fn roster_rejects_duplicate_ids() {
        let result = Roster::from_parties(vec![party("p-1", "A"), party("p-1", "B")]);
        assert!(matches!(result, Err(RosterError::DuplicateId(id)) if id == "p-1"));
    }

    #[test]
    fn roster_lookup_by_id() {
        let roster = Roster::from_parties(vec![party("p-1", "A"), party("p-2", "B")]).unwrap();
        assert_eq!(roster.get_by_id("p-2").unwrap().code.as_str(), "B");
        assert!(roster.get_by_id("p-3").is_none());
    }

    #[test]
    fn roster_toml_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("parties.toml");

        let roster = Roster::from_parties(vec![party("p-1", "ANA")]).unwrap();
        roster.save(&path).unwrap();

        let loaded = Roster::load(&path).unwrap();
        assert_eq!(loaded, roster);
    }

    #[test]
    fn roster_load_requires_version_tag() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("parties.toml");
        std::fs::write(&path, "[[parties]]\nid = \"p-1\"\n").unwrap();

        assert!(matches!(Roster::load(&path), Err(RosterError::Parse(_))));
    }

    #[test]
    fn roster_load_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        assert!(matches!(Roster::load(&missing), Err(RosterError::Io(_))));
    }
}
