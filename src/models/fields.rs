//! Resident field vocabulary and ordered field sets.

use super::VoterStatus;
use crate::{Error, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A field of the resident schema.
///
/// The store is schemaless; this enum is the closed vocabulary the registry
/// accepts from callers and fills in on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResidentField {
    /// Given name.
    FirstName,
    /// Middle name.
    MiddleName,
    /// Family name.
    LastName,
    /// Nickname or alias.
    Alias,
    /// Place of birth.
    Birthplace,
    /// Date of birth.
    Birthdate,
    /// Age in years.
    Age,
    /// Civil status.
    CivilStatus,
    /// Gender.
    Gender,
    /// Subdivision of residence.
    Purok,
    /// Voter registration status.
    VotersStatus,
    /// Sector classification (senior, PWD, ...).
    IdentifiedAs,
    /// Email address.
    Email,
    /// Phone number.
    ContactNumber,
    /// Occupation.
    Occupation,
    /// Citizenship.
    Citizenship,
    /// Street address.
    Address,
    /// Household number.
    HouseholdNo,
    /// Voting precinct number.
    PrecinctNo,
    /// Opaque path owned by the file-storage collaborator.
    ProfileImage,
}

impl ResidentField {
    /// Returns all schema fields in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::FirstName,
            Self::MiddleName,
            Self::LastName,
            Self::Alias,
            Self::Birthplace,
            Self::Birthdate,
            Self::Age,
            Self::CivilStatus,
            Self::Gender,
            Self::Purok,
            Self::VotersStatus,
            Self::IdentifiedAs,
            Self::Email,
            Self::ContactNumber,
            Self::Occupation,
            Self::Citizenship,
            Self::Address,
            Self::HouseholdNo,
            Self::PrecinctNo,
            Self::ProfileImage,
        ]
    }

    /// Returns the hash field name used in the store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::MiddleName => "middleName",
            Self::LastName => "lastName",
            Self::Alias => "alias",
            Self::Birthplace => "birthplace",
            Self::Birthdate => "birthdate",
            Self::Age => "age",
            Self::CivilStatus => "civilStatus",
            Self::Gender => "gender",
            Self::Purok => "purok",
            Self::VotersStatus => "votersStatus",
            Self::IdentifiedAs => "identifiedAs",
            Self::Email => "email",
            Self::ContactNumber => "contactNumber",
            Self::Occupation => "occupation",
            Self::Citizenship => "citizenship",
            Self::Address => "address",
            Self::HouseholdNo => "householdNo",
            Self::PrecinctNo => "precinctNo",
            Self::ProfileImage => "profileImage",
        }
    }

    /// Parses a field name, ignoring ASCII case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|field| field.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ResidentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of field assignments supplied by a caller.
///
/// Order of insertion is the order fields are written to the store. Setting a
/// field twice overwrites the earlier value in its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    entries: Vec<(ResidentField, String)>,
}

impl FieldSet {
    /// Creates an empty field set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder form of [`FieldSet::set`].
    #[must_use]
    pub fn with(mut self, field: ResidentField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Assigns a value to a field.
    pub fn set(&mut self, field: ResidentField, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    /// Parses a `key=value` assignment as used on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the assignment has no `=` or names
    /// an unknown field.
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::InvalidInput(format!("expected key=value, got: {assignment}")))?;
        let field = ResidentField::parse(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown resident field: {name}")))?;
        self.set(field, value);
        Ok(())
    }

    /// Returns the value assigned to a field, if any.
    #[must_use]
    pub fn get(&self, field: ResidentField) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the field is assigned.
    #[must_use]
    pub fn contains(&self, field: ResidentField) -> bool {
        self.get(field).is_some()
    }

    /// Iterates assignments in caller order.
    pub fn iter(&self) -> impl Iterator<Item = (ResidentField, &str)> {
        self.entries.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// Number of assigned fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no fields are assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalizes values at the repository boundary.
    ///
    /// Trims every value and rewrites `votersStatus` to its canonical form so
    /// no later comparison depends on caller casing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a non-empty, unrecognised voter
    /// status.
    pub fn normalize(mut self) -> Result<Self> {
        for (field, value) in &mut self.entries {
            let trimmed = value.trim();
            if *field == ResidentField::VotersStatus && !trimmed.is_empty() {
                let status = VoterStatus::parse(trimmed).ok_or_else(|| {
                    Error::InvalidInput(format!("unrecognised voter status: {trimmed}"))
                })?;
                *value = status.as_str().to_string();
            } else if trimmed.len() != value.len() {
                *value = trimmed.to_string();
            }
        }
        Ok(self)
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, value) in &self.entries {
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}

struct FieldSetVisitor;

impl<'de> Visitor<'de> for FieldSetVisitor {
    type Value = FieldSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of resident field names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<FieldSet, A::Error> {
        let mut set = FieldSet::new();
        while let Some(name) = access.next_key::<String>()? {
            let field = ResidentField::parse(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown resident field: {name}"))
            })?;
            // Nulls are "not provided"; scalars are stored as their string form.
            let value = match access.next_value::<serde_json::Value>()? {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "field {name} must be a scalar, got {other}"
                    )));
                },
            };
            set.set(field, value);
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FieldSetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_roundtrip() {
        for field in ResidentField::all() {
            assert_eq!(ResidentField::parse(field.as_str()), Some(*field));
        }
        assert_eq!(ResidentField::all().len(), 20);
        assert_eq!(
            ResidentField::parse("VOTERSSTATUS"),
            Some(ResidentField::VotersStatus)
        );
        assert_eq!(ResidentField::parse("nickname"), None);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let set = FieldSet::new()
            .with(ResidentField::LastName, "Dela Cruz")
            .with(ResidentField::FirstName, "Juan")
            .with(ResidentField::LastName, "Santos");

        let order: Vec<_> = set.iter().collect();
        assert_eq!(
            order,
            vec![
                (ResidentField::LastName, "Santos"),
                (ResidentField::FirstName, "Juan"),
            ]
        );
    }

    #[test]
    fn test_deserialize_preserves_caller_order() {
        let json = r#"{"purok":"3","firstName":"Ana","age":34,"email":null}"#;
        let set: FieldSet = serde_json::from_str(json).unwrap();

        let names: Vec<_> = set.iter().map(|(f, _)| f).collect();
        assert_eq!(
            names,
            vec![
                ResidentField::Purok,
                ResidentField::FirstName,
                ResidentField::Age
            ]
        );
        assert_eq!(set.get(ResidentField::Age), Some("34"));
        assert!(!set.contains(ResidentField::Email));
    }

    #[test]
    fn test_deserialize_rejects_unknown_field() {
        let result: std::result::Result<FieldSet, _> = serde_json::from_str(r#"{"nickname":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_canonicalizes_voter_status() {
        let set = FieldSet::new()
            .with(ResidentField::VotersStatus, " Registered ")
            .with(ResidentField::Purok, " 2 ")
            .normalize()
            .unwrap();

        assert_eq!(set.get(ResidentField::VotersStatus), Some("registered"));
        assert_eq!(set.get(ResidentField::Purok), Some("2"));
    }

    #[test]
    fn test_normalize_rejects_unknown_voter_status() {
        let err = FieldSet::new()
            .with(ResidentField::VotersStatus, "pending")
            .normalize()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_normalize_keeps_empty_voter_status() {
        let set = FieldSet::new()
            .with(ResidentField::VotersStatus, "")
            .normalize()
            .unwrap();
        assert_eq!(set.get(ResidentField::VotersStatus), Some(""));
    }

    #[test]
    fn test_parse_assignment() {
        let mut set = FieldSet::new();
        set.parse_assignment("firstName=Juan").unwrap();
        set.parse_assignment("address=12 Rizal St. = corner").unwrap();
        assert_eq!(set.get(ResidentField::FirstName), Some("Juan"));
        assert_eq!(
            set.get(ResidentField::Address),
            Some("12 Rizal St. = corner")
        );
        assert!(set.parse_assignment("no-equals").is_err());
        assert!(set.parse_assignment("shoeSize=9").is_err());
    }
}
