//! Data model definitions for the pet catalog.
//!
//! This module defines the structures that move between the storage layer,
//! the editor session, and the presentation layer: [`Locator`] (an opaque row
//! reference), [`PetRecord`] (the persisted field map), [`Pet`] (a loaded
//! row), [`Gender`], and [`FieldSet`] (the per-session staging area bound to
//! the editor form).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// An opaque reference to exactly one stored pet row.
///
/// Locators are assigned by the store on insert, starting at 1, and are never
/// reused. A locator is immutable for the lifetime of the row it names.
/// "No locator" is modeled as `Option<Locator>`; across the FFI boundary the
/// raw integer `0` stands for the absent case.
///
/// # Examples
///
/// ```no_run
/// use pet_editor_core::pet_model::Locator;
///
/// // 0 means "no existing record" (create mode)
/// assert!(Locator::from_raw(0).is_none());
/// assert!(Locator::from_raw(7).is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(u64);

impl Locator {
    /// Builds a locator from a raw row id. Returns `None` for the reserved
    /// id `0`, which callers use to request create mode.
    pub fn from_raw(id: u64) -> Option<Locator> {
        if id == 0 { None } else { Some(Locator(id)) }
    }

    /// The raw row id behind this locator. Never 0.
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) const fn new(id: u64) -> Locator {
        Locator(id)
    }

    /// Big-endian key bytes, so locator order matches key order on disk.
    pub(crate) fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gender of a pet as shown in the editor form.
///
/// Persisted as its raw integer value. Any unrecognized stored integer maps
/// back to [`Gender::Unknown`] rather than failing the load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Gender {
    /// Maps a stored integer to a gender, defaulting anything unrecognized
    /// to [`Gender::Unknown`].
    pub fn from_stored(raw: u8) -> Gender {
        match raw {
            1 => Gender::Male,
            2 => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    /// The integer value written to the store.
    pub fn as_stored(self) -> u8 {
        match self {
            Gender::Unknown => 0,
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

impl Serialize for Gender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_stored())
    }
}

impl<'de> Deserialize<'de> for Gender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(u8::try_from(raw).map_or(Gender::Unknown, Gender::from_stored))
    }
}

/// The persisted field map for one pet row.
///
/// This is exactly what `insert` and `update` write and what a stored row
/// deserializes to. Gender is kept as its raw integer here; the typed
/// [`Gender`] enum only appears once a row has been loaded into a [`Pet`].
///
/// # Examples
///
/// ```no_run
/// use pet_editor_core::pet_model::PetRecord;
///
/// let record = PetRecord {
///     name: "Max".to_string(),
///     breed: "Labrador".to_string(),
///     gender: 1,
///     weight: 22,
/// };
/// let json = serde_json::to_string(&record).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetRecord {
    /// Display name, may be empty.
    pub name: String,
    /// Breed description, may be empty.
    pub breed: String,
    /// Raw gender integer: 0 unknown, 1 male, 2 female.
    pub gender: u8,
    /// Weight in whole units, never negative.
    pub weight: u32,
}

/// One pet row as loaded from the store: identity plus typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pet {
    pub locator: Locator,
    pub name: String,
    pub breed: String,
    pub gender: Gender,
    pub weight: u32,
}

impl Pet {
    pub(crate) fn from_record(locator: Locator, record: PetRecord) -> Pet {
        Pet {
            locator,
            name: record.name,
            breed: record.breed,
            gender: Gender::from_stored(record.gender),
            weight: record.weight,
        }
    }
}

/// The mutable staging area for one edit session.
///
/// A `FieldSet` mirrors the editor form: name, breed, and weight are the raw
/// text the user sees, gender is the current spinner selection. Weight stays
/// text until save time, when it is parsed by [`parse_weight`]; the form
/// shows whatever the user typed, not a normalized number.
///
/// A fresh `FieldSet` starts with every field at its default. In edit mode
/// the loader fills it in once the row arrives; in create mode it is left
/// untouched until the user types something.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub breed: String,
    #[serde(default)]
    pub gender: Gender,
    /// Weight as entered in the form. Empty text means "not filled in".
    #[serde(default)]
    pub weight: String,
}

impl FieldSet {
    /// True when every field still holds its default: empty name and breed,
    /// empty weight text, gender unknown. An untouched new-record form must
    /// not create a row on save.
    pub fn is_untouched(&self) -> bool {
        self.name.trim().is_empty()
            && self.breed.trim().is_empty()
            && self.weight.trim().is_empty()
            && self.gender == Gender::Unknown
    }

    /// Copies a loaded row into the form fields.
    pub fn apply(&mut self, pet: &Pet) {
        self.name = pet.name.clone();
        self.breed = pet.breed.clone();
        self.gender = pet.gender;
        self.weight = pet.weight.to_string();
    }
}

/// Parses weight text from the form.
///
/// Empty or whitespace-only text is the one value that defaults to 0; any
/// other text must be a valid non-negative integer. Returns `None` for text
/// that cannot be accepted, which fails the save attempt instead of being
/// silently coerced.
///
/// # Examples
///
/// ```no_run
/// use pet_editor_core::pet_model::parse_weight;
///
/// assert_eq!(parse_weight(""), Some(0));
/// assert_eq!(parse_weight(" 15 "), Some(15));
/// assert_eq!(parse_weight("abc"), None);
/// assert_eq!(parse_weight("-3"), None);
/// ```
pub fn parse_weight(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    trimmed.parse::<u32>().ok()
}
