//! Draft domain entity
//!
//! A [`DraftRecord`] is a single pending field mutation recorded offline and
//! waiting to be uploaded. Drafts are identified by the instance they belong
//! to ([`InstanceKey`]) plus the field they change ([`FieldKey`]); re-upserting
//! a draft with the same identity supersedes the previous value
//! (last write wins per field).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Separator used by the textual form of [`InstanceKey`]
const INSTANCE_SEPARATOR: char = '/';

/// Separator used by the textual form of [`FieldKey`]
const FIELD_SEPARATOR: char = '.';

fn require(value: String, name: &'static str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyIdentifier(name));
    }
    if trimmed.contains(INSTANCE_SEPARATOR) || trimmed.contains(FIELD_SEPARATOR) {
        return Err(DomainError::InvalidKey(format!(
            "{name} must not contain '{INSTANCE_SEPARATOR}' or '{FIELD_SEPARATOR}': {trimmed}"
        )));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// InstanceKey
// ============================================================================

/// Composite identity of one logical record group
///
/// An instance is the (data set, period, organisation unit, attribute option
/// combination) tuple that a batch of field values belongs to.
///
/// The textual form is `data_set/period/org_unit/attribute_option_combo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    data_set: String,
    period: String,
    org_unit: String,
    attribute_option_combo: String,
}

impl InstanceKey {
    /// Creates a new instance key, rejecting empty components
    ///
    /// # Errors
    /// Returns `DomainError::EmptyIdentifier` if any component is blank and
    /// `DomainError::InvalidKey` if a component contains a key separator.
    pub fn new(
        data_set: impl Into<String>,
        period: impl Into<String>,
        org_unit: impl Into<String>,
        attribute_option_combo: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            data_set: require(data_set.into(), "data_set")?,
            period: require(period.into(), "period")?,
            org_unit: require(org_unit.into(), "org_unit")?,
            attribute_option_combo: require(
                attribute_option_combo.into(),
                "attribute_option_combo",
            )?,
        })
    }

    pub fn data_set(&self) -> &str {
        &self.data_set
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn org_unit(&self) -> &str {
        &self.org_unit
    }

    pub fn attribute_option_combo(&self) -> &str {
        &self.attribute_option_combo
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.data_set,
            self.period,
            self.org_unit,
            self.attribute_option_combo,
            sep = INSTANCE_SEPARATOR
        )
    }
}

impl FromStr for InstanceKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(INSTANCE_SEPARATOR).collect();
        match parts.as_slice() {
            [ds, pe, ou, aoc] => Self::new(*ds, *pe, *ou, *aoc),
            _ => Err(DomainError::InvalidKey(format!(
                "expected data_set/period/org_unit/attribute_option_combo, got '{s}'"
            ))),
        }
    }
}

// ============================================================================
// FieldKey
// ============================================================================

/// Identity of a single field within an instance
///
/// The textual form is `data_element.category_option_combo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    data_element: String,
    category_option_combo: String,
}

impl FieldKey {
    /// Creates a new field key, rejecting empty components
    pub fn new(
        data_element: impl Into<String>,
        category_option_combo: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            data_element: require(data_element.into(), "data_element")?,
            category_option_combo: require(
                category_option_combo.into(),
                "category_option_combo",
            )?,
        })
    }

    pub fn data_element(&self) -> &str {
        &self.data_element
    }

    pub fn category_option_combo(&self) -> &str {
        &self.category_option_combo
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.data_element, FIELD_SEPARATOR, self.category_option_combo
        )
    }
}

impl FromStr for FieldKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(FIELD_SEPARATOR) {
            Some((de, coc)) => Self::new(de, coc),
            None => Err(DomainError::InvalidKey(format!(
                "expected data_element.category_option_combo, got '{s}'"
            ))),
        }
    }
}

// ============================================================================
// DraftIdentity
// ============================================================================

/// Full identity of a draft: the owning instance plus the field
///
/// Two drafts with the same identity are the same logical mutation; the
/// newer one supersedes the older.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DraftIdentity {
    pub instance: InstanceKey,
    pub field: FieldKey,
}

impl Display for DraftIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.instance, self.field)
    }
}

// ============================================================================
// DraftRecord
// ============================================================================

/// A single pending mutation awaiting upload
///
/// Drafts are immutable once created. Changing a value means upserting a
/// new draft with the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    instance: InstanceKey,
    field: FieldKey,
    value: String,
    last_updated: DateTime<Utc>,
}

impl DraftRecord {
    /// Creates a draft stamped with the current time
    pub fn new(instance: InstanceKey, field: FieldKey, value: impl Into<String>) -> Self {
        Self::with_timestamp(instance, field, value, Utc::now())
    }

    /// Creates a draft with an explicit last-modified timestamp
    pub fn with_timestamp(
        instance: InstanceKey,
        field: FieldKey,
        value: impl Into<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            instance,
            field,
            value: value.into(),
            last_updated,
        }
    }

    pub fn instance(&self) -> &InstanceKey {
        &self.instance
    }

    pub fn field(&self) -> &FieldKey {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Returns the identity used for supersession and deletion
    pub fn identity(&self) -> DraftIdentity {
        DraftIdentity {
            instance: self.instance.clone(),
            field: self.field.clone(),
        }
    }

    /// Returns true if this draft belongs to the given instance
    pub fn belongs_to(&self, instance: &InstanceKey) -> bool {
        &self.instance == instance
    }
}
