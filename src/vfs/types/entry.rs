/*!
 * VFS Directory Entry
 * A directory listing entry with its attributes and name validation
 */

use super::attributes::FileAttributes;
use super::errors::VfsError;
use serde::{Deserialize, Deserializer, Serialize};

/// Directory entry with type-safe construction and validation
///
/// Entry names must be non-empty, cannot be `.`/`..`, and cannot contain null
/// bytes or path separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    #[serde(deserialize_with = "deserialize_valid_filename")]
    pub name: String,
    pub attributes: FileAttributes,
}

impl Entry {
    /// Create a new directory entry with validation
    #[must_use = "validation result must be checked"]
    pub fn new(name: String, attributes: FileAttributes) -> Result<Self, VfsError> {
        Self::validate_name(&name)?;
        Ok(Self { name, attributes })
    }

    /// Create a new entry without validation (internal use)
    pub(crate) fn new_unchecked(name: String, attributes: FileAttributes) -> Self {
        Self { name, attributes }
    }

    /// Check if this is a directory entry
    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.attributes.is_directory()
    }

    /// Validate entry name
    #[must_use = "validation result must be checked"]
    pub fn validate_name(name: &str) -> Result<(), VfsError> {
        if name.is_empty() {
            return Err(VfsError::InvalidPath("entry name cannot be empty".into()));
        }
        if name == "." || name == ".." {
            return Err(VfsError::InvalidPath(format!(
                "entry name cannot be '{}'",
                name
            )));
        }
        if name.contains('\0') {
            return Err(VfsError::InvalidPath(
                "entry name cannot contain null bytes".into(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(VfsError::InvalidPath(
                "entry name cannot contain path separators".into(),
            ));
        }
        Ok(())
    }

    /// Names refresh and lookup never treat as children
    #[inline]
    #[must_use]
    pub fn is_bad_name(name: &str) -> bool {
        Self::validate_name(name).is_err()
    }
}

/// Deserialize and validate filename
fn deserialize_valid_filename<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Entry::validate_name(&name).map_err(serde::de::Error::custom)?;
    Ok(name)
}
