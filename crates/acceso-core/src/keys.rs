//! Canonical storage keys for categories, programs and identities.

use std::fmt;

use serde::Serialize;

use crate::errors::{AppError, AppResult};

/// Sentinel returned by [`normalize`] for absent or blank input.
pub const NO_VALUE: &str = "no_value";
/// Subcategory used by every category that has no programs.
pub const NOT_APPLICABLE: &str = "not_applicable";
/// Identity used when enrollment does not supply a key.
pub const UNSPECIFIED_IDENTITY: &str = "unspecified";

const STUDENT_KEY: &str = "alumno";
const TEACHER_KEY: &str = "profesor";
const WORKER_KEY: &str = "trabajador";

/// Trims, lowercases and joins internal whitespace runs with `_`.
pub fn normalize(text: Option<&str>) -> String {
    let Some(text) = text else {
        return NO_VALUE.to_string();
    };
    let joined = text
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    if joined.is_empty() {
        NO_VALUE.to_string()
    } else {
        joined
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Category {
    Student,
    Teacher,
    Worker,
    Unspecified,
}

impl Category {
    pub fn from_label(label: Option<&str>) -> Self {
        match normalize(label).as_str() {
            STUDENT_KEY | "student" | "alumnos" | "estudiante" => Category::Student,
            TEACHER_KEY | "teacher" | "profesores" => Category::Teacher,
            WORKER_KEY | "worker" | "trabajadores" => Category::Worker,
            _ => Category::Unspecified,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Category::Student => STUDENT_KEY,
            Category::Teacher => TEACHER_KEY,
            Category::Worker => WORKER_KEY,
            Category::Unspecified => NO_VALUE,
        }
    }

    pub fn uses_subcategory(&self) -> bool {
        matches!(self, Category::Student)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.key().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Subcategory(String);

impl Subcategory {
    pub fn for_category(category: &Category, label: Option<&str>) -> AppResult<Self> {
        if !category.uses_subcategory() {
            return Ok(Self(NOT_APPLICABLE.to_string()));
        }
        let key = normalize(label);
        validate_path_segment("subcategory", &key)?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subcategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Missing keys collapse onto [`UNSPECIFIED_IDENTITY`] unless `required`.
    pub fn parse(raw: Option<&str>, required: bool) -> AppResult<Self> {
        let trimmed = raw.map(str::trim).filter(|value| !value.is_empty());
        match trimmed {
            Some(value) => {
                validate_identity(value)?;
                Ok(Self(value.to_string()))
            }
            None if required => Err(AppError::InvalidKey {
                field: "identity",
                value: String::new(),
                message: "an identity key is required".into(),
            }),
            None => Ok(Self(UNSPECIFIED_IDENTITY.to_string())),
        }
    }

    /// Key read back from a store directory or record; not re-validated.
    pub fn from_stored(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category/subcategory pair scanned by one verification call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GalleryScope {
    pub category: Category,
    pub subcategory: Subcategory,
}

impl GalleryScope {
    pub fn from_labels(category: Option<&str>, subcategory: Option<&str>) -> AppResult<Self> {
        let category = Category::from_label(category);
        let subcategory = Subcategory::for_category(&category, subcategory)?;
        Ok(Self {
            category,
            subcategory,
        })
    }

    pub fn identity(&self, identity: IdentityKey) -> IdentityScope {
        IdentityScope {
            gallery: self.clone(),
            identity,
        }
    }
}

impl fmt::Display for GalleryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.subcategory)
    }
}

/// Storage location of a single enrolled identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityScope {
    pub gallery: GalleryScope,
    pub identity: IdentityKey,
}

impl fmt::Display for IdentityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.gallery, self.identity)
    }
}

fn validate_identity(value: &str) -> AppResult<()> {
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
    {
        return Err(AppError::InvalidKey {
            field: "identity",
            value: value.to_string(),
            message: "use ASCII letters, numbers, '-', '_' or '.' only".into(),
        });
    }
    validate_path_segment("identity", value)
}

fn validate_path_segment(field: &'static str, value: &str) -> AppResult<()> {
    let unsafe_segment = value.is_empty()
        || value == "."
        || value.contains("..")
        || value.contains(['/', '\\', '\0']);
    if unsafe_segment {
        return Err(AppError::InvalidKey {
            field,
            value: value.to_string(),
            message: "must be a single path segment".into(),
        });
    }
    Ok(())
}
