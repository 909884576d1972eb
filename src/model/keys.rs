// Package model provides cache key construction.

use std::fmt;

use super::Category;

/// Joins a category and an identifier. Never allowed inside either side.
pub const DELIMITER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("identifier {0:?} contains the reserved key delimiter")]
pub struct InvalidIdentifier(pub String);

/// CacheKey identifies one cache entry: a category, optionally scoped to an
/// object within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: Category,
    identifier: Option<String>,
}

impl CacheKey {
    /// Builds a key. An empty identifier means the unscoped entry.
    pub fn new(category: Category, identifier: Option<&str>) -> Result<Self, InvalidIdentifier> {
        let identifier = match identifier {
            None => None,
            Some(id) if id.is_empty() => None,
            Some(id) if id.contains(DELIMITER) => return Err(InvalidIdentifier(id.to_string())),
            Some(id) => Some(id.to_string()),
        };
        Ok(Self { category, identifier })
    }

    /// Unscoped (whole-category) key.
    pub fn unscoped(category: Category) -> Self {
        Self { category, identifier: None }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn is_scoped(&self) -> bool {
        self.identifier.is_some()
    }

    /// Renders the storage key: `category` or `category:identifier`.
    pub fn render(&self) -> String {
        match &self.identifier {
            None => self.category.as_str().to_string(),
            Some(id) => {
                let mut key = String::with_capacity(self.category.as_str().len() + 1 + id.len());
                key.push_str(self.category.as_str());
                key.push(DELIMITER);
                key.push_str(id);
                key
            }
        }
    }

    /// Parses a rendered key back. Returns None for foreign keys.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.split_once(DELIMITER) {
            None => raw.parse::<Category>().ok().map(Self::unscoped),
            Some((category, id)) => {
                let category = category.parse::<Category>().ok()?;
                Self::new(category, Some(id)).ok().filter(|k| k.is_scoped())
            }
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Prefix shared by every scoped key of the category.
pub fn scoped_prefix(category: Category) -> String {
    let mut prefix = category.as_str().to_string();
    prefix.push(DELIMITER);
    prefix
}

/// Checks whether a rendered key belongs to the category (scoped or not).
pub fn belongs_to(raw: &str, category: Category) -> bool {
    let name = category.as_str();
    raw == name
        || (raw.len() > name.len()
            && raw.starts_with(name)
            && raw[name.len()..].starts_with(DELIMITER))
}
