//! Declarative per-entity metadata.
//!
//! Each record kind is described by a static [`EntityDescriptor`] naming its
//! settable columns and which of them are protected from bulk update, stored
//! as JSON documents, hidden from serialization, or uniqueness-checked at the
//! handler level. One generic algorithm (see [`crate::record`]) consumes these
//! tables instead of duplicating CRUD logic per entity.

use crate::error::CoreError;

/// Bookkeeping columns every entity carries in addition to its own.
pub const BOOKKEEPING: &[&str] = &["id", "timestamp", "modify_timestamp"];

/// Static description of one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Entity name used in error messages and logs.
    pub entity: &'static str,
    /// SQL table name.
    pub table: &'static str,
    /// Settable, persisted attribute names (bookkeeping columns excluded).
    pub columns: &'static [&'static str],
    /// Columns a generic update must never touch.
    pub protected: &'static [&'static str],
    /// TEXT columns whose stored value is a serialized JSON document.
    pub json_encoded: &'static [&'static str],
    /// Columns excluded from serialized output.
    pub hidden: &'static [&'static str],
    /// Columns whose values must not duplicate across rows.
    pub unique: &'static [&'static str],
}

impl EntityDescriptor {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(&name) || BOOKKEEPING.contains(&name)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(&name)
    }

    pub fn is_json_encoded(&self, name: &str) -> bool {
        self.json_encoded.contains(&name)
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.contains(&name)
    }

    /// Startup consistency check: every configured name must resolve to a
    /// known column, and a protected column cannot also be JSON-encoded
    /// (a generic update would never be able to rewrite it consistently).
    pub fn validate(&self) -> Result<(), CoreError> {
        let lists = [self.protected, self.json_encoded, self.hidden, self.unique];

        for name in lists.iter().flat_map(|l| l.iter()) {
            if !self.has_column(name) {
                return Err(CoreError::UnknownColumn {
                    entity: self.entity.to_string(),
                    column: name.to_string(),
                });
            }
        }

        for name in self.json_encoded {
            if self.is_protected(name) {
                return Err(CoreError::ProtectedJsonColumn {
                    entity: self.entity.to_string(),
                    column: name.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: EntityDescriptor = EntityDescriptor {
        entity: "sample",
        table: "sample",
        columns: &["code", "notes", "tags"],
        protected: &["id", "code", "timestamp", "modify_timestamp"],
        json_encoded: &["tags"],
        hidden: &[],
        unique: &["code"],
    };

    #[test]
    fn valid_descriptor_passes() {
        GOOD.validate().unwrap();
    }

    #[test]
    fn unknown_column_is_rejected() {
        let bad = EntityDescriptor {
            protected: &["id", "no_such_column"],
            ..GOOD
        };
        assert!(matches!(
            bad.validate(),
            Err(CoreError::UnknownColumn { column, .. }) if column == "no_such_column"
        ));
    }

    #[test]
    fn protected_json_column_is_rejected() {
        let bad = EntityDescriptor {
            protected: &["id", "tags"],
            ..GOOD
        };
        assert!(matches!(
            bad.validate(),
            Err(CoreError::ProtectedJsonColumn { column, .. }) if column == "tags"
        ));
    }

    #[test]
    fn bookkeeping_columns_are_known() {
        assert!(GOOD.has_column("modify_timestamp"));
        assert!(!GOOD.has_column("address"));
    }
}
