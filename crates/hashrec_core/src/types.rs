//! Small enums shared across the crate.

use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// What `get` does with records whose digest does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Keep the record, mark it corrupt and hide its non-id values.
    #[default]
    Flag,
    /// Leave the record out of the result.
    Skip,
    /// Return the stored values as if the record were valid.
    Ignore,
}

impl FromStr for CorruptionPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flag" => Ok(Self::Flag),
            "skip" => Ok(Self::Skip),
            "ignore" => Ok(Self::Ignore),
            other => Err(CoreError::InvalidPolicy {
                policy: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CorruptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flag => "flag",
            Self::Skip => "skip",
            Self::Ignore => "ignore",
        })
    }
}

/// What happens to a referencing record when its target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignKeyAction {
    /// Delete the referencing record too.
    Cascade,
    /// Refuse to delete the target.
    Restrict,
}

impl ForeignKeyAction {
    /// Returns the stored name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cascade => "cascade",
            Self::Restrict => "restrict",
        }
    }

    /// Parses a stored action name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cascade" => Some(Self::Cascade),
            "restrict" => Some(Self::Restrict),
            _ => None,
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a fetched record passed its digest check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStatus {
    /// Digest verified, or the record was built locally.
    #[default]
    Valid,
    /// Digest missing or mismatched.
    Corrupt,
}

/// Lifecycle of a [`Record`](crate::Record).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Id-only handle used to address a stored record.
    Placeholder,
    /// Built with an automatic id that has not been assigned yet.
    Unbound,
    /// Has an id but has not been written.
    Bound,
    /// Written to, or read from, the store.
    Persisted,
    /// Removed from the store.
    Deleted,
}

/// Which logical databases `reset` flushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    /// Every logical database; failures on individual databases are ignored.
    All,
    /// Only the listed databases.
    Databases(Vec<u32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parsing() {
        assert_eq!("flag".parse::<CorruptionPolicy>().unwrap(), CorruptionPolicy::Flag);
        assert_eq!("skip".parse::<CorruptionPolicy>().unwrap(), CorruptionPolicy::Skip);
        assert_eq!(
            "ignore".parse::<CorruptionPolicy>().unwrap(),
            CorruptionPolicy::Ignore
        );
        assert!(matches!(
            "drop".parse::<CorruptionPolicy>(),
            Err(CoreError::InvalidPolicy { policy }) if policy == "drop"
        ));
        assert_eq!(CorruptionPolicy::default().to_string(), "flag");
    }

    #[test]
    fn action_names() {
        assert_eq!(ForeignKeyAction::parse("cascade"), Some(ForeignKeyAction::Cascade));
        assert_eq!(ForeignKeyAction::parse("restrict"), Some(ForeignKeyAction::Restrict));
        assert_eq!(ForeignKeyAction::parse("nullify"), None);
        assert_eq!(ForeignKeyAction::Restrict.to_string(), "restrict");
    }
}
