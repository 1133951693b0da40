//! What happens to an entry's slot once it is marked complete.

use std::fmt;
use std::str::FromStr;

/// Tombstone retention, chosen once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// The entry's whole cluster is deleted on removal.
    DiscardOnRemove,
    /// A tombstone replaces the entry and is swept the next time the queue
    /// is loaded for an addition or a re-surface.
    #[default]
    TombstoneUntilNextLoad,
    /// Tombstones stay until explicitly cleared.
    TombstonePermanent,
}

impl RetentionPolicy {
    pub fn keeps_tombstones(&self) -> bool {
        !matches!(self, Self::DiscardOnRemove)
    }

    pub fn clears_on_load(&self) -> bool {
        matches!(self, Self::TombstoneUntilNextLoad)
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscardOnRemove => write!(f, "discard"),
            Self::TombstoneUntilNextLoad => write!(f, "until-next-load"),
            Self::TombstonePermanent => write!(f, "permanent"),
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discard" | "discard-on-remove" => Ok(Self::DiscardOnRemove),
            "until-next-load" | "tombstone-until-next-load" => Ok(Self::TombstoneUntilNextLoad),
            "permanent" | "tombstone-permanent" => Ok(Self::TombstonePermanent),
            other => Err(format!(
                "unknown tombstone policy '{}' (expected discard, until-next-load or permanent)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_names() {
        assert_eq!(
            "discard".parse::<RetentionPolicy>(),
            Ok(RetentionPolicy::DiscardOnRemove)
        );
        assert_eq!(
            " Until-Next-Load ".parse::<RetentionPolicy>(),
            Ok(RetentionPolicy::TombstoneUntilNextLoad)
        );
        assert_eq!(
            "tombstone-permanent".parse::<RetentionPolicy>(),
            Ok(RetentionPolicy::TombstonePermanent)
        );
        assert!("forever".parse::<RetentionPolicy>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for policy in [
            RetentionPolicy::DiscardOnRemove,
            RetentionPolicy::TombstoneUntilNextLoad,
            RetentionPolicy::TombstonePermanent,
        ] {
            assert_eq!(policy.to_string().parse::<RetentionPolicy>(), Ok(policy));
        }
    }

    #[test]
    fn test_policy_flags() {
        assert!(!RetentionPolicy::DiscardOnRemove.keeps_tombstones());
        assert!(RetentionPolicy::TombstoneUntilNextLoad.keeps_tombstones());
        assert!(RetentionPolicy::TombstoneUntilNextLoad.clears_on_load());
        assert!(RetentionPolicy::TombstonePermanent.keeps_tombstones());
        assert!(!RetentionPolicy::TombstonePermanent.clears_on_load());
    }
}
