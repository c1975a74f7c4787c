use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How uniqueness violations at the destination are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Raise on any constraint violation.
    Strict,
    /// Omit conflicting rows and count them as duplicates.
    #[default]
    #[serde(alias = "skip")]
    SkipDuplicates,
    /// Overwrite conflicting rows with the mapped columns. Needs a key set.
    Upsert,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Strict => "strict",
            ConflictPolicy::SkipDuplicates => "skip_duplicates",
            ConflictPolicy::Upsert => "upsert",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" | "error" => Ok(ConflictPolicy::Strict),
            "skip" | "skip_duplicates" | "ignore" => Ok(ConflictPolicy::SkipDuplicates),
            "upsert" | "update" => Ok(ConflictPolicy::Upsert),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected strict, skip_duplicates or upsert)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("skip".parse::<ConflictPolicy>(), Ok(ConflictPolicy::SkipDuplicates));
        assert_eq!("Skip-Duplicates".parse::<ConflictPolicy>(), Ok(ConflictPolicy::SkipDuplicates));
        assert_eq!("UPSERT".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Upsert));
        assert_eq!("error".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Strict));
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ConflictPolicy::SkipDuplicates).unwrap();
        assert_eq!(json, "\"skip_duplicates\"");
        let parsed: ConflictPolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(parsed, ConflictPolicy::SkipDuplicates);
    }
}
