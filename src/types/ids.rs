//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Worker identifier: the 1-based ordinal of the fork that created the worker.
///
/// Stable for the worker's lifetime and unique within one coordinator. The OS
/// process id is carried separately on the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(NonZeroU32);

impl WorkerId {
    pub fn new(ordinal: u32) -> Result<Self, &'static str> {
        NonZeroU32::new(ordinal)
            .map(Self)
            .ok_or("WorkerId cannot be zero")
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ordinal: u32 = s.trim().parse().map_err(|_| "WorkerId must be an integer")?;
        Self::new(ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rejected() {
        assert!(WorkerId::new(0).is_err());
        assert_eq!(WorkerId::new(3).unwrap().get(), 3);
    }

    #[test]
    fn test_parse_from_env_value() {
        assert_eq!("7".parse::<WorkerId>().unwrap().get(), 7);
        assert_eq!(" 2\n".parse::<WorkerId>().unwrap().get(), 2);
        assert!("abc".parse::<WorkerId>().is_err());
        assert!("0".parse::<WorkerId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = WorkerId::new(5).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "5");
        let back: WorkerId = serde_json::from_str("5").unwrap();
        assert_eq!(back, id);
    }
}
