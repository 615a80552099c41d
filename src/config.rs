use crate::error::{AmpError, Result};
use crate::types::UnitId;
use serde::{Deserialize, Serialize};

/// Highest unit id that can be daisy-chained
pub const MAX_UNITS: UnitId = 3;

/// Settings for an [`Amplifier`](crate::Amplifier)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmpConfig {
    /// Unit to address, 1 for the first amplifier in a chain
    pub unit_id: UnitId,

    /// Zone updates buffered per subscriber before it starts lagging
    pub update_capacity: usize,
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            unit_id: 1,
            update_capacity: 100,
        }
    }
}

impl AmpConfig {
    /// Config addressing the given unit, other fields defaulted
    pub fn for_unit(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_UNITS).contains(&self.unit_id) {
            return Err(AmpError::InvalidConfig(format!(
                "unit_id {} is outside 1..={}",
                self.unit_id, MAX_UNITS
            )));
        }
        if self.update_capacity == 0 {
            return Err(AmpError::InvalidConfig(
                "update_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = AmpConfig::default();
        assert_eq!(config.unit_id, 1);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_unit_out_of_range() {
        assert!(matches!(
            AmpConfig::for_unit(0).validate(),
            Err(AmpError::InvalidConfig(_))
        ));
        assert!(AmpConfig::for_unit(4).validate().is_err());
        AmpConfig::for_unit(3).validate().unwrap();
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = AmpConfig {
            update_capacity: 0,
            ..AmpConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: AmpConfig = serde_json::from_str(r#"{ "unit_id": 2 }"#).unwrap();
        assert_eq!(config, AmpConfig::for_unit(2));

        let config: AmpConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AmpConfig::default());
    }
}
