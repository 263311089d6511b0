use crate::error::{ModelError, Result};

/// Process-wide scoring weights (§3). All five fields must be positive
/// integers; the setter rejects a partial or zeroing update wholesale
/// rather than applying some fields and not others (§8 boundary behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weights {
    pub cpu: u64,
    pub ram: u64,
    pub bw: u64,
    pub geo: u64,
    pub stream_bonus: u64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cpu: 100,
            ram: 100,
            bw: 100,
            geo: 100,
            stream_bonus: 50,
        }
    }
}

impl Weights {
    /// Construct weights, rejecting the update if any field is zero.
    pub fn new(cpu: u64, ram: u64, bw: u64, geo: u64, stream_bonus: u64) -> Result<Self> {
        let weights = Self {
            cpu,
            ram,
            bw,
            geo,
            stream_bonus,
        };
        if cpu == 0 || ram == 0 || bw == 0 || geo == 0 || stream_bonus == 0 {
            return Err(ModelError::InvalidWeights(weights));
        }
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_argument_is_rejected() {
        assert!(Weights::new(0, 1, 1, 1, 1).is_err());
        assert!(Weights::new(1, 1, 1, 1, 0).is_err());
        assert!(Weights::new(1, 1, 1, 1, 1).is_ok());
    }
}
