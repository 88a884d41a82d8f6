use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::{Error, Result};

/// Priority rank of the source that produced an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Primary,
    Secondary,
    Fallback,
}

impl SourceTier {
    pub fn source_name(&self) -> &'static str {
        match self {
            SourceTier::Primary => "stellar",
            SourceTier::Secondary => "csv",
            SourceTier::Fallback => "hardcoded",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Primary => "primary",
            SourceTier::Secondary => "secondary",
            SourceTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price observation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PricePointRecord")]
pub struct PricePoint {
    value: f64,
    timestamp: DateTime<Utc>,
    source_tier: SourceTier,
    volume: Option<f64>,
}

impl PricePoint {
    pub fn new(
        value: f64,
        timestamp: DateTime<Utc>,
        source_tier: SourceTier,
        volume: Option<f64>,
    ) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Validation(format!("price must be positive, got {}", value)));
        }
        if let Some(v) = volume {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::Validation(format!("volume must be non-negative, got {}", v)));
            }
        }

        Ok(PricePoint { value, timestamp, source_tier, volume })
    }

    pub fn now(value: f64, source_tier: SourceTier, volume: Option<f64>) -> Result<Self> {
        Self::new(value, Utc::now(), source_tier, volume)
    }

    /// `value` must already be finite and positive.
    pub(crate) fn from_checked(value: f64, source_tier: SourceTier) -> Self {
        debug_assert!(value.is_finite() && value > 0.0);
        PricePoint { value, timestamp: Utc::now(), source_tier, volume: None }
    }

    /// Same observation attributed to `tier`.
    pub fn retagged(self, tier: SourceTier) -> Self {
        PricePoint { source_tier: tier, ..self }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_tier(&self) -> SourceTier {
        self.source_tier
    }

    pub fn volume(&self) -> Option<f64> {
        self.volume
    }
}

// Persisted rows go through the same checks as freshly fetched ones.
#[derive(Deserialize)]
struct PricePointRecord {
    value: f64,
    timestamp: DateTime<Utc>,
    source_tier: SourceTier,
    #[serde(default)]
    volume: Option<f64>,
}

impl TryFrom<PricePointRecord> for PricePoint {
    type Error = Error;

    fn try_from(r: PricePointRecord) -> Result<Self> {
        PricePoint::new(r.value, r.timestamp, r.source_tier, r.volume)
    }
}

impl fmt::Display for PricePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.6} ({})", self.value, self.source_tier.source_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_price() {
        assert!(PricePoint::now(0.0, SourceTier::Primary, None).is_err());
        assert!(PricePoint::now(-1.0, SourceTier::Primary, None).is_err());
        assert!(PricePoint::now(f64::NAN, SourceTier::Primary, None).is_err());
    }

    #[test]
    fn rejects_negative_volume() {
        let err = PricePoint::now(0.1, SourceTier::Primary, Some(-5.0)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn deserialization_revalidates() {
        let json = r#"{"value":-2.0,"timestamp":"2025-01-01T00:00:00Z","source_tier":"primary"}"#;
        let err = serde_json::from_str::<PricePoint>(json).unwrap_err();
        assert!(err.to_string().contains("positive"), "{}", err);

        let json = r#"{"value":0.5,"timestamp":"2025-01-01T00:00:00Z","source_tier":"fallback"}"#;
        let point: PricePoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.source_tier(), SourceTier::Fallback);
        assert_eq!(point.volume(), None);
    }

    #[test]
    fn tier_serializes_lowercase() {
        let point = PricePoint::now(0.095, SourceTier::Secondary, Some(12.5)).unwrap();
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["source_tier"], "secondary");
        assert_eq!(json["value"], 0.095);
        assert_eq!(json["volume"], 12.5);
    }
}
