use mbus_transport::Scalar;
use std::collections::HashMap;
use tracing::warn;

/// Per-device scale factors keyed by data record id.
///
/// Filled while creating properties and consulted on every later poll. The first
/// factor recorded for an id is kept for the lifetime of the session.
#[derive(Debug, Default, Clone)]
pub struct ScaleFactorCache {
    factors: HashMap<u32, f64>,
}

impl ScaleFactorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `factor` for `id` and return the factor now in effect.
    pub fn record(&mut self, id: u32, factor: f64) -> f64 {
        let current = *self.factors.entry(id).or_insert(factor);
        if current != factor {
            warn!(
                id,
                kept = current,
                ignored = factor,
                "scale factor changed for data record, keeping the original"
            );
        }
        current
    }

    pub fn factor(&self, id: u32) -> Option<f64> {
        self.factors.get(&id).copied()
    }

    /// `raw * factor` for numeric values of ids with a factor, `raw` otherwise.
    pub fn apply(&self, id: u32, raw: &Scalar) -> Scalar {
        match (self.factor(id), raw.as_f64()) {
            (Some(factor), Some(value)) => Scalar::Float(value * factor),
            _ => raw.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_factor_wins() {
        let mut cache = ScaleFactorCache::new();
        assert_eq!(cache.record(1, 1e-3), 1e-3);
        assert_eq!(cache.record(1, 1e-3), 1e-3);
        assert_eq!(cache.record(1, 1e-2), 1e-3);
        assert_eq!(cache.factor(1), Some(1e-3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn apply_scales_numbers_only() {
        let mut cache = ScaleFactorCache::new();
        cache.record(1, 1e-3);
        assert_eq!(cache.apply(1, &Scalar::Integer(1500)), Scalar::Float(1.5));
        assert_eq!(cache.apply(1, &Scalar::Integer(1600)).to_string(), "1.6");
        assert_eq!(cache.apply(1, &Scalar::from("n/a")), Scalar::from("n/a"));
        assert_eq!(cache.apply(2, &Scalar::Integer(1500)), Scalar::Integer(1500));
    }
}
