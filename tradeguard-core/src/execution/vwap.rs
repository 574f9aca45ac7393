//! Arrival VWAP benchmark, accumulated per parent order.

/// Volume-weighted average price since the current parent order arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrivalVwap {
    total_volume: f64,
    total_turnover: f64,
}

impl ArrivalVwap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new benchmark window (new parent order).
    pub fn reset(&mut self) {
        self.total_volume = 0.0;
        self.total_turnover = 0.0;
    }

    /// Add a print. Non-positive or non-finite volume and non-finite prices
    /// are ignored so volume never goes negative.
    pub fn update(&mut self, price: f64, volume: f64) {
        if !(volume > 0.0) || !volume.is_finite() || !price.is_finite() {
            return;
        }
        self.total_volume += volume;
        self.total_turnover += price * volume;
    }

    /// `turnover / volume`, or `None` before any volume.
    pub fn get_vwap(&self) -> Option<f64> {
        if self.total_volume > 0.0 {
            Some(self.total_turnover / self.total_volume)
        } else {
            None
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    pub fn total_turnover(&self) -> f64 {
        self.total_turnover
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_vwap() {
        assert_eq!(ArrivalVwap::new().get_vwap(), None);
    }

    #[test]
    fn weighted_by_volume() {
        let mut vwap = ArrivalVwap::new();
        vwap.update(10.0, 100.0);
        vwap.update(20.0, 200.0);
        // (1000 + 4000) / 300
        assert!((vwap.get_vwap().unwrap() - 16.666_666_666_7).abs() < 1e-6);
    }

    #[test]
    fn reset_clears_window() {
        let mut vwap = ArrivalVwap::new();
        vwap.update(10.0, 100.0);
        vwap.reset();
        assert_eq!(vwap.get_vwap(), None);
        assert_eq!(vwap.total_volume(), 0.0);
    }

    #[test]
    fn negative_volume_ignored() {
        let mut vwap = ArrivalVwap::new();
        vwap.update(10.0, -5.0);
        vwap.update(10.0, f64::NAN);
        assert_eq!(vwap.total_volume(), 0.0);
    }
}
