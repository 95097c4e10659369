//! Historical bar access port trait.

use crate::domain::bar::BarSeries;
use crate::domain::error::SifterError;

/// Source of daily OHLCV history. Implementations return the most recent
/// `max_bars` bars in ascending date order.
pub trait BarPort: Send + Sync {
    fn fetch_bars(&self, code: &str, max_bars: usize) -> Result<BarSeries, SifterError>;
}
