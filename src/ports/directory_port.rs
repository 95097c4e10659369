//! Security directory port trait.

use crate::domain::error::SifterError;
use crate::domain::security::Security;

/// Source of the screening universe. `market` filters to one market
/// (exact, case-insensitive match); `None` returns every listed security.
pub trait DirectoryPort: Send + Sync {
    fn list_universe(&self, market: Option<&str>) -> Result<Vec<Security>, SifterError>;
}
