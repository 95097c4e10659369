//! Security identity as supplied by the directory port.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Security {
    pub code: String,
    pub name: String,
    pub market: String,
}
