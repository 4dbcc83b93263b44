//! Folio formatting. Allocation itself happens in Postgres (`next_folio()`)
//! so concurrent issuers never collide; this module owns the text format.

use anyhow::anyhow;
use service_core::error::AppError;

/// Width every folio is zero-padded to. Folios past 999999 keep growing
/// without truncation.
pub const FOLIO_WIDTH: usize = 6;

pub fn format_folio(n: u64) -> String {
    format!("{:0width$}", n, width = FOLIO_WIDTH)
}

/// Successor of a previously issued folio, or the first folio when none
/// exists yet. Used to sanity-check sequencer output during recovery.
pub fn next_folio_after(last: Option<&str>) -> Result<String, AppError> {
    match last {
        None => Ok(format_folio(1)),
        Some(folio) => {
            let n: u64 = folio
                .parse()
                .map_err(|_| AppError::BadRequest(anyhow!("Folio '{}' is not numeric", folio)))?;
            Ok(format_folio(n + 1))
        }
    }
}
