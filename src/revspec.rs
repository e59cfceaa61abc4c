//! Parse a `--revision HEAD|<hex>` argument shared by `ls`, `log`, `cp`.

use cling_core::{Repository, RevisionId};
use cling_crypto::BlockId;

use crate::error::CliError;

/// # Errors
/// [`CliError::Other`] wrapping [`cling_core::RepositoryError::Codec`]
/// if `spec` isn't `"HEAD"` or 64 lowercase hex characters.
pub fn resolve(repository: &Repository, spec: &str) -> Result<RevisionId, CliError> {
    if spec.eq_ignore_ascii_case("HEAD") {
        return Ok(repository.head()?);
    }
    let id: BlockId = spec.parse().map_err(|_| anyhow_to_cli(spec))?;
    Ok(RevisionId::from_block_id(id))
}

fn anyhow_to_cli(spec: &str) -> CliError {
    CliError::Corrupt { reason: format!("'{spec}' is not HEAD or a 64-character hex revision id") }
}
