//! Program-derived addresses of the quadratic-funding program.

use chain_sol::{derive_associated_token_address, find_program_address, NATIVE_MINT};

use crate::error::Result;

/// Authority over a round's vault: seeds `[round]`.
pub fn vault_owner_address(program_id: &[u8; 32], round: &[u8; 32]) -> Result<([u8; 32], u8)> {
    Ok(find_program_address(&[round], program_id)?)
}

/// Voter record for a (project, voter token account) pair: seeds
/// `[project, voter_token]`. Two token accounts of the same wallet are two
/// different voters.
pub fn voter_address(
    program_id: &[u8; 32],
    project: &[u8; 32],
    voter_token: &[u8; 32],
) -> Result<([u8; 32], u8)> {
    Ok(find_program_address(&[project, voter_token], program_id)?)
}

/// The round's default vault: the vault owner's associated wrapped-SOL account.
pub fn vault_address(program_id: &[u8; 32], round: &[u8; 32]) -> Result<[u8; 32]> {
    let (vault_owner, _) = vault_owner_address(program_id, round)?;
    Ok(derive_associated_token_address(&vault_owner, &NATIVE_MINT)?)
}

/// A contributor's wrapped-SOL associated token account, the source of votes.
pub fn contributor_token_address(wallet: &[u8; 32]) -> Result<[u8; 32]> {
    Ok(derive_associated_token_address(wallet, &NATIVE_MINT)?)
}
