//! Instruction payloads and account lists of the quadratic-funding program.
//!
//! Every payload starts with a one-byte tag. `Donate` and `Vote` carry an
//! amount (u64 LE) and the mint's decimals; the others are the tag alone.
//! The account order of each builder is part of the wire contract.

use chain_sol::{
    SolAccountMeta, SolInstruction, ASSOCIATED_TOKEN_PROGRAM_ID, NATIVE_MINT, SYSTEM_PROGRAM_ID,
    SYSVAR_RENT_ID, TOKEN_PROGRAM_ID,
};

use crate::error::{QfError, Result};

/// Length of a `Donate` / `Vote` payload: tag + u64 + u8.
pub const TRANSFER_PAYLOAD_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QfInstruction {
    StartRound,
    Donate { amount: u64, decimals: u8 },
    RegisterProject,
    InitVoter,
    Vote { amount: u64, decimals: u8 },
    Withdraw,
    EndRound,
    WithdrawFee,
}

impl QfInstruction {
    pub fn tag(&self) -> u8 {
        match self {
            QfInstruction::StartRound => 0,
            QfInstruction::Donate { .. } => 1,
            QfInstruction::RegisterProject => 2,
            QfInstruction::InitVoter => 3,
            QfInstruction::Vote { .. } => 4,
            QfInstruction::Withdraw => 5,
            QfInstruction::EndRound => 6,
            QfInstruction::WithdrawFee => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QfInstruction::StartRound => "StartRound",
            QfInstruction::Donate { .. } => "Donate",
            QfInstruction::RegisterProject => "RegisterProject",
            QfInstruction::InitVoter => "InitVoter",
            QfInstruction::Vote { .. } => "Vote",
            QfInstruction::Withdraw => "Withdraw",
            QfInstruction::EndRound => "EndRound",
            QfInstruction::WithdrawFee => "WithdrawFee",
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        match *self {
            QfInstruction::Donate { amount, decimals } | QfInstruction::Vote { amount, decimals } => {
                let mut buf = Vec::with_capacity(TRANSFER_PAYLOAD_LEN);
                buf.push(self.tag());
                buf.extend_from_slice(&amount.to_le_bytes());
                buf.push(decimals);
                buf
            }
            _ => vec![self.tag()],
        }
    }

    /// Decode a payload. Unknown tags, short bodies and trailing bytes are
    /// all rejected.
    pub fn unpack(data: &[u8]) -> Result<Self> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| QfError::DecodeMismatch("empty instruction data".into()))?;

        let ix = match tag {
            0 => QfInstruction::StartRound,
            1 | 4 => {
                let (amount, decimals) = unpack_amount(rest)?;
                if tag == 1 {
                    QfInstruction::Donate { amount, decimals }
                } else {
                    QfInstruction::Vote { amount, decimals }
                }
            }
            2 => QfInstruction::RegisterProject,
            3 => QfInstruction::InitVoter,
            5 => QfInstruction::Withdraw,
            6 => QfInstruction::EndRound,
            7 => QfInstruction::WithdrawFee,
            other => {
                return Err(QfError::DecodeMismatch(format!(
                    "unknown instruction tag {other}"
                )))
            }
        };

        let expected = ix.pack().len();
        if data.len() != expected {
            return Err(QfError::DecodeMismatch(format!(
                "{} payload must be {expected} bytes, got {}",
                ix.name(),
                data.len()
            )));
        }
        Ok(ix)
    }
}

fn unpack_amount(rest: &[u8]) -> Result<(u64, u8)> {
    match rest {
        [a0, a1, a2, a3, a4, a5, a6, a7, decimals, ..] => Ok((
            u64::from_le_bytes([*a0, *a1, *a2, *a3, *a4, *a5, *a6, *a7]),
            *decimals,
        )),
        _ => Err(QfError::DecodeMismatch(format!(
            "transfer payload must be {TRANSFER_PAYLOAD_LEN} bytes, got {}",
            rest.len() + 1
        ))),
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Accounts of `StartRound`.
#[derive(Debug, Clone)]
pub struct StartRoundAccounts {
    pub round: [u8; 32],
    pub owner: [u8; 32],
    pub payer: [u8; 32],
    pub vault: [u8; 32],
    pub vault_owner: [u8; 32],
}

/// Accounts shared by `Donate` and `Vote`.
#[derive(Debug, Clone)]
pub struct TransferAccounts {
    pub round: [u8; 32],
    pub source: [u8; 32],
    pub mint: [u8; 32],
    pub vault: [u8; 32],
    /// Authority of `source`; signs.
    pub authority: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct WithdrawAccounts {
    pub round: [u8; 32],
    pub vault: [u8; 32],
    pub vault_owner: [u8; 32],
    pub project: [u8; 32],
    pub project_owner: [u8; 32],
    pub destination: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct WithdrawFeeAccounts {
    pub round: [u8; 32],
    pub owner: [u8; 32],
    pub vault: [u8; 32],
    pub vault_owner: [u8; 32],
    pub destination: [u8; 32],
}

fn instruction(program_id: &[u8; 32], ix: QfInstruction, accounts: Vec<SolAccountMeta>) -> SolInstruction {
    SolInstruction {
        program_id: *program_id,
        accounts,
        data: ix.pack(),
    }
}

/// # Accounts expected
///
/// 0. `[writable]` round
/// 1. `[]` round owner
/// 2. `[]` associated token program
/// 3. `[signer, writable]` payer
/// 4. `[writable]` vault
/// 5. `[]` vault owner
/// 6. `[]` native mint
/// 7. `[]` system program
/// 8. `[]` token program
/// 9. `[]` rent sysvar
pub fn start_round(program_id: &[u8; 32], accounts: &StartRoundAccounts) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::StartRound,
        vec![
            SolAccountMeta::new(accounts.round, true),
            SolAccountMeta::readonly(accounts.owner),
            SolAccountMeta::readonly(ASSOCIATED_TOKEN_PROGRAM_ID),
            SolAccountMeta::signer(accounts.payer, true),
            SolAccountMeta::new(accounts.vault, true),
            SolAccountMeta::readonly(accounts.vault_owner),
            SolAccountMeta::readonly(NATIVE_MINT),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID),
            SolAccountMeta::readonly(SYSVAR_RENT_ID),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` round
/// 1. `[writable]` source token account
/// 2. `[]` mint
/// 3. `[writable]` vault
/// 4. `[signer]` source authority
/// 5. `[]` token program
pub fn donate(
    program_id: &[u8; 32],
    accounts: &TransferAccounts,
    amount: u64,
    decimals: u8,
) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::Donate { amount, decimals },
        vec![
            SolAccountMeta::new(accounts.round, true),
            SolAccountMeta::new(accounts.source, true),
            SolAccountMeta::readonly(accounts.mint),
            SolAccountMeta::new(accounts.vault, true),
            SolAccountMeta::signer(accounts.authority, false),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` project (freshly allocated, program-owned)
/// 1. `[]` round
/// 2. `[]` project owner, not a signer
/// 3. `[]` rent sysvar
pub fn register_project(
    program_id: &[u8; 32],
    project: &[u8; 32],
    round: &[u8; 32],
    project_owner: &[u8; 32],
) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::RegisterProject,
        vec![
            SolAccountMeta::new(*project, true),
            SolAccountMeta::readonly(*round),
            SolAccountMeta::readonly(*project_owner),
            SolAccountMeta::readonly(SYSVAR_RENT_ID),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` voter (derived from project and voter token account)
/// 1. `[]` voter token account
/// 2. `[]` project
/// 3. `[signer, writable]` payer, funds the voter's rent
/// 4. `[]` system program
/// 5. `[]` rent sysvar
pub fn init_voter(
    program_id: &[u8; 32],
    voter: &[u8; 32],
    voter_token: &[u8; 32],
    project: &[u8; 32],
    payer: &[u8; 32],
) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::InitVoter,
        vec![
            SolAccountMeta::new(*voter, true),
            SolAccountMeta::readonly(*voter_token),
            SolAccountMeta::readonly(*project),
            SolAccountMeta::signer(*payer, true),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID),
            SolAccountMeta::readonly(SYSVAR_RENT_ID),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` round
/// 1. `[writable]` project
/// 2. `[writable]` voter
/// 3. `[writable]` source token account
/// 4. `[]` mint
/// 5. `[writable]` vault
/// 6. `[signer]` source authority
/// 7. `[]` token program
pub fn vote(
    program_id: &[u8; 32],
    accounts: &TransferAccounts,
    project: &[u8; 32],
    voter: &[u8; 32],
    amount: u64,
    decimals: u8,
) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::Vote { amount, decimals },
        vec![
            SolAccountMeta::new(accounts.round, true),
            SolAccountMeta::new(*project, true),
            SolAccountMeta::new(*voter, true),
            SolAccountMeta::new(accounts.source, true),
            SolAccountMeta::readonly(accounts.mint),
            SolAccountMeta::new(accounts.vault, true),
            SolAccountMeta::signer(accounts.authority, false),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` round
/// 1. `[writable]` vault
/// 2. `[]` vault owner
/// 3. `[writable]` project
/// 4. `[signer]` project owner
/// 5. `[writable]` destination token account
/// 6. `[]` token program
pub fn withdraw(program_id: &[u8; 32], accounts: &WithdrawAccounts) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::Withdraw,
        vec![
            SolAccountMeta::new(accounts.round, true),
            SolAccountMeta::new(accounts.vault, true),
            SolAccountMeta::readonly(accounts.vault_owner),
            SolAccountMeta::new(accounts.project, true),
            SolAccountMeta::signer(accounts.project_owner, false),
            SolAccountMeta::new(accounts.destination, true),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` round
/// 1. `[signer]` round owner
pub fn end_round(program_id: &[u8; 32], round: &[u8; 32], owner: &[u8; 32]) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::EndRound,
        vec![
            SolAccountMeta::new(*round, true),
            SolAccountMeta::signer(*owner, false),
        ],
    )
}

/// # Accounts expected
///
/// 0. `[writable]` round
/// 1. `[signer]` round owner
/// 2. `[writable]` vault
/// 3. `[]` vault owner
/// 4. `[writable]` destination token account
/// 5. `[]` token program
pub fn withdraw_fee(program_id: &[u8; 32], accounts: &WithdrawFeeAccounts) -> SolInstruction {
    instruction(
        program_id,
        QfInstruction::WithdrawFee,
        vec![
            SolAccountMeta::new(accounts.round, true),
            SolAccountMeta::signer(accounts.owner, false),
            SolAccountMeta::new(accounts.vault, true),
            SolAccountMeta::readonly(accounts.vault_owner),
            SolAccountMeta::new(accounts.destination, true),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID),
        ],
    )
}
