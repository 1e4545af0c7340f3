//! SPL Token and Associated Token Account instructions, without the
//! `spl-token` crates.

use crate::address::{bytes_to_address, find_program_address};
use crate::error::SolError;
use crate::system::{SYSTEM_PROGRAM_ID, SYSVAR_RENT_ID};
use crate::transaction::{SolAccountMeta, SolInstruction};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: [u8; 32] = [
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
];

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: [u8; 32] = [
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
];

/// Wrapped SOL mint: `So11111111111111111111111111111111111111112`
pub const NATIVE_MINT: [u8; 32] = [
    0x06, 0x9b, 0x88, 0x57, 0xfe, 0xab, 0x81, 0x84, 0xfb, 0x68, 0x7f, 0x63, 0x46, 0x18, 0xc0,
    0x35, 0xda, 0xc4, 0x39, 0xdc, 0x1a, 0xeb, 0x3b, 0x55, 0x98, 0xa0, 0xf0, 0x00, 0x00, 0x00,
    0x00, 0x01,
];

/// Size of an SPL token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

const INITIALIZE_ACCOUNT_TAG: u8 = 1;
const TRANSFER_TAG: u8 = 3;
const CLOSE_ACCOUNT_TAG: u8 = 9;

// ---------------------------------------------------------------------------
// Token program instructions
// ---------------------------------------------------------------------------

/// Build an SPL Token `Transfer` instruction: `[3] || amount (u64 LE)`.
///
/// Accounts: source (w), destination (w), owner (s).
pub fn build_spl_transfer(
    source: &[u8; 32],
    destination: &[u8; 32],
    owner: &[u8; 32],
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "SPL transfer amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(TRANSFER_TAG);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::new(*source, true),
            SolAccountMeta::new(*destination, true),
            SolAccountMeta::signer(*owner, false),
        ],
        data,
    })
}

/// `InitializeAccount`: bind a freshly allocated token account to `mint` and
/// `owner`. Accounts: account (w), mint, owner, rent sysvar.
pub fn build_initialize_account(
    account: &[u8; 32],
    mint: &[u8; 32],
    owner: &[u8; 32],
) -> SolInstruction {
    SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::new(*account, true),
            SolAccountMeta::readonly(*mint),
            SolAccountMeta::readonly(*owner),
            SolAccountMeta::readonly(SYSVAR_RENT_ID),
        ],
        data: vec![INITIALIZE_ACCOUNT_TAG],
    }
}

/// `CloseAccount`: release all lamports of `account` to `destination`.
/// For a wrapped-SOL account that includes the wrapped balance.
pub fn build_close_account(
    account: &[u8; 32],
    destination: &[u8; 32],
    owner: &[u8; 32],
) -> SolInstruction {
    SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::new(*account, true),
            SolAccountMeta::new(*destination, true),
            SolAccountMeta::signer(*owner, false),
        ],
        data: vec![CLOSE_ACCOUNT_TAG],
    }
}

// ---------------------------------------------------------------------------
// Associated Token Accounts
// ---------------------------------------------------------------------------

/// Derive the associated token account address for a wallet + mint pair.
///
/// Seeds: `[wallet, token_program_id, mint]` under the ATA program.
pub fn derive_associated_token_address(
    wallet: &[u8; 32],
    mint: &[u8; 32],
) -> Result<[u8; 32], SolError> {
    find_program_address(
        &[wallet.as_ref(), &TOKEN_PROGRAM_ID, mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// `Create` on the ATA program (empty instruction data).
///
/// Accounts: payer (s, w), ata (w), wallet, mint, system program,
/// token program, rent sysvar.
pub fn build_create_associated_token_account(
    payer: &[u8; 32],
    wallet: &[u8; 32],
    mint: &[u8; 32],
) -> Result<SolInstruction, SolError> {
    let ata = derive_associated_token_address(wallet, mint)?;
    Ok(SolInstruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::signer(*payer, true),
            SolAccountMeta::new(ata, true),
            SolAccountMeta::readonly(*wallet),
            SolAccountMeta::readonly(*mint),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID),
            SolAccountMeta::readonly(SYSVAR_RENT_ID),
        ],
        data: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Token account decoding
// ---------------------------------------------------------------------------

/// Lifecycle state of a token account (byte 108).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Uninitialized,
    Initialized,
    Frozen,
}

/// The fields of an SPL token account this workspace cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: [u8; 32],
    pub owner: [u8; 32],
    pub amount: u64,
    pub state: AccountState,
    /// `Some(rent_reserve)` for wrapped-SOL accounts.
    pub is_native: Option<u64>,
}

impl TokenAccount {
    /// Decode the 165-byte account layout.
    pub fn unpack(data: &[u8]) -> Result<Self, SolError> {
        if data.len() != TOKEN_ACCOUNT_LEN {
            return Err(SolError::InvalidAccountData(format!(
                "token account must be {TOKEN_ACCOUNT_LEN} bytes, got {}",
                data.len()
            )));
        }

        let array32 = |at: usize| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&data[at..at + 32]);
            out
        };
        let u64_at = |at: usize| {
            let mut out = [0u8; 8];
            out.copy_from_slice(&data[at..at + 8]);
            u64::from_le_bytes(out)
        };

        let state = match data[108] {
            0 => AccountState::Uninitialized,
            1 => AccountState::Initialized,
            2 => AccountState::Frozen,
            other => {
                return Err(SolError::InvalidAccountData(format!(
                    "unknown token account state {other}"
                )))
            }
        };

        // COption<u64>: u32 tag then value.
        let is_native = match &data[109..113] {
            [0, 0, 0, 0] => None,
            [1, 0, 0, 0] => Some(u64_at(113)),
            _ => {
                return Err(SolError::InvalidAccountData(
                    "invalid is_native option tag".into(),
                ))
            }
        };

        Ok(Self {
            mint: array32(0),
            owner: array32(32),
            amount: u64_at(64),
            state,
            is_native,
        })
    }

    /// Encode back into the 165-byte layout. Delegate, delegated amount and
    /// close authority are written as unset.
    pub fn pack(&self) -> [u8; TOKEN_ACCOUNT_LEN] {
        let mut out = [0u8; TOKEN_ACCOUNT_LEN];
        out[0..32].copy_from_slice(&self.mint);
        out[32..64].copy_from_slice(&self.owner);
        out[64..72].copy_from_slice(&self.amount.to_le_bytes());
        out[108] = match self.state {
            AccountState::Uninitialized => 0,
            AccountState::Initialized => 1,
            AccountState::Frozen => 2,
        };
        if let Some(reserve) = self.is_native {
            out[109] = 1;
            out[113..121].copy_from_slice(&reserve.to_le_bytes());
        }
        out
    }
}

impl std::fmt::Display for TokenAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "mint: {}", bytes_to_address(&self.mint))?;
        writeln!(f, "owner: {}", bytes_to_address(&self.owner))?;
        write!(f, "amount: {}", self.amount)
    }
}
