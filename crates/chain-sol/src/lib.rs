//! Solana wire primitives.
//!
//! Addresses, program-derived addresses, keypairs, the legacy transaction
//! wire format and the handful of System / SPL Token / Associated Token
//! instructions the quadratic-funding client needs. Everything is built by
//! hand on top of `ed25519-dalek`, `curve25519-dalek`, `sha2` and `bs58`
//! instead of `solana-sdk`.

pub mod address;
pub mod error;
pub mod keypair;
pub mod spl_token;
pub mod system;
pub mod transaction;

pub use address::{
    address_to_bytes, bytes_to_address, find_program_address, is_on_curve,
};
pub use error::SolError;
pub use keypair::{verify_signature, Keypair, Signer};
pub use spl_token::{
    build_close_account, build_create_associated_token_account, build_initialize_account,
    build_spl_transfer, derive_associated_token_address, AccountState, TokenAccount,
    ASSOCIATED_TOKEN_PROGRAM_ID, NATIVE_MINT, TOKEN_ACCOUNT_LEN, TOKEN_PROGRAM_ID,
};
pub use system::{SYSTEM_PROGRAM_ID, SYSVAR_RENT_ID};
pub use transaction::{
    compile_transaction, decode_compact_u16, encode_compact_u16, parse_transaction,
    serialize_message, sign_transaction, CompiledInstruction,
    ParsedTransaction, SolAccountMeta, SolInstruction, SolTransaction,
};
