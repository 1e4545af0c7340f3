//! Manual Solana transaction wire format, signing and parsing.
//!
//! Legacy (non-versioned) transactions are built by hand, without `solana-sdk`:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use crate::address::bytes_to_address;
use crate::error::SolError;
use crate::keypair::{verify_signature, Signer};

/// Account indices are single bytes.
const MAX_ACCOUNTS: usize = 256;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from the front of `data`.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::SerializationError("unexpected end of data while decoding compact-u16".into())
        })?;
        value |= ((byte & 0x7f) as u32) << (7 * consumed);
        consumed += 1;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    let value = u16::try_from(value)
        .map_err(|_| SolError::SerializationError("compact-u16 value overflow".into()))?;
    Ok((value, consumed))
}

fn compact_len(len: usize, what: &str) -> Result<Vec<u8>, SolError> {
    let len = u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(len))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolAccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

impl SolAccountMeta {
    /// Non-signer account.
    pub fn new(pubkey: [u8; 32], is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable,
        }
    }

    /// Read-only, non-signer account.
    pub fn readonly(pubkey: [u8; 32]) -> Self {
        Self::new(pubkey, false)
    }

    /// Signer account.
    pub fn signer(pubkey: [u8; 32], is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer: true,
            is_writable,
        }
    }
}

/// A Solana instruction (before it is compiled into a transaction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolInstruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled, unsigned Solana transaction message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolTransaction {
    /// All account keys referenced by this transaction, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<[u8; 32]>,

    /// Number of required signatures (first N accounts are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,

    pub recent_blockhash: [u8; 32],

    pub compiled_instructions: Vec<CompiledInstruction>,
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the transaction's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

impl SolTransaction {
    /// Public keys that must sign, in signature-slot order.
    pub fn signer_keys(&self) -> &[[u8; 32]] {
        let n = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    /// Whether the account at `index` is writable according to the header.
    pub fn is_writable(&self, index: usize) -> bool {
        let num_signed = self.num_required_signatures as usize;
        if index < num_signed {
            index < num_signed - self.num_readonly_signed as usize
        } else {
            index < self.account_keys.len() - self.num_readonly_unsigned as usize
        }
    }

    /// Whether the account at `index` signed the transaction.
    pub fn is_signer(&self, index: usize) -> bool {
        index < self.num_required_signatures as usize
    }

    /// Rebuild the instruction list with full account metadata.
    pub fn decompile(&self) -> Result<Vec<SolInstruction>, SolError> {
        let key = |index: u8| {
            self.account_keys.get(index as usize).copied().ok_or_else(|| {
                SolError::SerializationError(format!("account index {index} out of range"))
            })
        };

        self.compiled_instructions
            .iter()
            .map(|ix| {
                let accounts = ix
                    .account_indices
                    .iter()
                    .map(|&i| {
                        Ok(SolAccountMeta {
                            pubkey: key(i)?,
                            is_signer: self.is_signer(i as usize),
                            is_writable: self.is_writable(i as usize),
                        })
                    })
                    .collect::<Result<Vec<_>, SolError>>()?;
                Ok(SolInstruction {
                    program_id: key(ix.program_id_index)?,
                    accounts,
                    data: ix.data.clone(),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile instructions into a transaction message with `fee_payer` at index 0.
///
/// Accounts referenced several times are merged, keeping the union of their
/// signer and writable flags.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &[u8; 32],
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    if instructions.is_empty() {
        return Err(SolError::TransactionBuildError(
            "transaction has no instructions".into(),
        ));
    }

    struct AccountEntry {
        pubkey: [u8; 32],
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();
    let mut upsert = |pubkey: [u8; 32], signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    // Fee payer is always signer + writable, and inserted first so the stable
    // sort below keeps it at index 0.
    upsert(*fee_payer, true, true);
    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    if entries.len() > MAX_ACCOUNTS {
        return Err(SolError::TransactionBuildError(format!(
            "too many accounts: {}",
            entries.len()
        )));
    }

    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let count = |f: fn(&AccountEntry) -> bool| entries.iter().filter(|e| f(e)).count() as u8;
    let num_required_signatures = count(|e| e.is_signer);
    let num_readonly_signed = count(|e| e.is_signer && !e.is_writable);
    let num_readonly_unsigned = count(|e| !e.is_signer && !e.is_writable);

    let account_keys: Vec<[u8; 32]> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &[u8; 32]| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| {
                SolError::TransactionBuildError(format!(
                    "account {} not in account keys",
                    bytes_to_address(key)
                ))
            })
    };

    let compiled_instructions = instructions
        .iter()
        .map(|ix| {
            Ok(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                account_indices: ix
                    .accounts
                    .iter()
                    .map(|m| index_of(&m.pubkey))
                    .collect::<Result<_, _>>()?,
                data: ix.data.clone(),
            })
        })
        .collect::<Result<Vec<_>, SolError>>()?;

    Ok(SolTransaction {
        account_keys,
        num_required_signatures,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions,
    })
}

/// Serialize the transaction message (the bytes that get signed).
pub fn serialize_message(tx: &SolTransaction) -> Result<Vec<u8>, SolError> {
    let mut buf = Vec::with_capacity(256);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&compact_len(tx.account_keys.len(), "accounts")?);
    for key in &tx.account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&compact_len(tx.compiled_instructions.len(), "instructions")?);
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);
        buf.extend_from_slice(&compact_len(ix.account_indices.len(), "instruction accounts")?);
        buf.extend_from_slice(&ix.account_indices);
        buf.extend_from_slice(&compact_len(ix.data.len(), "instruction data bytes")?);
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

fn assemble_wire(signatures: &[[u8; 64]], message: &[u8]) -> Result<Vec<u8>, SolError> {
    let mut wire = Vec::with_capacity(3 + 64 * signatures.len() + message.len());
    wire.extend_from_slice(&compact_len(signatures.len(), "signatures")?);
    for sig in signatures {
        wire.extend_from_slice(sig);
    }
    wire.extend_from_slice(message);
    Ok(wire)
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Sign with every required signer and serialize into wire format.
///
/// Every signer must be one of the transaction's required signers, and every
/// required signer must be supplied. Passing the same key twice is harmless.
pub fn sign_transaction(tx: &SolTransaction, signers: &[&dyn Signer]) -> Result<Vec<u8>, SolError> {
    let message = serialize_message(tx)?;
    let required = tx.signer_keys();
    let mut slots: Vec<Option<[u8; 64]>> = vec![None; required.len()];

    for signer in signers {
        let pubkey = signer.pubkey();
        let slot = required.iter().position(|k| *k == pubkey).ok_or_else(|| {
            SolError::SigningError(format!(
                "{} is not a required signer",
                bytes_to_address(&pubkey)
            ))
        })?;
        if slots[slot].is_none() {
            slots[slot] = Some(signer.try_sign(&message)?);
        }
    }

    let signatures = slots
        .into_iter()
        .zip(required)
        .map(|(sig, key)| {
            sig.ok_or_else(|| {
                SolError::SigningError(format!("missing signature for {}", bytes_to_address(key)))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    assemble_wire(&signatures, &message)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A wire transaction split into its parts.
#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub signatures: Vec<[u8; 64]>,
    /// Raw message bytes, exactly as signed.
    pub message: Vec<u8>,
    pub tx: SolTransaction,
}

impl ParsedTransaction {
    /// Check every signature slot against its signer's key.
    pub fn verify(&self) -> Result<(), SolError> {
        for (sig, key) in self.signatures.iter().zip(self.tx.signer_keys()) {
            if !verify_signature(key, &self.message, sig) {
                return Err(SolError::SigningError(format!(
                    "invalid signature for {}",
                    bytes_to_address(key)
                )));
            }
        }
        Ok(())
    }

    /// Base58 of the first signature, which is how the network names a
    /// transaction.
    pub fn transaction_id(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], SolError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let end = end.ok_or_else(|| {
            SolError::SerializationError(format!("transaction too short: truncated {what}"))
        })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self, what: &str) -> Result<u8, SolError> {
        Ok(self.take(1, what)?[0])
    }

    fn compact(&mut self) -> Result<usize, SolError> {
        let (value, len) = decode_compact_u16(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value as usize)
    }

    fn array32(&mut self, what: &str) -> Result<[u8; 32], SolError> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.take(32, what)?);
        Ok(out)
    }
}

/// Parse legacy wire bytes. Trailing bytes after the message are rejected.
pub fn parse_transaction(raw_tx: &[u8]) -> Result<ParsedTransaction, SolError> {
    let mut cur = Cursor {
        data: raw_tx,
        pos: 0,
    };

    let num_sigs = cur.compact()?;
    if num_sigs == 0 {
        return Err(SolError::TransactionBuildError(
            "transaction has zero signatures".into(),
        ));
    }
    let signatures = (0..num_sigs)
        .map(|_| {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(cur.take(64, "signatures")?);
            Ok(sig)
        })
        .collect::<Result<Vec<_>, SolError>>()?;

    let message_start = cur.pos;
    let num_required_signatures = cur.byte("header")?;
    let num_readonly_signed = cur.byte("header")?;
    let num_readonly_unsigned = cur.byte("header")?;

    if num_required_signatures as usize != num_sigs {
        return Err(SolError::SerializationError(format!(
            "header requires {num_required_signatures} signatures, found {num_sigs}"
        )));
    }

    let num_accounts = cur.compact()?;
    let account_keys = (0..num_accounts)
        .map(|_| cur.array32("account keys"))
        .collect::<Result<Vec<_>, _>>()?;

    if num_required_signatures as usize > num_accounts
        || num_readonly_signed > num_required_signatures
        || num_required_signatures as usize + num_readonly_unsigned as usize > num_accounts
    {
        return Err(SolError::SerializationError(
            "message header inconsistent with account count".into(),
        ));
    }

    let recent_blockhash = cur.array32("blockhash")?;

    let num_instructions = cur.compact()?;
    let mut compiled_instructions = Vec::with_capacity(num_instructions);
    for _ in 0..num_instructions {
        let program_id_index = cur.byte("instruction")?;
        let n = cur.compact()?;
        let account_indices = cur.take(n, "instruction accounts")?.to_vec();
        let n = cur.compact()?;
        let data = cur.take(n, "instruction data")?.to_vec();

        if account_indices
            .iter()
            .chain(std::iter::once(&program_id_index))
            .any(|&i| i as usize >= num_accounts)
        {
            return Err(SolError::SerializationError(
                "instruction references unknown account".into(),
            ));
        }

        compiled_instructions.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data,
        });
    }

    if cur.pos != raw_tx.len() {
        return Err(SolError::SerializationError(format!(
            "{} trailing bytes after message",
            raw_tx.len() - cur.pos
        )));
    }

    Ok(ParsedTransaction {
        signatures,
        message: raw_tx[message_start..].to_vec(),
        tx: SolTransaction {
            account_keys,
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            recent_blockhash,
            compiled_instructions,
        },
    })
}
