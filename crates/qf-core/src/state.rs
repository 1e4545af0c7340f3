//! Account records owned by the quadratic-funding program.
//!
//! All records are fixed-size, little-endian and unpadded. 256-bit fields are
//! stored as 32 little-endian bytes.

use std::fmt;

use alloy_primitives::U256;
use chain_sol::bytes_to_address;

use crate::error::{QfError, Result};

/// Lifecycle of a round. Byte 0 is an uninitialized account and never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Active,
    Ended,
}

impl RoundStatus {
    pub fn to_byte(self) -> u8 {
        match self {
            RoundStatus::Active => 1,
            RoundStatus::Ended => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(RoundStatus::Active),
            2 => Ok(RoundStatus::Ended),
            0 => Err(QfError::DecodeMismatch("round is not initialized".into())),
            other => Err(QfError::DecodeMismatch(format!("unknown round status {other}"))),
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Active => f.write_str("active"),
            RoundStatus::Ended => f.write_str("ended"),
        }
    }
}

/// Sequential reader over a record that has already been length-checked.
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(data: &'a [u8], len: usize, kind: &str) -> Result<Self> {
        if data.len() != len {
            return Err(QfError::DecodeMismatch(format!(
                "{kind} record must be {len} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { data, pos: 0 })
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.bytes::<1>()[0]
    }

    fn flag(&mut self) -> bool {
        self.u8() == 1
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.bytes())
    }

    fn u256(&mut self) -> U256 {
        U256::from_le_bytes(self.bytes::<32>())
    }
}

fn u256_le(value: &U256) -> [u8; 32] {
    value.to_le_bytes::<32>()
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub status: RoundStatus,
    /// Total raised so far.
    pub fund: u64,
    /// Platform fee owed to the owner.
    pub fee: u64,
    pub vault: [u8; 32],
    pub owner: [u8; 32],
    /// Aggregate matching weight across projects.
    pub area: U256,
}

impl Round {
    pub const LEN: usize = 113;

    pub fn unpack(data: &[u8]) -> Result<Self> {
        let mut f = Fields::new(data, Self::LEN, "round")?;
        Ok(Self {
            status: RoundStatus::from_byte(f.u8())?,
            fund: f.u64(),
            fee: f.u64(),
            vault: f.bytes(),
            owner: f.bytes(),
            area: f.u256(),
        })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.push(self.status.to_byte());
        buf.extend_from_slice(&self.fund.to_le_bytes());
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf.extend_from_slice(&self.vault);
        buf.extend_from_slice(&self.owner);
        buf.extend_from_slice(&u256_le(&self.area));
        buf
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "status: {}", self.status)?;
        writeln!(f, "owner: {}", bytes_to_address(&self.owner))?;
        writeln!(f, "vault: {}", bytes_to_address(&self.vault))?;
        writeln!(f, "fund: {}", self.fund)?;
        writeln!(f, "fee: {}", self.fee)?;
        write!(f, "area: {}", self.area)
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub round: [u8; 32],
    pub owner: [u8; 32],
    /// Set once the project has withdrawn its share.
    pub withdraw: bool,
    pub votes: u64,
    pub area: U256,
    pub area_sqrt: U256,
}

impl Project {
    pub const LEN: usize = 137;

    pub fn unpack(data: &[u8]) -> Result<Self> {
        let mut f = Fields::new(data, Self::LEN, "project")?;
        Ok(Self {
            round: f.bytes(),
            owner: f.bytes(),
            withdraw: f.flag(),
            votes: f.u64(),
            area: f.u256(),
            area_sqrt: f.u256(),
        })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.extend_from_slice(&self.round);
        buf.extend_from_slice(&self.owner);
        buf.push(self.withdraw as u8);
        buf.extend_from_slice(&self.votes.to_le_bytes());
        buf.extend_from_slice(&u256_le(&self.area));
        buf.extend_from_slice(&u256_le(&self.area_sqrt));
        buf
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "round: {}", bytes_to_address(&self.round))?;
        writeln!(f, "owner: {}", bytes_to_address(&self.owner))?;
        writeln!(f, "withdraw: {}", self.withdraw)?;
        writeln!(f, "votes: {}", self.votes)?;
        writeln!(f, "area: {}", self.area)?;
        write!(f, "area_sqrt: {}", self.area_sqrt)
    }
}

// ---------------------------------------------------------------------------
// Voter
// ---------------------------------------------------------------------------

/// Per (project, voter token account) contribution record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub is_init: bool,
    pub votes: u64,
    /// Fixed-point square root of `votes`, maintained by the program.
    pub votes_sqrt: U256,
}

impl Voter {
    /// `is_init` (1) + `votes` (8) + `votes_sqrt` (32). The square root is a
    /// full 256-bit field on chain, so older 17-byte layouts do not decode.
    pub const LEN: usize = 41;

    pub fn unpack(data: &[u8]) -> Result<Self> {
        let mut f = Fields::new(data, Self::LEN, "voter")?;
        Ok(Self {
            is_init: f.flag(),
            votes: f.u64(),
            votes_sqrt: f.u256(),
        })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.push(self.is_init as u8);
        buf.extend_from_slice(&self.votes.to_le_bytes());
        buf.extend_from_slice(&u256_le(&self.votes_sqrt));
        buf
    }
}

impl fmt::Display for Voter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "is_init: {}", self.is_init)?;
        writeln!(f, "votes: {}", self.votes)?;
        write!(f, "votes_sqrt: {}", self.votes_sqrt)
    }
}
