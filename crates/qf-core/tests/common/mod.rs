//! In-memory ledger that runs batches the way the cluster would.
//!
//! Signatures and the blockhash are checked, each batch is applied to a copy
//! of the account map and committed only if every instruction succeeds. The
//! System, SPL Token and Associated Token programs are emulated only as far
//! as the client uses them, along with the eight quadratic-funding
//! instructions. Only the native mint is supported.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::U256;
use async_trait::async_trait;
use chain_sol::{
    derive_associated_token_address, parse_transaction, AccountState, Keypair, Signer,
    SolInstruction, TokenAccount, ASSOCIATED_TOKEN_PROGRAM_ID, NATIVE_MINT, SYSTEM_PROGRAM_ID, TOKEN_ACCOUNT_LEN,
    TOKEN_PROGRAM_ID,
};
use qf_core::pda;
use qf_core::{
    AccountSnapshot, Ledger, Project, QfError, QfInstruction, Result, Round, RoundStatus, Session,
    Voter,
};

pub const PROGRAM_ID: [u8; 32] = [0xA0; 32];
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;
pub const NATIVE_DECIMALS: u8 = 9;
pub const SOL: u64 = 1_000_000_000;

/// Fixed-point scale of the program's square-root arithmetic.
const ONE: u64 = 1_000_000_000_000;

const OWNER_MISMATCH: &str = "owner mismatch";
const ROUND_STATUS: &str = "round status does not expected";
const VAULT_MISMATCH: &str = "vault does not match";
const ALREADY_WITHDRAWN: &str = "project has already withdraw";
const ROUND_MISMATCH: &str = "round mismatch";

/// Rent-exempt minimum for `space` bytes.
pub fn rent(space: usize) -> u64 {
    (128 + space as u64) * 6_960
}

pub fn isqrt(n: U256) -> U256 {
    let two = U256::from(2u64);
    if n < two {
        return n;
    }
    let mut x = n;
    let mut y = (x >> 1) + U256::from(1u64);
    while y < x {
        x = y;
        y = (x + n / x) >> 1;
    }
    x
}

struct State {
    accounts: HashMap<[u8; 32], AccountSnapshot>,
    blockhash: [u8; 32],
    processed: Vec<String>,
    submissions: usize,
}

pub struct Engine {
    program_id: [u8; 32],
    state: Mutex<State>,
}

impl Engine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            program_id: PROGRAM_ID,
            state: Mutex::new(State {
                accounts: HashMap::new(),
                blockhash: [0x5B; 32],
                processed: Vec::new(),
                submissions: 0,
            }),
        })
    }

    pub fn airdrop(&self, wallet: &[u8; 32], lamports: u64) {
        let mut state = self.state.lock().unwrap();
        let mut bank = Bank {
            accounts: &mut state.accounts,
            program_id: self.program_id,
        };
        bank.credit(wallet, lamports);
    }

    /// Give `wallet` a wrapped-SOL associated account holding `amount`.
    pub fn wrapped_account(&self, wallet: &[u8; 32], amount: u64) -> [u8; 32] {
        let address = derive_associated_token_address(wallet, &NATIVE_MINT).unwrap();
        let reserve = rent(TOKEN_ACCOUNT_LEN);
        let token = TokenAccount {
            mint: NATIVE_MINT,
            owner: *wallet,
            amount,
            state: AccountState::Initialized,
            is_native: Some(reserve),
        };
        self.state.lock().unwrap().accounts.insert(
            address,
            AccountSnapshot {
                lamports: reserve + amount,
                owner: TOKEN_PROGRAM_ID,
                data: token.pack().to_vec(),
            },
        );
        address
    }

    pub fn account(&self, address: &[u8; 32]) -> Option<AccountSnapshot> {
        self.state.lock().unwrap().accounts.get(address).cloned()
    }

    pub fn lamports(&self, address: &[u8; 32]) -> u64 {
        self.account(address).map_or(0, |a| a.lamports)
    }

    pub fn token_amount(&self, address: &[u8; 32]) -> Option<u64> {
        let account = self.account(address)?;
        TokenAccount::unpack(&account.data).ok().map(|t| t.amount)
    }

    /// Number of transactions handed to `send_transaction`, accepted or not.
    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    /// Advance to a new blockhash so identical batches get new signatures.
    pub fn new_blockhash(&self) {
        let mut state = self.state.lock().unwrap();
        state.blockhash[0] = state.blockhash[0].wrapping_add(1);
    }
}

fn rejection(message: impl Into<String>, logs: Vec<String>) -> QfError {
    QfError::EngineRejection {
        message: message.into(),
        logs,
    }
}

#[async_trait]
impl Ledger for Engine {
    async fn get_account(&self, address: &[u8; 32]) -> Result<Option<AccountSnapshot>> {
        Ok(self.account(address))
    }

    async fn get_latest_blockhash(&self) -> Result<[u8; 32]> {
        Ok(self.state.lock().unwrap().blockhash)
    }

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64> {
        Ok(rent(space))
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String> {
        let parsed = parse_transaction(wire)
            .map_err(|e| QfError::TransportFailure(format!("malformed transaction: {e}")))?;

        let mut state = self.state.lock().unwrap();
        state.submissions += 1;

        parsed
            .verify()
            .map_err(|e| rejection(format!("signature verification failed: {e}"), Vec::new()))?;
        if parsed.tx.recent_blockhash != state.blockhash {
            return Err(rejection("Blockhash not found", Vec::new()));
        }
        let signature = parsed.transaction_id().unwrap();
        if state.processed.contains(&signature) {
            return Err(rejection(
                "This transaction has already been processed",
                Vec::new(),
            ));
        }
        let instructions = parsed
            .tx
            .decompile()
            .map_err(|e| rejection(e.to_string(), Vec::new()))?;

        let mut accounts = state.accounts.clone();
        let mut logs = Vec::new();
        let mut bank = Bank {
            accounts: &mut accounts,
            program_id: self.program_id,
        };

        let fee = LAMPORTS_PER_SIGNATURE * parsed.signatures.len() as u64;
        bank.debit(&parsed.tx.account_keys[0], fee)
            .map_err(|_| rejection("insufficient funds for fee", Vec::new()))?;

        for (index, ix) in instructions.iter().enumerate() {
            if let Err(message) = bank.execute(ix, &mut logs) {
                logs.push(format!("Program failed: {message}"));
                return Err(rejection(
                    format!("Error processing Instruction {index}: {message}"),
                    logs,
                ));
            }
        }

        state.accounts = accounts;
        state.processed.push(signature.clone());
        Ok(signature)
    }

    async fn confirm_transaction(&self, signature: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.processed.iter().any(|s| s == signature) {
            Ok(())
        } else {
            Err(QfError::TransportFailure(format!(
                "transaction {signature} not confirmed"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction execution
// ---------------------------------------------------------------------------

type Outcome<T = ()> = std::result::Result<T, String>;

fn key(ix: &SolInstruction, index: usize) -> Outcome<[u8; 32]> {
    ix.accounts
        .get(index)
        .map(|m| m.pubkey)
        .ok_or_else(|| "not enough account keys".to_string())
}

fn require_signer(ix: &SolInstruction, index: usize) -> Outcome {
    if ix.accounts.get(index).is_some_and(|m| m.is_signer) {
        Ok(())
    } else {
        Err("missing required signature for instruction".into())
    }
}

fn u64_at(data: &[u8], at: usize) -> Outcome<u64> {
    data.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| "invalid instruction data".to_string())
}

fn overflow() -> String {
    "arithmetic overflow".to_string()
}

struct Bank<'a> {
    accounts: &'a mut HashMap<[u8; 32], AccountSnapshot>,
    program_id: [u8; 32],
}

impl Bank<'_> {
    fn execute(&mut self, ix: &SolInstruction, logs: &mut Vec<String>) -> Outcome {
        if ix.program_id == SYSTEM_PROGRAM_ID {
            self.system(ix)
        } else if ix.program_id == TOKEN_PROGRAM_ID {
            self.token_program(ix)
        } else if ix.program_id == ASSOCIATED_TOKEN_PROGRAM_ID {
            require_signer(ix, 0)?;
            self.create_associated(&key(ix, 0)?, &key(ix, 1)?, &key(ix, 2)?, &key(ix, 3)?)
        } else if ix.program_id == self.program_id {
            self.quadratic_funding(ix, logs)
        } else {
            Err("unknown program".into())
        }
    }

    // -- accounts -----------------------------------------------------------

    fn get(&self, address: &[u8; 32]) -> Outcome<AccountSnapshot> {
        self.accounts
            .get(address)
            .cloned()
            .ok_or_else(|| "account not found".to_string())
    }

    fn lamports(&self, address: &[u8; 32]) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.lamports)
    }

    fn debit(&mut self, address: &[u8; 32], lamports: u64) -> Outcome {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| "insufficient funds".to_string())?;
        account.lamports = account
            .lamports
            .checked_sub(lamports)
            .ok_or_else(|| "insufficient funds".to_string())?;
        Ok(())
    }

    fn credit(&mut self, address: &[u8; 32], lamports: u64) {
        self.accounts
            .entry(*address)
            .or_insert_with(|| AccountSnapshot {
                lamports: 0,
                owner: SYSTEM_PROGRAM_ID,
                data: Vec::new(),
            })
            .lamports += lamports;
    }

    fn token(&self, address: &[u8; 32]) -> Outcome<TokenAccount> {
        let account = self.get(address)?;
        if account.owner != TOKEN_PROGRAM_ID {
            return Err("invalid account owner".into());
        }
        let token = TokenAccount::unpack(&account.data).map_err(|e| e.to_string())?;
        if token.state != AccountState::Initialized {
            return Err("uninitialized account".into());
        }
        Ok(token)
    }

    fn store_token(&mut self, address: &[u8; 32], token: &TokenAccount) {
        if let Some(account) = self.accounts.get_mut(address) {
            account.data = token.pack().to_vec();
        }
    }

    fn program_data(&self, address: &[u8; 32]) -> Outcome<Vec<u8>> {
        let account = self.get(address)?;
        if account.owner != self.program_id {
            return Err("incorrect program id for instruction".into());
        }
        Ok(account.data)
    }

    fn store(&mut self, address: &[u8; 32], data: Vec<u8>) {
        if let Some(account) = self.accounts.get_mut(address) {
            account.data = data;
        }
    }

    fn round(&self, address: &[u8; 32]) -> Outcome<Round> {
        Round::unpack(&self.program_data(address)?).map_err(|e| e.to_string())
    }

    fn project(&self, address: &[u8; 32]) -> Outcome<Project> {
        Project::unpack(&self.program_data(address)?).map_err(|e| e.to_string())
    }

    /// A fresh program-owned account: right size, all zero, rent exempt.
    fn blank_record(&self, address: &[u8; 32], len: usize) -> Outcome {
        let account = self.get(address)?;
        if account.owner != self.program_id {
            return Err("incorrect program id for instruction".into());
        }
        if account.data.len() != len {
            return Err("invalid account data for instruction".into());
        }
        if account.data.iter().any(|&b| b != 0) {
            return Err("account already initialized".into());
        }
        if account.lamports < rent(len) {
            return Err("account not rent exempt".into());
        }
        Ok(())
    }

    fn token_transfer(&mut self, from: &[u8; 32], to: &[u8; 32], amount: u64) -> Outcome {
        let mut source = self.token(from)?;
        let mut destination = self.token(to)?;
        if source.mint != destination.mint {
            return Err("account not associated with this mint".into());
        }
        if source.amount < amount {
            return Err("insufficient funds".into());
        }
        if from == to {
            return Ok(());
        }
        source.amount -= amount;
        destination.amount = destination.amount.checked_add(amount).ok_or_else(overflow)?;
        self.store_token(from, &source);
        self.store_token(to, &destination);
        if source.is_native.is_some() {
            self.debit(from, amount)?;
            self.credit(to, amount);
        }
        Ok(())
    }

    /// `TransferChecked` as invoked by the program with the caller's signer.
    fn checked_transfer(
        &mut self,
        ix: &SolInstruction,
        (source, mint, destination, authority): (usize, usize, usize, usize),
        amount: u64,
        decimals: u8,
    ) -> Outcome {
        require_signer(ix, authority)?;
        let from = key(ix, source)?;
        if self.token(&from)?.owner != key(ix, authority)? {
            return Err("owner does not match".into());
        }
        if key(ix, mint)? != NATIVE_MINT || decimals != NATIVE_DECIMALS {
            return Err("invalid mint or decimals".into());
        }
        self.token_transfer(&from, &key(ix, destination)?, amount)
    }

    fn create_associated(
        &mut self,
        payer: &[u8; 32],
        address: &[u8; 32],
        wallet: &[u8; 32],
        mint: &[u8; 32],
    ) -> Outcome {
        let expected = derive_associated_token_address(wallet, mint).map_err(|e| e.to_string())?;
        if *address != expected {
            return Err("invalid seeds for associated token account".into());
        }
        if self.accounts.get(address).is_some_and(|a| !a.data.is_empty()) {
            return Err("account already in use".into());
        }
        if *mint != NATIVE_MINT {
            return Err("unsupported mint".into());
        }
        let reserve = rent(TOKEN_ACCOUNT_LEN);
        self.debit(payer, reserve)?;
        let token = TokenAccount {
            mint: *mint,
            owner: *wallet,
            amount: 0,
            state: AccountState::Initialized,
            is_native: Some(reserve),
        };
        self.accounts.insert(
            *address,
            AccountSnapshot {
                lamports: reserve,
                owner: TOKEN_PROGRAM_ID,
                data: token.pack().to_vec(),
            },
        );
        Ok(())
    }

    // -- system program -----------------------------------------------------

    fn system(&mut self, ix: &SolInstruction) -> Outcome {
        let index = ix
            .data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or_else(|| "invalid instruction data".to_string())?;
        match index {
            0 => {
                if ix.data.len() != 52 {
                    return Err("invalid instruction data".into());
                }
                let lamports = u64_at(&ix.data, 4)?;
                let space = u64_at(&ix.data, 12)? as usize;
                let mut owner = [0u8; 32];
                owner.copy_from_slice(&ix.data[20..52]);

                require_signer(ix, 0)?;
                require_signer(ix, 1)?;
                let (from, new) = (key(ix, 0)?, key(ix, 1)?);
                if self
                    .accounts
                    .get(&new)
                    .is_some_and(|a| a.lamports > 0 || !a.data.is_empty())
                {
                    return Err("account already in use".into());
                }
                self.debit(&from, lamports)?;
                self.accounts.insert(
                    new,
                    AccountSnapshot {
                        lamports,
                        owner,
                        data: vec![0; space],
                    },
                );
                Ok(())
            }
            2 => {
                require_signer(ix, 0)?;
                let lamports = u64_at(&ix.data, 4)?;
                self.debit(&key(ix, 0)?, lamports)?;
                self.credit(&key(ix, 1)?, lamports);
                Ok(())
            }
            _ => Err("unsupported system instruction".into()),
        }
    }

    // -- token program ------------------------------------------------------

    fn token_program(&mut self, ix: &SolInstruction) -> Outcome {
        match ix.data.first() {
            Some(1) => {
                let address = key(ix, 0)?;
                let account = self.get(&address)?;
                if account.owner != TOKEN_PROGRAM_ID || account.data.len() != TOKEN_ACCOUNT_LEN {
                    return Err("invalid account data for instruction".into());
                }
                if account.data[108] != 0 {
                    return Err("account already in use".into());
                }
                if key(ix, 1)? != NATIVE_MINT {
                    return Err("unsupported mint".into());
                }
                let reserve = rent(TOKEN_ACCOUNT_LEN);
                let amount = account
                    .lamports
                    .checked_sub(reserve)
                    .ok_or_else(|| "account not rent exempt".to_string())?;
                let token = TokenAccount {
                    mint: NATIVE_MINT,
                    owner: key(ix, 2)?,
                    amount,
                    state: AccountState::Initialized,
                    is_native: Some(reserve),
                };
                self.store_token(&address, &token);
                Ok(())
            }
            Some(3) => {
                let amount = u64_at(&ix.data, 1)?;
                require_signer(ix, 2)?;
                let from = key(ix, 0)?;
                if self.token(&from)?.owner != key(ix, 2)? {
                    return Err("owner does not match".into());
                }
                self.token_transfer(&from, &key(ix, 1)?, amount)
            }
            Some(9) => {
                require_signer(ix, 2)?;
                let address = key(ix, 0)?;
                let token = self.token(&address)?;
                if token.owner != key(ix, 2)? {
                    return Err("owner does not match".into());
                }
                if token.is_native.is_none() && token.amount != 0 {
                    return Err("non-native account can only be closed if its balance is zero".into());
                }
                let lamports = self.lamports(&address);
                self.accounts.remove(&address);
                self.credit(&key(ix, 1)?, lamports);
                Ok(())
            }
            _ => Err("unsupported token instruction".into()),
        }
    }

    // -- quadratic funding --------------------------------------------------

    fn quadratic_funding(&mut self, ix: &SolInstruction, logs: &mut Vec<String>) -> Outcome {
        let instruction = QfInstruction::unpack(&ix.data).map_err(|e| e.to_string())?;
        logs.push(format!("Program log: Instruction: {}", instruction.name()));
        match instruction {
            QfInstruction::StartRound => self.start_round(ix),
            QfInstruction::Donate { amount, decimals } => self.donate(ix, amount, decimals),
            QfInstruction::RegisterProject => self.register_project(ix),
            QfInstruction::InitVoter => self.init_voter(ix),
            QfInstruction::Vote { amount, decimals } => self.vote(ix, amount, decimals),
            QfInstruction::Withdraw => self.withdraw(ix),
            QfInstruction::EndRound => self.end_round(ix),
            QfInstruction::WithdrawFee => self.withdraw_fee(ix),
        }
    }

    fn start_round(&mut self, ix: &SolInstruction) -> Outcome {
        let round_key = key(ix, 0)?;
        let owner = key(ix, 1)?;
        let payer = key(ix, 3)?;
        let vault = key(ix, 4)?;
        self.blank_record(&round_key, Round::LEN)?;

        let (vault_owner, _) =
            pda::vault_owner_address(&self.program_id, &round_key).map_err(|e| e.to_string())?;
        if key(ix, 5)? != vault_owner {
            return Err(OWNER_MISMATCH.into());
        }
        if !self.accounts.contains_key(&vault) {
            require_signer(ix, 3)?;
            self.create_associated(&payer, &vault, &vault_owner, &NATIVE_MINT)?;
        }
        let token = self.token(&vault)?;
        if token.owner != vault_owner {
            return Err(OWNER_MISMATCH.into());
        }

        let round = Round {
            status: RoundStatus::Active,
            fund: token.amount,
            fee: 0,
            vault,
            owner,
            area: U256::ZERO,
        };
        self.store(&round_key, round.pack());
        Ok(())
    }

    fn donate(&mut self, ix: &SolInstruction, amount: u64, decimals: u8) -> Outcome {
        let round_key = key(ix, 0)?;
        let mut round = self.round(&round_key)?;
        if round.status != RoundStatus::Active {
            return Err(ROUND_STATUS.into());
        }
        if key(ix, 3)? != round.vault {
            return Err(VAULT_MISMATCH.into());
        }
        self.checked_transfer(ix, (1, 2, 3, 4), amount, decimals)?;
        round.fund = round.fund.checked_add(amount).ok_or_else(overflow)?;
        self.store(&round_key, round.pack());
        Ok(())
    }

    fn register_project(&mut self, ix: &SolInstruction) -> Outcome {
        let project_key = key(ix, 0)?;
        let round_key = key(ix, 1)?;
        if self.round(&round_key)?.status != RoundStatus::Active {
            return Err(ROUND_STATUS.into());
        }
        self.blank_record(&project_key, Project::LEN)?;

        let project = Project {
            round: round_key,
            owner: key(ix, 2)?,
            withdraw: false,
            votes: 0,
            area: U256::ZERO,
            area_sqrt: U256::ZERO,
        };
        self.store(&project_key, project.pack());
        Ok(())
    }

    fn init_voter(&mut self, ix: &SolInstruction) -> Outcome {
        let voter_key = key(ix, 0)?;
        let voter_token = key(ix, 1)?;
        let project_key = key(ix, 2)?;
        let payer = key(ix, 3)?;
        self.project(&project_key)?;

        let (expected, _) = pda::voter_address(&self.program_id, &project_key, &voter_token)
            .map_err(|e| e.to_string())?;
        if voter_key != expected {
            return Err("invalid seeds for program address".into());
        }
        if self
            .accounts
            .get(&voter_key)
            .is_some_and(|a| a.owner == self.program_id && a.data.first() == Some(&1))
        {
            return Err("account already initialized".into());
        }

        require_signer(ix, 3)?;
        let required = rent(Voter::LEN).saturating_sub(self.lamports(&voter_key));
        if required > 0 {
            self.debit(&payer, required)?;
            self.credit(&voter_key, required);
        }

        let voter = Voter {
            is_init: true,
            votes: 0,
            votes_sqrt: U256::ZERO,
        };
        let program_id = self.program_id;
        let account = self
            .accounts
            .get_mut(&voter_key)
            .ok_or_else(|| "account not found".to_string())?;
        account.owner = program_id;
        account.data = voter.pack();
        Ok(())
    }

    fn vote(&mut self, ix: &SolInstruction, amount: u64, decimals: u8) -> Outcome {
        let round_key = key(ix, 0)?;
        let project_key = key(ix, 1)?;
        let voter_key = key(ix, 2)?;

        let mut round = self.round(&round_key)?;
        if round.status != RoundStatus::Active {
            return Err(ROUND_STATUS.into());
        }
        if key(ix, 5)? != round.vault {
            return Err(VAULT_MISMATCH.into());
        }
        let mut project = self.project(&project_key)?;
        let mut voter =
            Voter::unpack(&self.program_data(&voter_key)?).map_err(|e| e.to_string())?;

        self.checked_transfer(ix, (3, 4, 5, 6), amount, decimals)?;

        let one = U256::from(ONE);
        let votes = voter.votes.checked_add(amount).ok_or_else(overflow)?;
        let votes_sqrt = isqrt(U256::from(votes) * one * one);
        let area_sqrt = project
            .area_sqrt
            .checked_sub(voter.votes_sqrt)
            .and_then(|v| v.checked_add(votes_sqrt))
            .ok_or_else(overflow)?;

        round.area = round.area.checked_sub(project.area).ok_or_else(overflow)?;
        project.area = area_sqrt.checked_mul(area_sqrt).ok_or_else(overflow)? / one;
        round.area = round.area.checked_add(project.area).ok_or_else(overflow)?;
        project.area_sqrt = area_sqrt;
        project.votes = project.votes.checked_add(amount).ok_or_else(overflow)?;
        voter.votes = votes;
        voter.votes_sqrt = votes_sqrt;

        self.store(&round_key, round.pack());
        self.store(&project_key, project.pack());
        self.store(&voter_key, voter.pack());
        Ok(())
    }

    fn withdraw(&mut self, ix: &SolInstruction) -> Outcome {
        let round_key = key(ix, 0)?;
        let vault = key(ix, 1)?;
        let project_key = key(ix, 3)?;

        let mut round = self.round(&round_key)?;
        if round.status != RoundStatus::Ended {
            return Err(ROUND_STATUS.into());
        }
        let mut project = self.project(&project_key)?;
        if project.round != round_key {
            return Err(ROUND_MISMATCH.into());
        }
        if project.withdraw {
            return Err(ALREADY_WITHDRAWN.into());
        }
        require_signer(ix, 4)?;
        if project.owner != key(ix, 4)? {
            return Err(OWNER_MISMATCH.into());
        }
        if vault != round.vault {
            return Err(VAULT_MISMATCH.into());
        }

        let share = if round.area.is_zero() {
            0
        } else {
            let share = U256::from(round.fund) * project.area / round.area;
            u64::try_from(share).map_err(|_| overflow())?
        };
        let amount = project.votes.checked_add(share).ok_or_else(overflow)?;
        let fee = amount.checked_mul(5).ok_or_else(overflow)? / 100;
        self.token_transfer(&vault, &key(ix, 5)?, amount - fee)?;

        project.withdraw = true;
        round.fee = round.fee.checked_add(fee).ok_or_else(overflow)?;
        self.store(&project_key, project.pack());
        self.store(&round_key, round.pack());
        Ok(())
    }

    fn end_round(&mut self, ix: &SolInstruction) -> Outcome {
        let round_key = key(ix, 0)?;
        let mut round = self.round(&round_key)?;
        if round.status != RoundStatus::Active {
            return Err(ROUND_STATUS.into());
        }
        require_signer(ix, 1)?;
        if key(ix, 1)? != round.owner {
            return Err(OWNER_MISMATCH.into());
        }
        round.status = RoundStatus::Ended;
        self.store(&round_key, round.pack());
        Ok(())
    }

    fn withdraw_fee(&mut self, ix: &SolInstruction) -> Outcome {
        let round_key = key(ix, 0)?;
        let mut round = self.round(&round_key)?;
        if round.status != RoundStatus::Ended {
            return Err(ROUND_STATUS.into());
        }
        if round.fee == 0 {
            return Err("insufficient funds".into());
        }
        if key(ix, 1)? != round.owner {
            return Err(OWNER_MISMATCH.into());
        }
        require_signer(ix, 1)?;
        let vault = key(ix, 2)?;
        if vault != round.vault {
            return Err(VAULT_MISMATCH.into());
        }
        self.token_transfer(&vault, &key(ix, 4)?, round.fee)?;
        round.fee = 0;
        self.store(&round_key, round.pack());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub engine: Arc<Engine>,
    pub session: Session<Arc<Engine>>,
    pub payer: Arc<Keypair>,
}

impl Fixture {
    pub fn new() -> Self {
        let engine = Engine::new();
        let payer = Arc::new(Keypair::from_seed(&[0x01; 32]));
        engine.airdrop(&payer.pubkey(), 100 * SOL);
        let session = Session::new(Arc::clone(&engine), PROGRAM_ID, Arc::clone(&payer));
        Self {
            engine,
            session,
            payer,
        }
    }

    /// A funded wallet derived from `seed`.
    pub fn wallet(&self, seed: u8, lamports: u64) -> Keypair {
        let keypair = Keypair::from_seed(&[seed; 32]);
        self.engine.airdrop(&keypair.pubkey(), lamports);
        keypair
    }
}

pub fn assert_rejected(err: QfError, expected: &str) {
    match err {
        QfError::EngineRejection { message, .. } => assert!(
            message.contains(expected),
            "expected rejection containing {expected:?}, got {message:?}"
        ),
        other => panic!("expected engine rejection, got {other:?}"),
    }
}
