//! Typed reads of program and token accounts.

use chain_sol::{bytes_to_address, TokenAccount, TOKEN_PROGRAM_ID};

use crate::error::{QfError, Result};
use crate::ledger::Ledger;
use crate::state::{Project, Round, Voter};

/// Reads records owned by one program through a [`Ledger`].
///
/// Nothing is cached; every call goes to the ledger.
pub struct StateReader<'a, L: ?Sized> {
    ledger: &'a L,
    program_id: [u8; 32],
}

impl<'a, L: Ledger + ?Sized> StateReader<'a, L> {
    pub fn new(ledger: &'a L, program_id: [u8; 32]) -> Self {
        Self { ledger, program_id }
    }

    pub async fn round(&self, address: &[u8; 32]) -> Result<Round> {
        Round::unpack(&self.program_data(address, "round").await?)
    }

    pub async fn project(&self, address: &[u8; 32]) -> Result<Project> {
        Project::unpack(&self.program_data(address, "project").await?)
    }

    pub async fn voter(&self, address: &[u8; 32]) -> Result<Voter> {
        Voter::unpack(&self.program_data(address, "voter").await?)
    }

    /// Like [`StateReader::voter`] but a missing account is `None`.
    pub async fn voter_if_exists(&self, address: &[u8; 32]) -> Result<Option<Voter>> {
        match self.voter(address).await {
            Ok(voter) => Ok(Some(voter)),
            Err(QfError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// SPL token account at `address`, `None` if it does not exist.
    pub async fn token_account(&self, address: &[u8; 32]) -> Result<Option<TokenAccount>> {
        let Some(account) = self.ledger.get_account(address).await? else {
            return Ok(None);
        };
        if account.owner != TOKEN_PROGRAM_ID {
            return Err(QfError::DecodeMismatch(format!(
                "{} is not a token account",
                bytes_to_address(address)
            )));
        }
        Ok(Some(TokenAccount::unpack(&account.data)?))
    }

    async fn program_data(&self, address: &[u8; 32], kind: &str) -> Result<Vec<u8>> {
        let account = self.ledger.get_account(address).await?.ok_or_else(|| {
            QfError::NotFound(format!("{kind} {}", bytes_to_address(address)))
        })?;
        if account.owner != self.program_id {
            return Err(QfError::DecodeMismatch(format!(
                "{kind} {} is owned by {}, not the program",
                bytes_to_address(address),
                bytes_to_address(&account.owner)
            )));
        }
        Ok(account.data)
    }
}
