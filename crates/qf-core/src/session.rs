//! Workflows of the quadratic-funding program.
//!
//! Every workflow is one atomic batch. A workflow reads whatever state it
//! needs fresh from the ledger, builds its instructions into a
//! [`PreparedBatch`], then signs, submits and waits for confirmation. The
//! `prepare_*` methods stop before signing so callers can inspect a batch.
//!
//! Nothing is cached between calls and submissions are never retried.

use std::sync::Arc;

use chain_sol::system::create_account;
use chain_sol::{
    build_close_account, build_create_associated_token_account, build_initialize_account,
    build_spl_transfer, bytes_to_address, compile_transaction, sign_transaction, Keypair,
    Signer, SolInstruction, NATIVE_MINT, TOKEN_ACCOUNT_LEN, TOKEN_PROGRAM_ID,
};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{QfError, Result};
use crate::instruction::{
    self, StartRoundAccounts, TransferAccounts, WithdrawAccounts, WithdrawFeeAccounts,
};
use crate::ledger::Ledger;
use crate::pda;
use crate::plan::{plan_native_donation, plan_vote, Step};
use crate::reader::StateReader;
use crate::rpc::RpcLedger;
use crate::state::{Project, Round};

/// Where a new round's vault comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VaultMode {
    /// The vault owner's associated wrapped-SOL account, created by the
    /// program during `StartRound`.
    #[default]
    Associated,
    /// A fresh token account created and initialized in the same batch, with
    /// the vault owner as its authority.
    Fresh,
}

/// Funds used by a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationSource {
    /// An existing token account controlled by the donor.
    TokenAccount([u8; 32]),
    /// The donor's lamports, wrapped through a scratch account.
    Native,
}

/// A built, unsigned batch.
#[derive(Debug)]
pub struct PreparedBatch {
    workflow: &'static str,
    fee_payer: [u8; 32],
    instructions: Vec<SolInstruction>,
    /// Accounts allocated by this batch; they co-sign it.
    new_accounts: Vec<Keypair>,
    account: Option<[u8; 32]>,
}

impl PreparedBatch {
    fn new(workflow: &'static str, fee_payer: [u8; 32]) -> Self {
        Self {
            workflow,
            fee_payer,
            instructions: Vec::new(),
            new_accounts: Vec::new(),
            account: None,
        }
    }

    fn push(&mut self, ix: SolInstruction) {
        self.instructions.push(ix);
    }

    /// Generate a keypair for an account this batch allocates.
    fn allocate(&mut self) -> [u8; 32] {
        let keypair = Keypair::generate();
        let pubkey = keypair.pubkey();
        self.new_accounts.push(keypair);
        pubkey
    }

    pub fn workflow(&self) -> &'static str {
        self.workflow
    }

    pub fn fee_payer(&self) -> &[u8; 32] {
        &self.fee_payer
    }

    pub fn instructions(&self) -> &[SolInstruction] {
        &self.instructions
    }

    /// Addresses of the accounts allocated by this batch.
    pub fn new_accounts(&self) -> Vec<[u8; 32]> {
        self.new_accounts.iter().map(Signer::pubkey).collect()
    }

    /// The round, project or voter the workflow creates or acts on.
    pub fn account(&self) -> Option<[u8; 32]> {
        self.account
    }
}

/// Outcome of a confirmed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub signature: String,
    pub account: Option<[u8; 32]>,
}

/// Addresses a contribution batch moves funds between.
struct Contribution {
    contributor: [u8; 32],
    /// Contributor's associated wrapped-SOL account.
    associated: [u8; 32],
    round: [u8; 32],
    vault: [u8; 32],
    /// `(project, voter)` for votes.
    target: Option<([u8; 32], [u8; 32])>,
}

/// Ledger handle, program id and fee payer for a series of workflows.
///
/// Signers other than the fee payer are passed per call.
pub struct Session<L> {
    ledger: L,
    program_id: [u8; 32],
    payer: Arc<Keypair>,
}

impl Session<RpcLedger> {
    /// Session over JSON-RPC as described by `config`.
    pub fn connect(config: &ClientConfig, payer: Arc<Keypair>) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(RpcLedger::new(config)?, config.program_id()?, payer))
    }
}

impl<L: Ledger> Session<L> {
    pub fn new(ledger: L, program_id: [u8; 32], payer: Arc<Keypair>) -> Self {
        Self {
            ledger,
            program_id,
            payer,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn program_id(&self) -> &[u8; 32] {
        &self.program_id
    }

    pub fn payer(&self) -> [u8; 32] {
        self.payer.pubkey()
    }

    pub fn reader(&self) -> StateReader<'_, L> {
        StateReader::new(&self.ledger, self.program_id)
    }

    async fn rent(&self, space: usize) -> Result<u64> {
        self.ledger
            .get_minimum_balance_for_rent_exemption(space)
            .await
    }

    // -----------------------------------------------------------------------
    // New round
    // -----------------------------------------------------------------------

    pub async fn prepare_new_round(&self, owner: &[u8; 32], mode: VaultMode) -> Result<PreparedBatch> {
        let payer = self.payer();
        let mut batch = PreparedBatch::new("new_round", payer);

        let round = batch.allocate();
        let (vault_owner, _) = pda::vault_owner_address(&self.program_id, &round)?;
        let rent = self.rent(Round::LEN).await?;
        batch.push(create_account(
            &payer,
            &round,
            rent,
            Round::LEN as u64,
            &self.program_id,
        ));

        let vault = match mode {
            VaultMode::Associated => pda::vault_address(&self.program_id, &round)?,
            VaultMode::Fresh => {
                let vault = batch.allocate();
                let rent = self.rent(TOKEN_ACCOUNT_LEN).await?;
                batch.push(create_account(
                    &payer,
                    &vault,
                    rent,
                    TOKEN_ACCOUNT_LEN as u64,
                    &TOKEN_PROGRAM_ID,
                ));
                batch.push(build_initialize_account(&vault, &NATIVE_MINT, &vault_owner));
                vault
            }
        };

        batch.push(instruction::start_round(
            &self.program_id,
            &StartRoundAccounts {
                round,
                owner: *owner,
                payer,
                vault,
                vault_owner,
            },
        ));
        batch.account = Some(round);
        debug!(
            round = %bytes_to_address(&round),
            vault = %bytes_to_address(&vault),
            ?mode,
            "prepared new round"
        );
        Ok(batch)
    }

    /// Create and start a round owned by `owner`. The receipt carries the
    /// round address; the vault is recorded in the round itself.
    pub async fn new_round(&self, owner: &[u8; 32], mode: VaultMode) -> Result<Receipt> {
        let batch = self.prepare_new_round(owner, mode).await?;
        self.submit(batch, &[]).await
    }

    // -----------------------------------------------------------------------
    // Register project
    // -----------------------------------------------------------------------

    pub async fn prepare_register_project(
        &self,
        round: &[u8; 32],
        project_owner: &[u8; 32],
    ) -> Result<PreparedBatch> {
        let payer = self.payer();
        let mut batch = PreparedBatch::new("register_project", payer);

        let project = batch.allocate();
        let rent = self.rent(Project::LEN).await?;
        batch.push(create_account(
            &payer,
            &project,
            rent,
            Project::LEN as u64,
            &self.program_id,
        ));
        batch.push(instruction::register_project(
            &self.program_id,
            &project,
            round,
            project_owner,
        ));
        batch.account = Some(project);
        Ok(batch)
    }

    /// Register a project in `round`. The project owner does not sign.
    pub async fn register_project(
        &self,
        round: &[u8; 32],
        project_owner: &[u8; 32],
    ) -> Result<Receipt> {
        let batch = self.prepare_register_project(round, project_owner).await?;
        self.submit(batch, &[]).await
    }

    // -----------------------------------------------------------------------
    // Init voter
    // -----------------------------------------------------------------------

    pub fn prepare_init_voter(
        &self,
        project: &[u8; 32],
        voter_token: &[u8; 32],
    ) -> Result<PreparedBatch> {
        let payer = self.payer();
        let (voter, _) = pda::voter_address(&self.program_id, project, voter_token)?;
        let mut batch = PreparedBatch::new("init_voter", payer);
        batch.push(instruction::init_voter(
            &self.program_id,
            &voter,
            voter_token,
            project,
            &payer,
        ));
        batch.account = Some(voter);
        Ok(batch)
    }

    /// Create the voter record for `(project, voter_token)`. A second call for
    /// the same pair is rejected by the engine.
    pub async fn init_voter(&self, project: &[u8; 32], voter_token: &[u8; 32]) -> Result<Receipt> {
        let batch = self.prepare_init_voter(project, voter_token)?;
        self.submit(batch, &[]).await
    }

    // -----------------------------------------------------------------------
    // Donate
    // -----------------------------------------------------------------------

    pub async fn prepare_donate(
        &self,
        round: &[u8; 32],
        source: DonationSource,
        donor: &[u8; 32],
        amount: u64,
        decimals: u8,
    ) -> Result<PreparedBatch> {
        let vault = self.reader().round(round).await?.vault;
        let mut batch = PreparedBatch::new("donate", self.payer());
        batch.account = Some(*round);

        match source {
            DonationSource::TokenAccount(account) => {
                let mint = self
                    .reader()
                    .token_account(&account)
                    .await?
                    .ok_or_else(|| {
                        QfError::NotFound(format!("token account {}", bytes_to_address(&account)))
                    })?
                    .mint;
                batch.push(instruction::donate(
                    &self.program_id,
                    &TransferAccounts {
                        round: *round,
                        source: account,
                        mint,
                        vault,
                        authority: *donor,
                    },
                    amount,
                    decimals,
                ));
            }
            DonationSource::Native => {
                let steps = plan_native_donation(amount, decimals);
                let contribution = Contribution {
                    contributor: *donor,
                    associated: pda::contributor_token_address(donor)?,
                    round: *round,
                    vault,
                    target: None,
                };
                self.lower(&mut batch, &steps, &contribution).await?;
            }
        }
        Ok(batch)
    }

    /// Donate `amount` to the round's matching pool.
    pub async fn donate(
        &self,
        round: &[u8; 32],
        source: DonationSource,
        donor: &dyn Signer,
        amount: u64,
        decimals: u8,
    ) -> Result<Receipt> {
        let batch = self
            .prepare_donate(round, source, &donor.pubkey(), amount, decimals)
            .await?;
        self.submit(batch, &[donor]).await
    }

    // -----------------------------------------------------------------------
    // Vote
    // -----------------------------------------------------------------------

    /// Build a vote from `contributor`'s associated wrapped-SOL account,
    /// creating and topping it up as needed.
    ///
    /// Fails with [`QfError::PreconditionUnmet`] when the voter record for
    /// that account is missing or not initialized.
    pub async fn prepare_vote(
        &self,
        project: &[u8; 32],
        contributor: &[u8; 32],
        amount: u64,
        decimals: u8,
    ) -> Result<PreparedBatch> {
        let reader = self.reader();
        let associated = pda::contributor_token_address(contributor)?;
        let (voter, _) = pda::voter_address(&self.program_id, project, &associated)?;

        match reader.voter_if_exists(&voter).await? {
            Some(record) if record.is_init => {}
            _ => {
                return Err(QfError::PreconditionUnmet {
                    step: "init_voter".to_string(),
                    detail: format!(
                        "no initialized voter {} for project {}",
                        bytes_to_address(&voter),
                        bytes_to_address(project)
                    ),
                })
            }
        }

        let round = reader.project(project).await?.round;
        let vault = reader.round(&round).await?.vault;
        let source = reader.token_account(&associated).await?;
        let steps = plan_vote(source.as_ref(), amount, decimals);

        let mut batch = PreparedBatch::new("vote", self.payer());
        batch.account = Some(voter);
        let contribution = Contribution {
            contributor: *contributor,
            associated,
            round,
            vault,
            target: Some((*project, voter)),
        };
        self.lower(&mut batch, &steps, &contribution).await?;
        Ok(batch)
    }

    pub async fn vote(
        &self,
        project: &[u8; 32],
        contributor: &dyn Signer,
        amount: u64,
        decimals: u8,
    ) -> Result<Receipt> {
        let batch = self
            .prepare_vote(project, &contributor.pubkey(), amount, decimals)
            .await?;
        self.submit(batch, &[contributor]).await
    }

    /// Turn planned steps into instructions.
    async fn lower(
        &self,
        batch: &mut PreparedBatch,
        steps: &[Step],
        c: &Contribution,
    ) -> Result<()> {
        let needs_scratch = steps
            .iter()
            .any(|s| matches!(s, Step::CreateScratchAccount { .. }));
        let (scratch, scratch_rent) = if needs_scratch {
            (Some(batch.allocate()), self.rent(TOKEN_ACCOUNT_LEN).await?)
        } else {
            (None, 0)
        };
        let scratch = || {
            scratch.ok_or_else(|| {
                QfError::TransactionBuild("scratch account used before creation".into())
            })
        };

        for step in steps {
            let ix = match *step {
                Step::CreateAssociatedAccount => build_create_associated_token_account(
                    &self.payer(),
                    &c.contributor,
                    &NATIVE_MINT,
                )?,
                Step::CreateScratchAccount { lamports } => {
                    let total = scratch_rent.checked_add(lamports).ok_or_else(|| {
                        QfError::TransactionBuild("scratch balance overflows u64".into())
                    })?;
                    create_account(
                        &c.contributor,
                        &scratch()?,
                        total,
                        TOKEN_ACCOUNT_LEN as u64,
                        &TOKEN_PROGRAM_ID,
                    )
                }
                Step::InitializeScratchAccount => {
                    build_initialize_account(&scratch()?, &NATIVE_MINT, &c.contributor)
                }
                Step::TransferFromScratch { amount } => {
                    build_spl_transfer(&scratch()?, &c.associated, &c.contributor, amount)?
                }
                Step::CloseScratchAccount => {
                    build_close_account(&scratch()?, &c.contributor, &c.contributor)
                }
                Step::DonateFromScratch { amount, decimals } => instruction::donate(
                    &self.program_id,
                    &TransferAccounts {
                        round: c.round,
                        source: scratch()?,
                        mint: NATIVE_MINT,
                        vault: c.vault,
                        authority: c.contributor,
                    },
                    amount,
                    decimals,
                ),
                Step::Vote { amount, decimals } => {
                    let (project, voter) = c.target.ok_or_else(|| {
                        QfError::TransactionBuild("vote step without a project".into())
                    })?;
                    instruction::vote(
                        &self.program_id,
                        &TransferAccounts {
                            round: c.round,
                            source: c.associated,
                            mint: NATIVE_MINT,
                            vault: c.vault,
                            authority: c.contributor,
                        },
                        &project,
                        &voter,
                        amount,
                        decimals,
                    )
                }
            };
            batch.push(ix);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Withdraw
    // -----------------------------------------------------------------------

    /// Build a project withdrawal. Status and the withdraw latch are left to
    /// the engine.
    pub async fn prepare_withdraw(
        &self,
        round: &[u8; 32],
        project: &[u8; 32],
        project_owner: &[u8; 32],
        destination: &[u8; 32],
    ) -> Result<PreparedBatch> {
        let vault = self.reader().round(round).await?.vault;
        let (vault_owner, _) = pda::vault_owner_address(&self.program_id, round)?;

        let mut batch = PreparedBatch::new("withdraw", self.payer());
        batch.push(instruction::withdraw(
            &self.program_id,
            &WithdrawAccounts {
                round: *round,
                vault,
                vault_owner,
                project: *project,
                project_owner: *project_owner,
                destination: *destination,
            },
        ));
        batch.account = Some(*project);
        Ok(batch)
    }

    pub async fn withdraw(
        &self,
        round: &[u8; 32],
        project: &[u8; 32],
        project_owner: &dyn Signer,
        destination: &[u8; 32],
    ) -> Result<Receipt> {
        let batch = self
            .prepare_withdraw(round, project, &project_owner.pubkey(), destination)
            .await?;
        self.submit(batch, &[project_owner]).await
    }

    // -----------------------------------------------------------------------
    // End round
    // -----------------------------------------------------------------------

    /// The owner both signs and pays for this batch.
    pub fn prepare_end_round(&self, round: &[u8; 32], owner: &[u8; 32]) -> PreparedBatch {
        let mut batch = PreparedBatch::new("end_round", *owner);
        batch.push(instruction::end_round(&self.program_id, round, owner));
        batch.account = Some(*round);
        batch
    }

    pub async fn end_round(&self, round: &[u8; 32], owner: &dyn Signer) -> Result<Receipt> {
        let batch = self.prepare_end_round(round, &owner.pubkey());
        self.submit(batch, &[owner]).await
    }

    // -----------------------------------------------------------------------
    // Withdraw fee
    // -----------------------------------------------------------------------

    pub async fn prepare_withdraw_fee(
        &self,
        round: &[u8; 32],
        owner: &[u8; 32],
        destination: &[u8; 32],
    ) -> Result<PreparedBatch> {
        let vault = self.reader().round(round).await?.vault;
        let (vault_owner, _) = pda::vault_owner_address(&self.program_id, round)?;

        let mut batch = PreparedBatch::new("withdraw_fee", self.payer());
        batch.push(instruction::withdraw_fee(
            &self.program_id,
            &WithdrawFeeAccounts {
                round: *round,
                owner: *owner,
                vault,
                vault_owner,
                destination: *destination,
            },
        ));
        batch.account = Some(*round);
        Ok(batch)
    }

    /// Collect the accrued platform fee. Can be repeated as fees accrue.
    pub async fn withdraw_fee(
        &self,
        round: &[u8; 32],
        owner: &dyn Signer,
        destination: &[u8; 32],
    ) -> Result<Receipt> {
        let batch = self
            .prepare_withdraw_fee(round, &owner.pubkey(), destination)
            .await?;
        self.submit(batch, &[owner]).await
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Sign `batch` and submit it, then wait for confirmation.
    ///
    /// The session payer, the batch's new accounts and `signers` are offered;
    /// only those the batch actually requires sign.
    pub async fn submit(&self, batch: PreparedBatch, signers: &[&dyn Signer]) -> Result<Receipt> {
        let blockhash = self.ledger.get_latest_blockhash().await?;
        let wire = {
            let tx = compile_transaction(&batch.instructions, &batch.fee_payer, &blockhash)?;
            let required = tx.signer_keys();

            let mut available: Vec<&dyn Signer> = vec![&*self.payer as &dyn Signer];
            available.extend(batch.new_accounts.iter().map(|k| k as &dyn Signer));
            available.extend_from_slice(signers);
            available.retain(|s| required.contains(&s.pubkey()));

            sign_transaction(&tx, &available)?
        };

        let signature = match self.ledger.send_transaction(&wire).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(workflow = batch.workflow, error = %e, "submission failed");
                return Err(e);
            }
        };
        self.ledger.confirm_transaction(&signature).await?;
        info!(workflow = batch.workflow, %signature, "batch confirmed");

        Ok(Receipt {
            signature,
            account: batch.account,
        })
    }
}
