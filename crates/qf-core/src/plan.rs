//! Funding decisions for contributions.
//!
//! Planning is pure: it looks at the contributor's token account as last read
//! from the ledger and returns the ordered steps of the batch. The session
//! turns the steps into instructions.

use chain_sol::TokenAccount;
use tracing::debug;

/// One step of a contribution batch.
///
/// The scratch account is a throwaway wrapped-SOL token account owned by the
/// contributor. It is created with `rent + lamports`, initialized, drained and
/// closed back to the contributor within the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Create the contributor's associated token account.
    CreateAssociatedAccount,
    /// Allocate the scratch account holding `lamports` on top of its rent.
    CreateScratchAccount { lamports: u64 },
    InitializeScratchAccount,
    /// Move `amount` from the scratch account into the associated account.
    TransferFromScratch { amount: u64 },
    CloseScratchAccount,
    /// `Donate` with the scratch account as source.
    DonateFromScratch { amount: u64, decimals: u8 },
    /// `Vote` with the associated account as source.
    Vote { amount: u64, decimals: u8 },
}

fn top_up(amount: u64) -> [Step; 4] {
    [
        Step::CreateScratchAccount { lamports: amount },
        Step::InitializeScratchAccount,
        Step::TransferFromScratch { amount },
        Step::CloseScratchAccount,
    ]
}

/// Steps for a vote of `amount` drawn from `source`, the contributor's
/// associated token account (`None` when it does not exist yet).
///
/// An existing account is only topped up by the shortfall.
pub fn plan_vote(source: Option<&TokenAccount>, amount: u64, decimals: u8) -> Vec<Step> {
    let mut steps = Vec::with_capacity(6);
    match source {
        Some(account) if account.amount >= amount => {
            debug!(balance = account.amount, amount, "source covers vote");
        }
        Some(account) => {
            let shortfall = amount - account.amount;
            debug!(balance = account.amount, amount, shortfall, "topping up source");
            steps.extend(top_up(shortfall));
        }
        None => {
            debug!(amount, "source missing, creating associated account");
            steps.push(Step::CreateAssociatedAccount);
            if amount > 0 {
                steps.extend(top_up(amount));
            }
        }
    }
    steps.push(Step::Vote { amount, decimals });
    steps
}

/// Steps for donating `amount` lamports straight from the contributor's
/// native balance.
pub fn plan_native_donation(amount: u64, decimals: u8) -> Vec<Step> {
    debug!(amount, "wrapping native balance for donation");
    vec![
        Step::CreateScratchAccount { lamports: amount },
        Step::InitializeScratchAccount,
        Step::DonateFromScratch { amount, decimals },
        Step::CloseScratchAccount,
    ]
}
