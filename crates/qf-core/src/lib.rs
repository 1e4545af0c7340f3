//! Client for the quadratic-funding program.
//!
//! Rounds collect donations into a wrapped-SOL vault; contributors vote for
//! projects with their own funds, and at the end of the round each project
//! withdraws its votes plus a share of the pool weighted by the square of the
//! summed square roots of its votes.
//!
//! The crate encodes the program's instructions and records, derives its
//! addresses, reads its state through a [`Ledger`], and runs each workflow as
//! one atomic batch through a [`Session`].

pub mod config;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod pda;
pub mod plan;
pub mod reader;
pub mod rpc;
pub mod session;
pub mod state;

pub use config::{ClientConfig, Commitment};
pub use error::{QfError, Result};
pub use instruction::QfInstruction;
pub use ledger::{AccountSnapshot, Ledger};
pub use plan::{plan_native_donation, plan_vote, Step};
pub use reader::StateReader;
pub use rpc::RpcLedger;
pub use session::{DonationSource, PreparedBatch, Receipt, Session, VaultMode};
pub use state::{Project, Round, RoundStatus, Voter};
