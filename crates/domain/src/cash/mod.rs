//! Wallets and their ledgers.

mod cash_log;
mod wallet;

pub use cash_log::{CashLog, CashLogKind, CashLogRef};
pub use wallet::{Wallet, WalletError};
