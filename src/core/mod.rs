//! Core value objects: Coin, Deposit, and shared key constants

pub mod coin;
pub mod deposit;
pub mod keys;

pub use coin::Coin;
pub use deposit::{Deposit, DepositKey};
