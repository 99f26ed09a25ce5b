//! Typed access to the expense tracker's REST API.

mod client;
mod types;

pub use client::{ExpenseClient, Fetched, Mutation};
pub use types::{
  Balance, Category, CategoryInput, Period, Statistics, Transaction, TransactionInput,
  TransactionType,
};
