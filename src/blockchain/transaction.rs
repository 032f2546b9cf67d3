use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Exact decimal amount carried by inputs and outputs
pub type Amount = Decimal;

/// Errors that make a transaction invalid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("inputs sum to {inputs} but outputs sum to {outputs}")]
    Unbalanced { inputs: Amount, outputs: Amount },

    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("negative amount: {0}")]
    NegativeAmount(Amount),

    #[error("amount overflow while summing")]
    Overflow,
}

/// Represents a participant address (node, miner or user name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Address(address.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value leaving a sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionInput {
    pub sender: Address,

    #[schema(value_type = String, example = "5.25")]
    pub amount: Amount,
}

/// Value credited to a receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionOutput {
    pub receiver: Address,

    #[schema(value_type = String, example = "5.25")]
    pub amount: Amount,
}

/// Transaction payload as submitted by a client, before an identifier is assigned
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
}

/// Represents a transfer of value between addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Amounts taken from senders
    pub inputs: Vec<TransactionInput>,

    /// Amounts credited to receivers
    pub outputs: Vec<TransactionOutput>,
}

impl Transaction {
    /// Creates a new transaction with a fresh identifier
    ///
    /// No validation happens here, see [`Transaction::validate`].
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            inputs,
            outputs,
        }
    }

    /// Creates a new coinbase transaction (mining reward)
    ///
    /// # Arguments
    ///
    /// * `node_address` - The synthetic sender, the address of the mining node
    /// * `miner_address` - The address credited with the reward
    /// * `reward` - The reward amount
    pub fn new_coinbase(node_address: Address, miner_address: Address, reward: Amount) -> Self {
        Transaction::new(
            vec![TransactionInput {
                sender: node_address,
                amount: reward,
            }],
            vec![TransactionOutput {
                receiver: miner_address,
                amount: reward,
            }],
        )
    }

    /// Sum of all input amounts
    pub fn input_total(&self) -> Result<Amount, TransactionError> {
        checked_sum(self.inputs.iter().map(|input| input.amount))
    }

    /// Sum of all output amounts
    pub fn output_total(&self) -> Result<Amount, TransactionError> {
        checked_sum(self.outputs.iter().map(|output| output.amount))
    }

    /// Checks the balance invariant, reporting why a transaction is invalid
    pub fn check(&self) -> Result<(), TransactionError> {
        if self.inputs.is_empty() {
            return Err(TransactionError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(TransactionError::NoOutputs);
        }

        let inputs = self.input_total()?;
        let outputs = self.output_total()?;

        if inputs != outputs {
            return Err(TransactionError::Unbalanced { inputs, outputs });
        }

        Ok(())
    }

    /// Returns true iff the inputs and outputs balance exactly
    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }
}

impl From<TransactionRequest> for Transaction {
    fn from(request: TransactionRequest) -> Self {
        Transaction::new(request.inputs, request.outputs)
    }
}

fn checked_sum(mut amounts: impl Iterator<Item = Amount>) -> Result<Amount, TransactionError> {
    amounts.try_fold(Amount::ZERO, |total, amount| {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(TransactionError::NegativeAmount(amount));
        }
        total.checked_add(amount).ok_or(TransactionError::Overflow)
    })
}
