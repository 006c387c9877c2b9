//! Funds Handler
//!
//! Deposits, withdrawals and transfers. Converts the caller's amount once,
//! resolves accounts, and hands a validated posting to the ledger store.

use crate::domain::{Amount, OperationContext};
use crate::error::AppError;
use crate::identifier::Identifier;
use crate::ledger::{LedgerStore, PostedTransaction, PostingPolicy, PostingRequest, User};

use super::FundsCommand;

/// Handler for one posting policy
pub struct FundsHandler {
    ledger: LedgerStore,
    policy: PostingPolicy,
}

impl FundsHandler {
    pub fn new(ledger: LedgerStore, policy: PostingPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn deposit(ledger: LedgerStore) -> Self {
        Self::new(ledger, PostingPolicy::Deposit)
    }

    pub fn withdraw(ledger: LedgerStore) -> Self {
        Self::new(ledger, PostingPolicy::Withdraw)
    }

    pub fn transfer(ledger: LedgerStore) -> Self {
        Self::new(ledger, PostingPolicy::Transfer)
    }

    pub fn policy(&self) -> PostingPolicy {
        self.policy
    }

    /// Execute the funds command
    pub async fn execute(
        &self,
        command: FundsCommand,
        context: &OperationContext,
    ) -> Result<PostedTransaction, AppError> {
        // Validation happens before any database work
        let amount = Amount::from_major(command.amount)?;

        let (debit_account_id, credit_account_id) = match (
            command.debit_account_id.clone(),
            command.credit_account_id.clone(),
        ) {
            (Some(debit), Some(credit)) => (debit, credit),
            (debit, credit) => {
                if self.policy == PostingPolicy::Transfer {
                    return Err(AppError::InvalidRequest(
                        "transfer requires debit_account_id and credit_account_id".to_string(),
                    ));
                }
                let user = self.ledger.get_user(&command.user_id).await?;
                let (default_debit, default_credit) = default_accounts(self.policy, &user)?;
                (
                    debit.unwrap_or(default_debit),
                    credit.unwrap_or(default_credit),
                )
            }
        };

        tracing::debug!(
            policy = %self.policy,
            amount_minor = amount.minor_units(),
            debit_account_id = %debit_account_id,
            credit_account_id = %credit_account_id,
            correlation_id = ?context.correlation_id,
            "Posting funds"
        );

        let posted = self
            .ledger
            .post(
                self.policy,
                PostingRequest {
                    amount,
                    created_by: command.user_id,
                    debit_account_id,
                    credit_account_id,
                },
            )
            .await?;

        Ok(posted)
    }
}

/// Debit and credit account used when a deposit or withdrawal omits them.
///
/// Deposits move money from the user's external account into the internal
/// one; withdrawals move it back out.
pub fn default_accounts(
    policy: PostingPolicy,
    user: &User,
) -> Result<(Identifier, Identifier), AppError> {
    match policy {
        PostingPolicy::Deposit => Ok((
            user.external_account_id.clone(),
            user.internal_account_id.clone(),
        )),
        PostingPolicy::Withdraw => Ok((
            user.internal_account_id.clone(),
            user.external_account_id.clone(),
        )),
        PostingPolicy::Transfer => Err(AppError::InvalidRequest(
            "transfer accounts must be given explicitly".to_string(),
        )),
    }
}
