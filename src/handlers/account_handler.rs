//! Account Creation Handler

use crate::domain::OperationContext;
use crate::error::AppError;
use crate::ledger::{Account, LedgerStore};

use super::CreateAccountCommand;

pub struct CreateAccountHandler {
    ledger: LedgerStore,
}

impl CreateAccountHandler {
    pub fn new(ledger: LedgerStore) -> Self {
        Self { ledger }
    }

    pub async fn execute(
        &self,
        command: CreateAccountCommand,
        context: &OperationContext,
    ) -> Result<Account, AppError> {
        let account = self
            .ledger
            .create_account(command.state, command.account_type)
            .await?;

        tracing::info!(
            account_id = %account.id,
            state = %account.state,
            account_type = %account.account_type,
            correlation_id = ?context.correlation_id,
            "Account created"
        );

        Ok(account)
    }
}
