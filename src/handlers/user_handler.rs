//! User Creation Handler
//!
//! Handles user creation with automatic internal and external accounts.

use crate::domain::OperationContext;
use crate::error::AppError;
use crate::ledger::{LedgerStore, User};

use super::CreateUserCommand;

/// Handler for user creation
pub struct CreateUserHandler {
    ledger: LedgerStore,
}

impl CreateUserHandler {
    pub fn new(ledger: LedgerStore) -> Self {
        Self { ledger }
    }

    /// Execute the create user command
    pub async fn execute(
        &self,
        command: CreateUserCommand,
        context: &OperationContext,
    ) -> Result<User, AppError> {
        command.validate()?;

        let user = self.ledger.create_user(&command.email, &command.name).await?;

        tracing::info!(
            user_id = %user.id,
            internal_account_id = %user.internal_account_id,
            external_account_id = %user.external_account_id,
            correlation_id = ?context.correlation_id,
            "User created"
        );

        Ok(user)
    }
}
