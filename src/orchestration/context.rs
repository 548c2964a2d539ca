use crate::db::repo::StoreScope;
use crate::domain::{Address, Decimal, NewOperation, NewPosition, OperationType, TokenRole, TxHash};
use crate::gateway::PoolTokens;
use thiserror::Error;

/// Everything the workflows need to know about the managed wallet and pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolContext {
    pub wallet: Address,
    pub pool: Address,
    pub router: Address,
    pub tokens: PoolTokens,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Token {token} is not part of pool {pool}")]
    ForeignToken { token: Address, pool: Address },
    #[error("Primary and paired token are both {0}")]
    SameToken(Address),
    /// Primary legs go above the active bin, which only holds token X.
    #[error("Primary token {primary} must be token X of the pool ({token_x})")]
    PrimaryNotTokenX { primary: Address, token_x: Address },
}

impl PoolContext {
    /// Bind the primary/paired roles to the pool's X/Y tokens.
    ///
    /// The primary token must be token X and the paired token token Y.
    pub fn new(
        wallet: Address,
        pool: Address,
        router: Address,
        tokens: PoolTokens,
        primary_token: &Address,
        paired_token: &Address,
    ) -> Result<Self, ContextError> {
        if primary_token.eq_ignore_case(paired_token) {
            return Err(ContextError::SameToken(primary_token.clone()));
        }
        for token in [primary_token, paired_token] {
            if !token.eq_ignore_case(&tokens.token_x) && !token.eq_ignore_case(&tokens.token_y) {
                return Err(ContextError::ForeignToken {
                    token: token.clone(),
                    pool,
                });
            }
        }

        if !primary_token.eq_ignore_case(&tokens.token_x) {
            return Err(ContextError::PrimaryNotTokenX {
                primary: primary_token.clone(),
                token_x: tokens.token_x.clone(),
            });
        }
        Ok(Self {
            wallet,
            pool,
            router,
            tokens,
        })
    }

    pub fn scope(&self) -> StoreScope {
        StoreScope::new(&self.wallet, &self.pool)
    }

    pub fn token_for(&self, role: TokenRole) -> &Address {
        match role {
            TokenRole::Primary => &self.tokens.token_x,
            TokenRole::Paired => &self.tokens.token_y,
        }
    }

    /// A single-token amount as the pool's (amount_x, amount_y).
    pub fn amounts_for(&self, role: TokenRole, amount: Decimal) -> (Decimal, Decimal) {
        match role {
            TokenRole::Primary => (amount, Decimal::zero()),
            TokenRole::Paired => (Decimal::zero(), amount),
        }
    }

    pub fn new_position(&self, bin_id: i32, amount: Decimal) -> NewPosition {
        NewPosition {
            wallet: self.wallet.clone(),
            pool: self.pool.clone(),
            bin_id,
            amount,
            token_x: self.tokens.token_x.clone(),
            token_y: self.tokens.token_y.clone(),
        }
    }

    pub fn operation(&self, operation_type: OperationType, tx_hash: TxHash) -> NewOperation {
        NewOperation::new(
            operation_type,
            self.wallet.clone(),
            self.pool.clone(),
            tx_hash,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tokens() -> PoolTokens {
        PoolTokens {
            token_x: Address::new("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
            token_y: Address::new("0x152b9d0fdc40c096757f570a51e494bd4b943e50"),
        }
    }

    fn context(primary: &str, paired: &str) -> Result<PoolContext, ContextError> {
        PoolContext::new(
            Address::new("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            Address::new("0x856b38bf1e2e367f747dd4d3951dda8a35f1bf60"),
            Address::new("0x18556DA13313f3532c54711497A8FedAC273220E"),
            tokens(),
            &Address::new(primary),
            &Address::new(paired),
        )
    }

    #[test]
    fn test_primary_as_token_x() {
        let ctx = context(
            "0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7",
            "0x152b9d0fdc40c096757f570a51e494bd4b943e50",
        )
        .unwrap();
        let one = Decimal::from_str("1").unwrap();

        assert_eq!(ctx.token_for(TokenRole::Primary), &tokens().token_x);
        assert_eq!(ctx.amounts_for(TokenRole::Primary, one), (one, Decimal::zero()));
        assert_eq!(ctx.amounts_for(TokenRole::Paired, one), (Decimal::zero(), one));
    }

    #[test]
    fn test_primary_as_token_y_rejected() {
        let err = context(
            "0x152b9d0fdc40c096757f570a51e494bd4b943e50",
            "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ContextError::PrimaryNotTokenX {
                primary: Address::new("0x152b9d0fdc40c096757f570a51e494bd4b943e50"),
                token_x: tokens().token_x,
            }
        );
    }

    #[test]
    fn test_foreign_token_rejected() {
        let err = context(
            "0x0000000000000000000000000000000000000001",
            "0x152b9d0fdc40c096757f570a51e494bd4b943e50",
        )
        .unwrap_err();
        assert!(matches!(err, ContextError::ForeignToken { .. }));

        let err = context(
            "0x152b9d0fdc40c096757f570a51e494bd4b943e50",
            "0x152B9D0FDC40C096757F570A51E494BD4B943E50",
        )
        .unwrap_err();
        assert!(matches!(err, ContextError::SameToken(_)));
    }
}
