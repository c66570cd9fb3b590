// src/core/wallet.rs
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("Insufficient {asset} balance: required {required}, available {available}")]
pub struct InsufficientFunds {
    pub asset: String,
    pub required: Decimal,
    pub available: Decimal,
}

/// Balances of a simulated account. Fills happen at the price given, with no fees or slippage.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperWallet {
    quote_asset: String,
    quote_balance: Decimal,
    base_balance: Decimal,
}

impl PaperWallet {
    pub fn new(quote_asset: impl Into<String>, capital_base: Decimal) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            quote_balance: capital_base,
            base_balance: Decimal::ZERO,
        }
    }

    pub fn quote_balance(&self) -> Decimal {
        self.quote_balance
    }

    pub fn base_balance(&self) -> Decimal {
        self.base_balance
    }

    pub fn buy(&mut self, quantity: Decimal, price: Decimal) -> Result<(), InsufficientFunds> {
        let cost = quantity * price;
        if cost > self.quote_balance {
            return Err(InsufficientFunds {
                asset: self.quote_asset.clone(),
                required: cost,
                available: self.quote_balance,
            });
        }
        self.quote_balance -= cost;
        self.base_balance += quantity;
        Ok(())
    }

    pub fn sell(&mut self, quantity: Decimal, price: Decimal) {
        self.base_balance -= quantity;
        self.quote_balance += quantity * price;
    }
}
