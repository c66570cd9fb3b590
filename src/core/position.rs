// src/core/position.rs
//! Position state machine (`OPEN -> CLOSED`) and the book that owns a
//! strategy's positions.

use crate::types::ExitReason;
use crate::utils::precision::{above, below};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type PositionId = Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum PositionError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: Decimal },

    #[error("entry price must be positive (got {0})")]
    InvalidEntryPrice(Decimal),

    #[error("position {0} not found")]
    NotFound(PositionId),

    #[error("position {0} is already closed")]
    AlreadyClosed(PositionId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed {
        exit_price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    id: PositionId,
    quantity: Decimal,
    entry_price: Decimal,
    trailing_stoploss_percent: Decimal,
    fixed_stoploss_price: Decimal,
    trailing_stoploss_price: Decimal,
    profit_target_price: Decimal,
    opened_at: DateTime<Utc>,
    status: PositionStatus,
}

impl Position {
    /// Opens a long position and derives its three exit thresholds from `entry_price`.
    pub fn open_long(
        quantity: Decimal,
        entry_price: Decimal,
        fixed_stoploss_percent: Decimal,
        trailing_stoploss_percent: Decimal,
        profit_target_percent: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, PositionError> {
        for (field, value) in [
            ("order_quantity", quantity),
            ("fixed_stoploss_percent", fixed_stoploss_percent),
            ("trailing_stoploss_percent", trailing_stoploss_percent),
            ("profit_target_percent", profit_target_percent),
        ] {
            if value < Decimal::ZERO {
                return Err(PositionError::Negative { field, value });
            }
        }
        if entry_price <= Decimal::ZERO {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            quantity,
            entry_price,
            trailing_stoploss_percent,
            fixed_stoploss_price: below(entry_price, fixed_stoploss_percent),
            trailing_stoploss_price: below(entry_price, trailing_stoploss_percent),
            profit_target_price: above(entry_price, profit_target_percent),
            opened_at,
            status: PositionStatus::Open,
        })
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn fixed_stoploss_price(&self) -> Decimal {
        self.fixed_stoploss_price
    }

    pub fn trailing_stoploss_price(&self) -> Decimal {
        self.trailing_stoploss_price
    }

    pub fn profit_target_price(&self) -> Decimal {
        self.profit_target_price
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn status(&self) -> &PositionStatus {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self.status {
            PositionStatus::Closed { reason, .. } => Some(reason),
            PositionStatus::Open => None,
        }
    }

    pub fn exit_price(&self) -> Option<Decimal> {
        match self.status {
            PositionStatus::Closed { exit_price, .. } => Some(exit_price),
            PositionStatus::Open => None,
        }
    }

    /// `(exit - entry) * quantity` once closed.
    pub fn realized_profit(&self) -> Option<Decimal> {
        self.exit_price()
            .map(|exit| (exit - self.entry_price) * self.quantity)
    }

    /// Raises the trailing stop to `close * (1 - pct)` if that is higher. Never lowers it.
    fn ratchet_trailing_stop(&mut self, close: Decimal) {
        let candidate = below(close, self.trailing_stoploss_percent);
        if candidate > self.trailing_stoploss_price {
            self.trailing_stoploss_price = candidate;
        }
    }

    /// First matching exit in priority order: fixed stop, trailing stop, profit target.
    pub fn exit_signal(&self, close: Decimal) -> Option<ExitReason> {
        if !self.is_open() {
            return None;
        }
        if close <= self.fixed_stoploss_price {
            Some(ExitReason::Stoploss)
        } else if close <= self.trailing_stoploss_price {
            Some(ExitReason::TrailingStop)
        } else if close >= self.profit_target_price {
            Some(ExitReason::ProfitTarget)
        } else {
            None
        }
    }

    fn close(
        &mut self,
        exit_price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        if !self.is_open() {
            return Err(PositionError::AlreadyClosed(self.id));
        }
        self.status = PositionStatus::Closed {
            exit_price,
            reason,
            closed_at,
        };
        Ok(())
    }
}

/// A close the update pass decided on. The caller fills it and then confirms
/// through [`PositionBook::close`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExitOrder {
    pub position_id: PositionId,
    pub quantity: Decimal,
    pub reason: ExitReason,
}

/// All positions of one strategy, in open order.
#[derive(Debug, Default, Clone)]
pub struct PositionBook {
    positions: Vec<Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a long position. `position_limit` is not enforced here.
    pub fn open_long(
        &mut self,
        quantity: Decimal,
        entry_price: Decimal,
        fixed_stoploss_percent: Decimal,
        trailing_stoploss_percent: Decimal,
        profit_target_percent: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Result<&Position, PositionError> {
        let position = Position::open_long(
            quantity,
            entry_price,
            fixed_stoploss_percent,
            trailing_stoploss_percent,
            profit_target_percent,
            opened_at,
        )?;
        let id = self.add(position);
        self.get(id).ok_or(PositionError::NotFound(id))
    }

    /// Appends a freshly opened position and returns its id.
    pub fn add(&mut self, position: Position) -> PositionId {
        let id = position.id;
        self.positions.push(position);
        id
    }

    /// Ratchets every open trailing stop against `close` and returns the exits that are due,
    /// at most one per position.
    pub fn update_pass(&mut self, close: Decimal) -> Vec<ExitOrder> {
        self.positions
            .iter_mut()
            .filter(|p| p.is_open())
            .filter_map(|p| {
                p.ratchet_trailing_stop(close);
                p.exit_signal(close).map(|reason| ExitOrder {
                    position_id: p.id,
                    quantity: p.quantity,
                    reason,
                })
            })
            .collect()
    }

    pub fn close(
        &mut self,
        id: PositionId,
        exit_price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<&Position, PositionError> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(PositionError::NotFound(id))?;
        position.close(exit_price, reason, closed_at)?;
        Ok(position)
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn open_position_count(&self) -> usize {
        self.open_positions().count()
    }
}
