//! Domain types for bin-based liquidity management.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, Address, TxHash, TokenRole
//! - Position and Operation records mirrored by the Position Store

pub mod decimal;
pub mod operation;
pub mod position;
pub mod primitives;

pub use decimal::Decimal;
pub use operation::{NewOperation, Operation, OperationType};
pub use position::{BinReserves, NewPosition, Position, ResolvedPosition};
pub use primitives::{Address, TimeMs, TokenRole, TxHash};
