pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Address, BinReserves, Decimal, Operation, OperationType, Position, ResolvedPosition, TimeMs,
    TokenRole, TxHash,
};
pub use error::AppError;
pub use gateway::{GatewayError, LbPoolGateway, MockPoolGateway, PoolGateway, PoolTokens};
pub use orchestration::{MonitorLoop, PoolContext, Session, Workflows};
