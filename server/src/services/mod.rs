//! Business logic services for the marketplace

pub mod chat;
pub mod market;

pub use chat::{ChatHub, RoomId};
pub use market::MarketService;
