pub mod account;
pub mod config;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod market;
pub mod order;
pub mod price;
pub mod quantity;
pub mod report;

pub mod common;
mod trader;

#[cfg(test)]
mod testing;

pub use trader::Trader;

pub mod noun {
    pub use rust_decimal::Decimal;

    pub type Symbol = String;
    pub type Asset = String;
    pub type Price = Decimal;
    pub type Precision = i64;
    pub type Quantity = Decimal;
    pub type Amount = Decimal;
    pub type Percent = Decimal;
    pub type OrderId = u64;
}
