pub mod coincap;
pub mod coingecko;
