pub mod asset;
pub mod asset_table;
pub mod dashboard;
pub mod favorites;
