pub mod analysis;
pub mod contract;
