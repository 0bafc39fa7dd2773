pub mod describe;
pub mod error;
pub mod fixture;
pub mod replay;
