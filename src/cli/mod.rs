pub mod audit;
pub mod inspect;
