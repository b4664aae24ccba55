pub mod c32;
pub mod clarity;
pub mod models;
pub mod serde_primitives;

pub use clarity::{
    principal::{ContractPrincipal, Principal, StandardPrincipal},
    ClarityError, ClarityValue,
};
