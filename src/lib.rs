pub mod core;
pub mod exchanges;
pub mod strategies;
pub mod utils;

pub use crate::core::{config::*, error::*, exchange::*, types::*};
