mod accounts;
mod health;

pub use accounts::*;
pub use health::*;
