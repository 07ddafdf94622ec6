//! C5: CIAM engine (spec §4.5) — sign-in state machine, token model, quotas.

pub mod engine;
pub mod quotas;
pub mod token;

pub use engine::{CiamEngine, Tokens};
pub use quotas::{Quotas, Role};
