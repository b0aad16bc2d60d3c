#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod quiz_bank;
pub mod time;

pub use error::Error;
pub use quiz_bank::{QuizBank, QuizBankError, QuizQuestion};
pub use time::Clock;
