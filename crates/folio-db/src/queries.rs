//! Database query functions organized by domain.

pub mod calculations;
pub mod contracts;
pub mod sales;
