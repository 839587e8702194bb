//! FxWallet Common Types
//!
//! Shared types used across the FxWallet conversion engine, including
//! identifiers, monetary types, the error taxonomy and clock abstractions.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;
pub mod identity;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
pub use identity::*;
