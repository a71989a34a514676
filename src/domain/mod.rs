mod account;
mod borrowing;
mod event;
mod friendship;
mod money;
mod person;
mod stage;
mod transaction;

pub use account::*;
pub use borrowing::*;
pub use event::*;
pub use friendship::*;
pub use money::*;
pub use person::*;
pub use stage::*;
pub use transaction::*;
