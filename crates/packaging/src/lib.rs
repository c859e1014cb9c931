pub mod checkout;
pub mod github;
pub mod naming;

pub use checkout::*;
pub use github::*;
pub use naming::*;
