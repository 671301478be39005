//! Marketplace operations
//!
//! Each service receives the caller as an explicit [`Principal`](crate::auth::Principal)
//! argument and talks to storage through [`MarketplaceStore`](crate::store::MarketplaceStore).

pub mod acceptance;
pub mod payments;
pub mod problems;
pub mod quotes;
pub mod users;

pub use acceptance::AcceptanceWorkflow;
pub use payments::PaymentService;
pub use problems::ProblemService;
pub use quotes::QuoteService;
pub use users::UserService;
