pub mod answer;
pub mod customer;
pub mod dispatch;
pub mod intent;
pub mod query;
pub mod session;
