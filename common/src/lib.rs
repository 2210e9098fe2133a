pub mod bid;
pub mod checkout;
pub mod identity;
pub mod listing;
pub mod money;
pub mod notification;
pub mod order;
pub mod payment;
pub mod push;
pub mod return_url;
