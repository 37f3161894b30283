pub mod auth;
pub mod category;
pub mod donation;
pub mod health;
pub mod item;
pub mod item_request;
pub mod notification;
pub mod user;
pub mod waitlist;
