pub mod api_response;
pub mod barcode;
pub mod error;
pub mod notification;
