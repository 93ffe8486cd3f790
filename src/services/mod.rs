pub mod order_service;
pub mod saga;
