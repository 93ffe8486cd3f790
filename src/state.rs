use std::sync::Arc;

use crate::{clients::IdentityClient, services::order_service::OrderService};

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub identity: Arc<dyn IdentityClient>,
}

impl AppState {
    pub fn new(orders: OrderService, identity: Arc<dyn IdentityClient>) -> Self {
        Self { orders, identity }
    }
}
