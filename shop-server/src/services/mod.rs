//! External collaborators of the order engine
//!
//! The engine never owns products, customers, payments, settings or
//! reviews. Each is reached through an `async_trait` held as
//! `Arc<dyn Trait>`, resolved before any transaction or lock is taken.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{AddressSnapshot, ProductInfo};
use shared::order::AddressType;
use thiserror::Error;

use crate::core::Config;

/// Failure of an external collaborator
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Rejected {
            service,
            message: message.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Products that exist among `ids`; unknown ids are simply absent
    async fn get_products(&self, ids: &[i64]) -> ServiceResult<Vec<ProductInfo>>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Address owned by the customer, `None` when the id does not resolve
    async fn resolve_address(
        &self,
        user_address_id: i64,
        customer_id: i64,
        address_type: AddressType,
    ) -> ServiceResult<Option<AddressSnapshot>>;

    async fn default_address_id(&self, customer_id: i64) -> ServiceResult<Option<i64>>;

    async fn customer_exists(&self, customer_id: i64) -> ServiceResult<bool>;

    /// Identifier the payment provider knows the customer by
    async fn payer_reference(&self, customer_id: i64) -> ServiceResult<Option<String>>;
}

/// Payment order request handed to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrderRequest {
    pub order_id: i64,
    pub order_no: i64,
    pub amount: Decimal,
    pub payer_ref: String,
    pub subject: String,
}

/// Provider-specific parameters the client uses to pay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub order_id: i64,
    pub order_no: i64,
    pub amount: Decimal,
    pub prepay_id: String,
    pub params: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn generate_payment_order(&self, request: PaymentOrderRequest) -> ServiceResult<PaymentIntent>;
}

/// Order time windows, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    AutoCancelMinutes,
    AutoCompleteMinutes,
    AutoReviewMinutes,
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get_minutes(&self, key: SettingKey) -> ServiceResult<i64>;
}

/// Settings served from the process configuration
#[derive(Debug, Clone)]
pub struct ConfigSettings {
    auto_cancel_minutes: i64,
    auto_complete_minutes: i64,
    auto_review_minutes: i64,
}

impl ConfigSettings {
    pub fn new(config: &Config) -> Self {
        Self {
            auto_cancel_minutes: config.auto_cancel_minutes,
            auto_complete_minutes: config.auto_complete_minutes,
            auto_review_minutes: config.auto_review_minutes,
        }
    }
}

#[async_trait]
impl SettingsProvider for ConfigSettings {
    async fn get_minutes(&self, key: SettingKey) -> ServiceResult<i64> {
        Ok(match key {
            SettingKey::AutoCancelMinutes => self.auto_cancel_minutes,
            SettingKey::AutoCompleteMinutes => self.auto_complete_minutes,
            SettingKey::AutoReviewMinutes => self.auto_review_minutes,
        })
    }
}

#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Leave the default positive review unless the customer already reviewed
    async fn auto_positive_review(&self, product_id: i64, order_id: i64) -> ServiceResult<()>;
}

/// Every collaborator the manager needs, bundled for construction
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn ProductCatalog>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub payments: Arc<dyn PaymentGateway>,
    pub settings: Arc<dyn SettingsProvider>,
    pub reviews: Arc<dyn ReviewService>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_settings() {
        let config = Config {
            auto_cancel_minutes: 30,
            auto_complete_minutes: 60,
            auto_review_minutes: 90,
            ..Config::default()
        };
        let settings = ConfigSettings::new(&config);
        assert_eq!(settings.get_minutes(SettingKey::AutoCancelMinutes).await.unwrap(), 30);
        assert_eq!(settings.get_minutes(SettingKey::AutoCompleteMinutes).await.unwrap(), 60);
        assert_eq!(settings.get_minutes(SettingKey::AutoReviewMinutes).await.unwrap(), 90);
    }
}
