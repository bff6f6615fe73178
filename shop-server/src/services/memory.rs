//! In-memory collaborators for tests and local embedding

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared::models::{AddressSnapshot, ProductInfo};
use shared::order::AddressType;

use super::{
    CustomerDirectory, PaymentGateway, PaymentIntent, PaymentOrderRequest, ProductCatalog,
    ReviewService, ServiceError, ServiceResult, Services, SettingKey, SettingsProvider,
};

/// Product catalog backed by a map
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<i64, ProductInfo>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, product: ProductInfo) {
        self.products.write().insert(product.id, product);
    }

    /// Mutate a stored product in place; no-op for unknown ids
    pub fn update(&self, product_id: i64, f: impl FnOnce(&mut ProductInfo)) {
        if let Some(product) = self.products.write().get_mut(&product_id) {
            f(product);
        }
    }

    /// Take a product out of the catalog
    pub fn remove(&self, product_id: i64) -> Option<ProductInfo> {
        self.products.write().remove(&product_id)
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn get_products(&self, ids: &[i64]) -> ServiceResult<Vec<ProductInfo>> {
        let products = self.products.read();
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

#[derive(Debug, Clone)]
struct StoredAddress {
    customer_id: i64,
    address: AddressSnapshot,
}

#[derive(Debug, Default)]
struct DirectoryState {
    customers: HashMap<i64, Option<String>>,
    addresses: HashMap<i64, StoredAddress>,
    defaults: HashMap<i64, i64>,
}

/// Customer directory backed by maps
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer_id: i64, payer_ref: Option<&str>) {
        self.state
            .write()
            .customers
            .insert(customer_id, payer_ref.map(str::to_string));
    }

    /// Store an address for the customer; the first one becomes the default
    pub fn add_address(&self, address_id: i64, customer_id: i64, address: AddressSnapshot) {
        let mut state = self.state.write();
        state.addresses.insert(
            address_id,
            StoredAddress {
                customer_id,
                address,
            },
        );
        state.defaults.entry(customer_id).or_insert(address_id);
    }
}

#[async_trait]
impl CustomerDirectory for MemoryDirectory {
    async fn resolve_address(
        &self,
        user_address_id: i64,
        customer_id: i64,
        _address_type: AddressType,
    ) -> ServiceResult<Option<AddressSnapshot>> {
        let state = self.state.read();
        Ok(state
            .addresses
            .get(&user_address_id)
            .filter(|a| a.customer_id == customer_id)
            .map(|a| a.address.clone()))
    }

    async fn default_address_id(&self, customer_id: i64) -> ServiceResult<Option<i64>> {
        Ok(self.state.read().defaults.get(&customer_id).copied())
    }

    async fn customer_exists(&self, customer_id: i64) -> ServiceResult<bool> {
        Ok(self.state.read().customers.contains_key(&customer_id))
    }

    async fn payer_reference(&self, customer_id: i64) -> ServiceResult<Option<String>> {
        Ok(self.state.read().customers.get(&customer_id).cloned().flatten())
    }
}

/// Gateway that records requests and hands out sequential prepay ids
#[derive(Debug, Default)]
pub struct MemoryPaymentGateway {
    next_id: AtomicU64,
    requests: Mutex<Vec<PaymentOrderRequest>>,
}

impl MemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<PaymentOrderRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PaymentGateway for MemoryPaymentGateway {
    async fn generate_payment_order(&self, request: PaymentOrderRequest) -> ServiceResult<PaymentIntent> {
        if request.payer_ref.is_empty() {
            return Err(ServiceError::rejected("payment gateway", "missing payer reference"));
        }
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let prepay_id = format!("prepay-{}-{}", request.order_no, seq);
        let intent = PaymentIntent {
            order_id: request.order_id,
            order_no: request.order_no,
            amount: request.amount,
            prepay_id: prepay_id.clone(),
            params: serde_json::json!({
                "prepay_id": prepay_id,
                "payer": request.payer_ref,
                "subject": request.subject,
            }),
        };
        self.requests.lock().push(request);
        Ok(intent)
    }
}

/// Settings with fixed values, adjustable at runtime
#[derive(Debug)]
pub struct MemorySettings {
    values: RwLock<HashMap<SettingKey, i64>>,
}

impl MemorySettings {
    pub fn new(auto_cancel: i64, auto_complete: i64, auto_review: i64) -> Self {
        use SettingKey::*;
        let values = HashMap::from([
            (AutoCancelMinutes, auto_cancel),
            (AutoCompleteMinutes, auto_complete),
            (AutoReviewMinutes, auto_review),
        ]);
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set(&self, key: SettingKey, minutes: i64) {
        self.values.write().insert(key, minutes);
    }
}

#[async_trait]
impl SettingsProvider for MemorySettings {
    async fn get_minutes(&self, key: SettingKey) -> ServiceResult<i64> {
        self.values
            .read()
            .get(&key)
            .copied()
            .ok_or_else(|| ServiceError::unavailable("settings", format!("{:?} not configured", key)))
    }
}

/// Review service that records `(product_id, order_id)` pairs
#[derive(Debug, Default)]
pub struct MemoryReviews {
    reviews: Mutex<Vec<(i64, i64)>>,
}

impl MemoryReviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reviews(&self) -> Vec<(i64, i64)> {
        self.reviews.lock().clone()
    }
}

#[async_trait]
impl ReviewService for MemoryReviews {
    async fn auto_positive_review(&self, product_id: i64, order_id: i64) -> ServiceResult<()> {
        let mut reviews = self.reviews.lock();
        if !reviews.contains(&(product_id, order_id)) {
            reviews.push((product_id, order_id));
        }
        Ok(())
    }
}

/// Concrete handles to every in-memory collaborator
#[derive(Debug, Clone)]
pub struct MemoryServices {
    pub catalog: Arc<MemoryCatalog>,
    pub customers: Arc<MemoryDirectory>,
    pub payments: Arc<MemoryPaymentGateway>,
    pub settings: Arc<MemorySettings>,
    pub reviews: Arc<MemoryReviews>,
}

impl MemoryServices {
    pub fn new(auto_cancel: i64, auto_complete: i64, auto_review: i64) -> Self {
        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            customers: Arc::new(MemoryDirectory::new()),
            payments: Arc::new(MemoryPaymentGateway::new()),
            settings: Arc::new(MemorySettings::new(auto_cancel, auto_complete, auto_review)),
            reviews: Arc::new(MemoryReviews::new()),
        }
    }

    /// Trait-object bundle for the manager
    pub fn services(&self) -> Services {
        Services {
            catalog: self.catalog.clone(),
            customers: self.customers.clone(),
            payments: self.payments.clone(),
            settings: self.settings.clone(),
            reviews: self.reviews.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_scopes_addresses_to_owner() {
        let directory = MemoryDirectory::new();
        directory.add_customer(1, Some("openid-1"));
        directory.add_address(10, 1, AddressSnapshot::default());
        directory.add_address(11, 1, AddressSnapshot::default());

        assert_eq!(directory.default_address_id(1).await.unwrap(), Some(10));
        assert!(directory.resolve_address(11, 1, AddressType::Shipping).await.unwrap().is_some());
        assert!(directory.resolve_address(11, 2, AddressType::Shipping).await.unwrap().is_none());
        assert_eq!(directory.payer_reference(1).await.unwrap().as_deref(), Some("openid-1"));
        assert!(!directory.customer_exists(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_gateway_and_settings() {
        let gateway = MemoryPaymentGateway::new();
        let intent = gateway
            .generate_payment_order(PaymentOrderRequest {
                order_id: 1,
                order_no: 1001,
                amount: rust_decimal::Decimal::ONE,
                payer_ref: "openid".to_string(),
                subject: "Shop".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(intent.prepay_id, "prepay-1001-1");
        assert_eq!(gateway.requests().len(), 1);

        let settings = MemorySettings::new(1, 2, 3);
        settings.set(SettingKey::AutoCancelMinutes, 5);
        assert_eq!(settings.get_minutes(SettingKey::AutoCancelMinutes).await.unwrap(), 5);
    }
}
