pub mod catalog;
pub mod errors;
pub mod extract;
pub mod kind;
pub mod memory;
pub mod provider;
pub mod provider_model;
pub mod registry;
pub mod repository;

pub use catalog::{Architecture, CatalogService, CatalogStatus, ModelCatalog, SupportedParameters};
pub use errors::{ProviderError, ProviderResult, StoreError, StoreResult};
pub use kind::ProviderKind;
pub use memory::{
    MemoryModelCatalogRepository, MemoryProviderModelRepository, MemoryProviderRepository,
};
pub use provider::{
    Provider, ProviderFilter, RegisterProviderInput, TenantContext, UpdateProviderInput,
};
pub use provider_model::{
    MicroUsd, PriceLine, PriceUnit, Pricing, ProviderModel, ProviderModelFilter,
    ProviderModelService, TokenLimits,
};
pub use registry::{ProviderRegistry, RegisteredProvider, SyncedProvider};
pub use repository::{ModelCatalogRepository, ProviderModelRepository, ProviderRepository};
