pub mod conversation_items;
pub mod conversations;
pub mod model_catalogs;
pub mod provider_models;
pub mod providers;
pub mod responses;

pub use conversation_items::Entity as ConversationItems;
pub use conversations::Entity as Conversations;
pub use model_catalogs::Entity as ModelCatalogs;
pub use provider_models::Entity as ProviderModels;
pub use providers::Entity as Providers;
pub use responses::Entity as Responses;
