pub mod error;
pub mod gateway;
pub mod inference;
pub mod memory;
pub mod output;
pub mod persistence;
pub mod relay;
pub mod router;

pub use error::{GatewayError, InferenceError, RelayError};
pub use gateway::{ConversationRef, Gateway, GatewayResult, RelayHandle};
pub use inference::{
    ByteStream, ClientFactory, InferenceClient, UpstreamClientConfig, WreqClientFactory,
    WreqInferenceClient,
};
pub use memory::{MemoryConversationStore, MemoryResponseStore};
pub use persistence::{
    ContentBlock, Conversation, ConversationItem, ConversationItemStatus, ConversationItemType,
    ConversationStore, ItemRole, NewConversationItem, NewResponse, ResponseStore,
    ResponseUpdates, StoredResponse,
};
pub use relay::{RelayConfig, RelayContext};
pub use router::{GatewayState, gateway_router, tenant_from_headers};
