//! Model client transports
//!
//! This module provides the `ModelClient` abstraction and its
//! implementations: an OpenAI-compatible HTTP client and a scripted mock.

mod mock;
mod openai;
mod traits;

use std::sync::Arc;

pub use mock::{MockClient, MockConfig, MockReply};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use traits::*;

use crate::config::{ModelSettings, ProviderKind};
use crate::error::Result;

/// Build the client selected by configuration.
pub fn create_client(settings: &ModelSettings) -> Result<Arc<dyn ModelClient>> {
    let client: Arc<dyn ModelClient> = match settings.provider {
        ProviderKind::Openai => Arc::new(OpenAiClient::new(OpenAiConfig::from(settings))?),
        ProviderKind::Mock => Arc::new(MockClient::new()),
    };
    Ok(client)
}
