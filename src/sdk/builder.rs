use std::sync::Arc;

use super::audition::AuditionManager;
use super::coordinator::SessionCoordinator;
use super::handlers::EventHandlers;
use super::instructions::{DefaultInstructions, InstructionSynthesizer};
use super::manager::{Collaborators, PeerTransportManager, TransportOptions};
use super::persona::PersonaCatalog;
use super::tools::{ToolBridge, ToolRegistry};
use crate::config::TransportConfig;
use crate::transport::{
    ClientSecretBroker, CredentialBroker, HttpCredentialBroker, HttpSdpExchange, MediaEngine,
    SdpExchange,
};
use crate::{Error, Result};

pub struct Realtime;

impl Realtime {
    #[must_use]
    pub fn builder() -> RealtimeBuilder {
        RealtimeBuilder::new()
    }
}

/// The main session and the audition manager, sharing collaborators but no state.
#[derive(Debug)]
pub struct Sessions {
    pub main: SessionCoordinator,
    pub audition: AuditionManager,
}

pub struct RealtimeBuilder {
    config: Option<TransportConfig>,
    api_key: Option<String>,
    engine: Option<Arc<dyn MediaEngine>>,
    broker: Option<Arc<dyn CredentialBroker>>,
    exchange: Option<Arc<dyn SdpExchange>>,
    handlers: EventHandlers,
    audition_handlers: EventHandlers,
    tools: Option<ToolRegistry>,
    personas: PersonaCatalog,
    synthesizer: Arc<dyn InstructionSynthesizer>,
}

impl RealtimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            api_key: None,
            engine: None,
            broker: None,
            exchange: None,
            handlers: EventHandlers::new(),
            audition_handlers: EventHandlers::new(),
            tools: None,
            personas: PersonaCatalog::default(),
            synthesizer: Arc::new(DefaultInstructions),
        }
    }

    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Mint credentials directly with a long-lived key instead of a broker URL.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn media_engine(mut self, engine: Arc<dyn MediaEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn credential_broker(mut self, broker: Arc<dyn CredentialBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    #[must_use]
    pub fn sdp_exchange(mut self, exchange: Arc<dyn SdpExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    #[must_use]
    pub fn handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    #[must_use]
    pub fn audition_handlers(mut self, handlers: EventHandlers) -> Self {
        self.audition_handlers = handlers;
        self
    }

    /// Replace the default navigation tools.
    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn personas(mut self, personas: PersonaCatalog) -> Self {
        self.personas = personas;
        self
    }

    #[must_use]
    pub fn instructions(mut self, synthesizer: Arc<dyn InstructionSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Assemble both sessions.
    ///
    /// Without an explicit broker, `broker_url` from the config is used, then
    /// the API key.
    ///
    /// # Errors
    /// Returns `Error::Config` if no media engine or credential source is set,
    /// or if an HTTP collaborator cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<Sessions> {
        let config = self.config.unwrap_or_default();
        let engine = self
            .engine
            .ok_or_else(|| Error::Config("a media engine is required".to_string()))?;

        let broker: Arc<dyn CredentialBroker> = match (self.broker, &config.broker_url, self.api_key) {
            (Some(broker), _, _) => broker,
            (None, Some(url), _) => Arc::new(HttpCredentialBroker::new(url.clone())?),
            (None, None, Some(key)) => Arc::new(ClientSecretBroker::new(&key, config.model.clone())?),
            (None, None, None) => {
                return Err(Error::Config(
                    "no credential source: set a broker, RT_BROKER_URL, or an API key".to_string(),
                ));
            }
        };
        let exchange: Arc<dyn SdpExchange> = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(HttpSdpExchange::new(&config.calls_url, config.model.clone())?),
        };
        let collaborators = Collaborators { engine, broker, exchange };

        let tools = Arc::new(ToolBridge::new(self.tools.unwrap_or_else(ToolRegistry::navigation)));
        let main_transport = PeerTransportManager::new(
            config.clone(),
            collaborators.clone(),
            TransportOptions::new("main")
                .handlers(Arc::new(self.handlers))
                .tools(Arc::clone(&tools)),
        );
        let audition_transport = PeerTransportManager::new(
            config,
            collaborators,
            TransportOptions::new("audition")
                .handlers(Arc::new(self.audition_handlers))
                .speak_first(true),
        );

        let personas = Arc::new(self.personas);
        let main = SessionCoordinator::new(
            main_transport,
            tools,
            Arc::clone(&self.synthesizer),
            personas.default_persona(),
        );
        let audition = AuditionManager::new(audition_transport, personas, self.synthesizer);
        Ok(Sessions { main, audition })
    }
}

impl Default for RealtimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
