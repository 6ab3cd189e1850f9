use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::handle::ConnectionState;
use super::instructions::InstructionSynthesizer;
use super::manager::PeerTransportManager;
use super::persona::{Persona, PersonaCatalog};
use crate::error::{Error, Result};

/// The persona a live audition belongs to.
#[derive(Debug, Clone)]
pub struct AuditionHandle {
    generation: u64,
    pub persona: Arc<Persona>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    active: Option<AuditionHandle>,
}

/// Short-lived persona previews on their own transport.
///
/// At most one audition is live; starting another tears the previous one down
/// first. The transport should be built with `speak_first` so the persona
/// talks as soon as the link is up.
pub struct AuditionManager {
    transport: PeerTransportManager,
    catalog: Arc<PersonaCatalog>,
    synthesizer: Arc<dyn InstructionSynthesizer>,
    slot: Mutex<Slot>,
}

impl AuditionManager {
    #[must_use]
    pub fn new(
        transport: PeerTransportManager,
        catalog: Arc<PersonaCatalog>,
        synthesizer: Arc<dyn InstructionSynthesizer>,
    ) -> Self {
        Self {
            transport,
            catalog,
            synthesizer,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn transport(&self) -> &PeerTransportManager {
        &self.transport
    }

    #[must_use]
    pub fn catalog(&self) -> &PersonaCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    #[must_use]
    pub fn agent_speaking(&self) -> bool {
        self.transport.agent_speaking()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.subscribe_state()
    }

    /// Id of the persona being auditioned, if an audition is live.
    #[must_use]
    pub fn active_persona(&self) -> Option<String> {
        if self.transport.state() == ConnectionState::Disconnected {
            return None;
        }
        self.lock().active.as_ref().map(|a| a.persona.id.clone())
    }

    #[must_use]
    pub fn active(&self) -> Option<AuditionHandle> {
        if self.transport.state() == ConnectionState::Disconnected {
            return None;
        }
        self.lock().active.clone()
    }

    /// Start previewing `persona_id`, replacing any running audition.
    ///
    /// # Errors
    /// Returns `Error::UnknownPersona` for an id missing from the catalog, or
    /// the connect failure.
    pub async fn start_audition(&self, persona_id: &str) -> Result<()> {
        let persona = self
            .catalog
            .get(persona_id)
            .ok_or_else(|| Error::UnknownPersona(persona_id.to_string()))?;

        let generation = {
            let mut slot = self.lock();
            slot.generation += 1;
            if let Some(previous) = slot.active.take() {
                tracing::info!(previous = %previous.persona.id, next = %persona.id, "Replacing audition");
            }
            slot.active = Some(AuditionHandle {
                generation: slot.generation,
                persona: Arc::clone(&persona),
            });
            slot.generation
        };
        self.transport.disconnect();

        tracing::info!(persona = %persona.id, voice = %persona.voice, "Starting audition");
        let script = self.synthesizer.audition_script(&persona);
        let result = self.transport.connect(&script, persona.voice).await;
        if result.is_err() || !self.transport.is_connected() {
            self.clear_if_current(generation);
        }
        result
    }

    pub fn end_audition(&self) {
        if let Some(previous) = self.lock().active.take() {
            tracing::info!(persona = %previous.persona.id, "Ending audition");
        }
        self.transport.disconnect();
    }

    fn clear_if_current(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.active.as_ref().is_some_and(|a| a.generation == generation) {
            slot.active = None;
        }
    }
}

impl std::fmt::Debug for AuditionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditionManager")
            .field("transport", &self.transport)
            .field("active", &self.lock().active)
            .finish_non_exhaustive()
    }
}
