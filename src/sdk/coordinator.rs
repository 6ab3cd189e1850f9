use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::handle::ConnectionState;
use super::hints::HintChannel;
use super::instructions::{
    InstructionContext, InstructionSynthesizer, PresentationMode, SlideContext, SlideSummary,
};
use super::manager::PeerTransportManager;
use super::persona::{GreetingStyle, Persona};
use super::tools::{Navigation, ToolBridge};
use crate::Result;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{
    AudioConfig, InputAudioConfig, InputAudioTranscription, Item, SessionUpdate, ToolChoice, Voice,
};

#[derive(Debug, Default)]
struct State {
    mode: PresentationMode,
    persona: Option<Arc<Persona>>,
    slide: Option<SlideContext>,
    overview: Vec<SlideSummary>,
    has_greeted: bool,
}

/// Stateful façade over the main session.
///
/// Holds slide, mode and persona; pushes rebuilt instructions when they change
/// while connected and greets once per session.
pub struct SessionCoordinator {
    transport: PeerTransportManager,
    hints: HintChannel,
    tools: Arc<ToolBridge>,
    synthesizer: Arc<dyn InstructionSynthesizer>,
    state: Mutex<State>,
}

impl SessionCoordinator {
    /// `transport` should have been built with `tools` as its bridge.
    #[must_use]
    pub fn new(
        transport: PeerTransportManager,
        tools: Arc<ToolBridge>,
        synthesizer: Arc<dyn InstructionSynthesizer>,
        persona: Option<Arc<Persona>>,
    ) -> Self {
        Self {
            hints: HintChannel::new(transport.clone()),
            transport,
            tools,
            synthesizer,
            state: Mutex::new(State { persona, ..State::default() }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn transport(&self) -> &PeerTransportManager {
        &self.transport
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

    #[must_use]
    pub fn mode(&self) -> PresentationMode {
        self.lock().mode
    }

    #[must_use]
    pub fn persona(&self) -> Option<Arc<Persona>> {
        self.lock().persona.clone()
    }

    #[must_use]
    pub fn current_slide(&self) -> Option<SlideContext> {
        self.lock().slide.clone()
    }

    pub fn register_navigation(&self, navigation: Arc<dyn Navigation>) {
        self.tools.register_navigation(navigation);
    }

    /// Detach the deck; later tool calls report navigation as unavailable.
    pub fn clear_navigation(&self) {
        self.tools.clear_navigation();
    }

    /// Connect the main session, then push tools and greet.
    ///
    /// # Errors
    /// Returns the connect failure; the transport is already cleaned up.
    pub async fn start_session(&self) -> Result<()> {
        let state = self.transport.state();
        if state != ConnectionState::Disconnected {
            tracing::warn!(%state, "start_session ignored: session already active");
            return Ok(());
        }
        let (instructions, voice) = {
            let mut st = self.lock();
            st.has_greeted = false;
            let voice = st.persona.as_ref().map_or(Voice::default(), |p| p.voice);
            (self.build_instructions(&st), voice)
        };

        self.transport.connect(&instructions, voice).await?;
        if !self.transport.is_connected() {
            return Ok(());
        }
        self.push_session_update();
        self.greet_once();
        Ok(())
    }

    pub fn end_session(&self) {
        self.transport.disconnect();
    }

    pub fn set_mode(&self, mode: PresentationMode) {
        self.lock().mode = mode;
        if self.transport.is_connected() {
            self.push_session_update();
        }
    }

    /// Switch persona. The voice of a live session cannot change; it applies
    /// from the next `start_session`.
    pub fn set_persona(&self, persona: Arc<Persona>) {
        let previous_voice = {
            let mut st = self.lock();
            st.persona.replace(Arc::clone(&persona)).map(|p| p.voice)
        };
        if self.transport.is_connected() {
            if previous_voice.is_some_and(|v| v != persona.voice) {
                tracing::debug!(persona = %persona.id, "Voice change takes effect on the next session");
            }
            self.push_session_update();
        }
    }

    /// Update the slide on screen.
    ///
    /// While connected, a different slide id pushes new instructions and sends
    /// one navigation hint; the same id only refreshes the held metadata.
    pub fn set_current_slide(&self, slide: SlideContext) {
        let (changed, mode) = {
            let mut st = self.lock();
            let changed = st.slide.as_ref().is_none_or(|s| s.id != slide.id);
            st.slide = Some(slide.clone());
            (changed, st.mode)
        };
        if !changed || !self.transport.is_connected() {
            return;
        }
        self.push_session_update();
        self.hints.send_hint(&navigation_hint(mode, &slide));
    }

    /// Held for the next instructions rebuild; nothing is sent.
    pub fn set_slide_overview(&self, overview: Vec<SlideSummary>) {
        self.lock().overview = overview;
    }

    pub fn send_hint(&self, text: &str) -> bool {
        self.hints.send_hint(text)
    }

    /// Speak to the agent as the user and ask for a reply.
    pub fn send_text_message(&self, text: &str) -> bool {
        if !self.transport.is_connected() {
            return false;
        }
        self.transport.send_event(&ClientEvent::item_create(Item::user_text(text)))
            && self.transport.send_event(&ClientEvent::response_create())
    }

    fn build_instructions(&self, st: &State) -> String {
        self.synthesizer.session_instructions(&InstructionContext {
            mode: st.mode,
            persona: st.persona.as_deref(),
            slide: st.slide.as_ref(),
            overview: &st.overview,
        })
    }

    fn push_session_update(&self) {
        let instructions = {
            let st = self.lock();
            self.build_instructions(&st)
        };
        let mut update = SessionUpdate::instructions(instructions);
        match self.tools.registry().try_as_tools() {
            Ok(tools) if !tools.is_empty() => {
                update.tools = Some(tools);
                update.tool_choice = Some(ToolChoice::Auto);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Tool schemas could not be rendered; updating without tools"),
        }
        if let Some(model) = &self.transport.config().transcription_model {
            update.audio = Some(AudioConfig {
                input: Some(InputAudioConfig {
                    transcription: Some(InputAudioTranscription { model: model.clone() }),
                }),
                output: None,
            });
        }
        self.transport.send_event(&ClientEvent::session_update(update));
    }

    fn greet_once(&self) {
        let greeting = {
            let mut st = self.lock();
            if st.has_greeted {
                return;
            }
            st.has_greeted = true;
            let style = st.persona.as_ref().map_or(GreetingStyle::default(), |p| p.greeting_style);
            greeting_request(st.mode, style)
        };
        self.transport.send_event(&ClientEvent::item_create(Item::user_text(greeting)));
        self.transport.send_event(&ClientEvent::response_create());
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("transport", &self.transport)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

fn greeting_request(mode: PresentationMode, style: GreetingStyle) -> String {
    let manner = match style {
        GreetingStyle::Warm => "warmly",
        GreetingStyle::Formal => "politely and formally",
        GreetingStyle::Energetic => "with plenty of energy",
    };
    match mode {
        PresentationMode::Presenter => {
            format!("Greet the audience {manner}, then start presenting the current slide.")
        }
        PresentationMode::Dialogue => format!(
            "Greet me {manner}, introduce today's topic in one sentence, and ask what I already know about it."
        ),
        PresentationMode::Assistant => format!(
            "Greet me {manner} in one short sentence and say you are ready to help with any slide."
        ),
    }
}

fn navigation_hint(mode: PresentationMode, slide: &SlideContext) -> String {
    let n = slide.index + 1;
    let title = &slide.title;
    match mode {
        PresentationMode::Presenter => {
            format!("The deck moved to slide {n}: \"{title}\". Present this slide next.")
        }
        PresentationMode::Dialogue => {
            format!("We are now on slide {n}: \"{title}\". Discuss it when the user speaks.")
        }
        PresentationMode::Assistant => {
            format!("The user is now viewing slide {n}: \"{title}\". Use it as context for their next question.")
        }
    }
}
