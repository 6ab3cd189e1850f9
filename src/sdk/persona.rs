use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::models::Voice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GreetingStyle {
    #[default]
    Warm,
    Formal,
    Energetic,
}

/// A named bundle of voice, tone and greeting style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub voice: Voice,
    /// Free-text speaking style folded into the instructions.
    pub tone: String,
    #[serde(default)]
    pub greeting_style: GreetingStyle,
}

impl Persona {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        voice: Voice,
        tone: impl Into<String>,
        greeting_style: GreetingStyle,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            voice,
            tone: tone.into(),
            greeting_style,
        }
    }
}

/// Personas available to sessions and auditions, keyed by id.
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Arc<Persona>>,
    by_id: HashMap<String, usize>,
}

impl PersonaCatalog {
    #[must_use]
    pub fn new(personas: impl IntoIterator<Item = Persona>) -> Self {
        let mut catalog = Self {
            personas: Vec::new(),
            by_id: HashMap::new(),
        };
        for persona in personas {
            catalog.insert(persona);
        }
        catalog
    }

    /// Add a persona, replacing any existing one with the same id.
    pub fn insert(&mut self, persona: Persona) {
        if let Some(&idx) = self.by_id.get(&persona.id) {
            self.personas[idx] = Arc::new(persona);
        } else {
            self.by_id.insert(persona.id.clone(), self.personas.len());
            self.personas.push(Arc::new(persona));
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Persona>> {
        self.by_id.get(id).map(|&idx| Arc::clone(&self.personas[idx]))
    }

    /// The first persona; used when the host never picks one.
    #[must_use]
    pub fn default_persona(&self) -> Option<Arc<Persona>> {
        self.personas.first().cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::new([
            Persona::new(
                "guide",
                "Maya",
                Voice::Marin,
                "friendly and encouraging, with a relaxed pace",
                GreetingStyle::Warm,
            ),
            Persona::new(
                "professor",
                "Dr. Hale",
                Voice::Cedar,
                "precise and measured, like a university lecturer",
                GreetingStyle::Formal,
            ),
            Persona::new(
                "host",
                "Jules",
                Voice::Verse,
                "upbeat and lively, like a conference emcee",
                GreetingStyle::Energetic,
            ),
        ])
    }
}
