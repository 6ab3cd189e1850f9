/// A piece of the agent's spoken-output transcript.
///
/// Deltas arrive with `is_final == false`; the complete transcript of the
/// same item follows once with `is_final == true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptChunk {
    pub response_id: String,
    pub item_id: String,
    pub text: String,
    pub is_final: bool,
}

/// A completed transcription of what the user said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTranscript {
    pub item_id: String,
    pub transcript: String,
}
