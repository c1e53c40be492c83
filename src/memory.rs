use crate::error::{AgentError, Result};
use crate::message::{ContentBlock, Role, Turn};

/// Append-only conversation log owned by one agent.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn with_turns(turns: Vec<Turn>) -> Result<Self> {
        let mut transcript = Self::default();
        transcript.append_all(turns)?;
        Ok(transcript)
    }

    pub fn check(turn: &Turn) -> Result<()> {
        if turn.content.is_empty() {
            return Err(AgentError::InvalidTurn(format!(
                "{:?} turn has no content",
                turn.role
            )));
        }
        Ok(())
    }

    pub fn append(&mut self, turn: Turn) -> Result<()> {
        Self::check(&turn)?;
        self.turns.push(turn);
        Ok(())
    }

    /// Appends every turn or none of them.
    pub fn append_all(&mut self, turns: Vec<Turn>) -> Result<()> {
        turns.iter().try_for_each(Self::check)?;
        self.turns.extend(turns);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Final text produced by the assistant, if any.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|turn| {
                turn.role == Role::Assistant
                    && turn.content.iter().any(|c| matches!(c, ContentBlock::Text(_)))
            })
            .map(Turn::text)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
