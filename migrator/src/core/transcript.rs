//! Bounded conversation transcript for the generate-validate loop.
//!
//! The transcript grows with every attempt (feedback in, completion out). To
//! keep the prompt within budget the oldest exchange after the opening pair
//! is evicted: the system turn and the initial user prompt are always kept,
//! since they carry the module source and the format contract.

use serde::{Deserialize, Serialize};

/// Turns always retained at the front: system + initial user prompt.
const PROTECTED_TURNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Ordered turns with a hard upper bound on length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl Transcript {
    /// Start a transcript from the system prompt and the initial user prompt.
    pub fn new(system: impl Into<String>, initial_user: impl Into<String>, max_turns: usize) -> Self {
        let max_turns = max_turns.max(PROTECTED_TURNS + 2);
        Self {
            turns: vec![
                Turn {
                    role: Role::System,
                    content: system.into(),
                },
                Turn {
                    role: Role::User,
                    content: initial_user.into(),
                },
            ],
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest unprotected turn when full.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        while self.turns.len() >= self.max_turns {
            self.turns.remove(PROTECTED_TURNS);
        }
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(max_turns: usize) -> Transcript {
        Transcript::new("system", "initial", max_turns)
    }

    /// Turns append in order until the bound is reached.
    #[test]
    fn push_appends_in_order() {
        let mut t = transcript(8);
        t.push(Role::Assistant, "first answer");
        t.push(Role::User, "feedback");

        assert_eq!(t.len(), 4);
        assert_eq!(t.turns()[2].content, "first answer");
        assert_eq!(t.turns()[3].role, Role::User);
    }

    /// Eviction removes the oldest turn after the protected pair; the system
    /// and initial user turns survive any number of pushes.
    #[test]
    fn eviction_preserves_protected_turns() {
        let mut t = transcript(4);
        for i in 0..10 {
            t.push(Role::Assistant, format!("answer {i}"));
            t.push(Role::User, format!("feedback {i}"));
        }

        assert_eq!(t.len(), 4);
        assert_eq!(t.turns()[0].content, "system");
        assert_eq!(t.turns()[1].content, "initial");
        assert_eq!(t.turns()[2].content, "answer 9");
        assert_eq!(t.turns()[3].content, "feedback 9");
    }

    /// An unreasonably small bound is clamped so at least one exchange fits.
    #[test]
    fn tiny_bound_is_clamped() {
        let mut t = transcript(0);
        t.push(Role::Assistant, "answer");
        t.push(Role::User, "feedback");
        assert_eq!(t.len(), 4);
    }
}
