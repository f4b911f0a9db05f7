//! Clarifying questions and the user's answers

use serde::{Deserialize, Serialize};

/// A clarifying question for the bid team
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub question_id: String,
    pub question_text: String,
    /// Why the question matters
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub category: String,
    /// "high", "medium" or "low"
    #[serde(default)]
    pub priority: String,
    /// Requirement the question relates to
    #[serde(default)]
    pub requirement_id: Option<String>,
    #[serde(default)]
    pub answered: bool,
}

/// An answer to a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub question_id: String,
    pub answer_text: String,
}

/// Questions and answers gathered in one chat session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl ConversationContext {
    /// Empty session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Latest answer recorded for a question
    pub fn get_answer_for_question(&self, question_id: &str) -> Option<&str> {
        self.answers
            .iter()
            .rev()
            .find(|a| a.question_id == question_id)
            .map(|a| a.answer_text.as_str())
    }

    /// Record answers, marking their questions as answered
    pub fn record_answers(&mut self, answers: impl IntoIterator<Item = Answer>) {
        for answer in answers {
            if let Some(question) = self
                .questions
                .iter_mut()
                .find(|q| q.question_id == answer.question_id)
            {
                question.answered = true;
            }
            self.answers.push(answer);
        }
    }

    /// Answered questions as `Q: ...\nA: ...` blocks separated by blank lines
    pub fn get_qa_context(&self) -> String {
        self.questions
            .iter()
            .filter_map(|q| {
                self.get_answer_for_question(&q.question_id)
                    .filter(|a| !a.trim().is_empty())
                    .map(|a| format!("Q: {}\nA: {}", q.question_text, a))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
