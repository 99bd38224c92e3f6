//! Text prompt dialog.
//!
//! Sends the prompt activity from its `PromptOptions`, then completes with the
//! text of the next message. When choices are given the reply must name one
//! of them (by value or synonym, ignoring case) and the prompt completes with
//! the choice's value; anything else re-sends the retry prompt.

use serde_json::Value;

use turnflow_core::dialog::Dialog;
use turnflow_core::dialog::host::TurnContext;
use turnflow_core::workflow::WorkflowError;
use turnflow_types::activity::{Activity, ActivityType, Choice, PromptOptions};
use turnflow_types::dialog::DialogTurnResult;

/// Prompt that waits for one text reply.
#[derive(Debug, Clone)]
pub struct TextPrompt {
    id: String,
}

impl TextPrompt {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    async fn send_prompt(
        &self,
        turn: &TurnContext,
        prompt: Option<&Activity>,
        choices: &[Choice],
    ) -> Result<(), WorkflowError> {
        if let Some(prompt) = prompt {
            turn.send_activity(with_choices(prompt, choices)).await?;
        }
        Ok(())
    }

    fn load_options(turn: &TurnContext) -> Result<PromptOptions, WorkflowError> {
        match turn.load_instance_state()? {
            Some(raw) => Ok(serde_json::from_value(raw)?),
            None => Ok(PromptOptions::default()),
        }
    }
}

impl Dialog for TextPrompt {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        turn: TurnContext,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let options: PromptOptions = match options {
            Some(raw) => serde_json::from_value(raw)?,
            None => PromptOptions::default(),
        };
        self.send_prompt(&turn, options.prompt.as_ref(), &options.choices)
            .await?;
        turn.save_instance_state(serde_json::to_value(&options)?)?;
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(&self, turn: TurnContext) -> Result<DialogTurnResult, WorkflowError> {
        let options = Self::load_options(&turn)?;
        match recognize(&turn.activity(), &options.choices) {
            Some(reply) => turn.end_dialog(Some(Value::String(reply))).await,
            None => {
                tracing::debug!(dialog_id = %self.id, "reply not recognized, prompting again");
                let retry = options.retry_prompt.as_ref().or(options.prompt.as_ref());
                self.send_prompt(&turn, retry, &options.choices).await?;
                Ok(DialogTurnResult::waiting())
            }
        }
    }

    async fn resume_dialog(
        &self,
        turn: TurnContext,
        _result: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let options = Self::load_options(&turn)?;
        self.send_prompt(&turn, options.prompt.as_ref(), &options.choices)
            .await?;
        Ok(DialogTurnResult::waiting())
    }
}

/// The prompt's reply, if the activity is an acceptable answer.
fn recognize(activity: &Activity, choices: &[Choice]) -> Option<String> {
    if activity.activity_type != ActivityType::Message {
        return None;
    }
    let text = activity.text().trim();
    if text.is_empty() {
        return None;
    }
    if choices.is_empty() {
        return Some(text.to_string());
    }
    choices
        .iter()
        .find(|choice| {
            std::iter::once(&choice.value)
                .chain(&choice.synonyms)
                .any(|candidate| candidate.eq_ignore_ascii_case(text))
        })
        .map(|choice| choice.value.clone())
}

/// Append the choice list to a text prompt.
fn with_choices(prompt: &Activity, choices: &[Choice]) -> Activity {
    let mut prompt = prompt.clone();
    if choices.is_empty() {
        return prompt;
    }
    let values: Vec<&str> = choices.iter().map(|c| c.value.as_str()).collect();
    prompt.text = Some(format!("{} ({})", prompt.text(), values.join(", ")));
    prompt
}
