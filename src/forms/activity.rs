//! Forms for activity logging: notes and calls.

use serde::Deserialize;
use validator::Validate;

use crate::coordinator::EntityMutation;
use crate::domain::entity::CallOutcome;
use crate::domain::types::{NonEmptyString, NoteContent};
use crate::forms::FormError;

#[derive(Debug, Deserialize, Validate)]
/// Form data for attaching a note to an entity.
pub struct AddNoteForm {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
/// Form data for logging a call.
pub struct LogCallForm {
    pub outcome: CallOutcome,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<AddNoteForm> for EntityMutation {
    type Error = FormError;

    fn try_from(form: AddNoteForm) -> Result<Self, Self::Error> {
        form.validate()?;
        let content = NoteContent::new(form.content).map_err(|_| FormError::EmptyContent)?;
        Ok(EntityMutation::AddNote { content })
    }
}

impl TryFrom<LogCallForm> for EntityMutation {
    type Error = FormError;

    fn try_from(form: LogCallForm) -> Result<Self, Self::Error> {
        form.validate()?;
        Ok(EntityMutation::LogCall {
            outcome: form.outcome,
            notes: NonEmptyString::optional(form.notes),
        })
    }
}
