//! Forms driving lifecycle changes: terminal transitions, stage moves and
//! lead conversion.

use serde::Deserialize;
use validator::Validate;

use crate::coordinator::EntityMutation;
use crate::domain::entity::EntityKind;
use crate::domain::lifecycle::{CaseStage, validate_transition};
use crate::domain::types::{NonEmptyString, TransitionReason};
use crate::forms::FormError;

#[derive(Debug, Deserialize, Validate)]
/// Form data for a terminal status transition.
pub struct UpdateStatusForm {
    #[validate(length(min = 1))]
    pub status: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub reason: Option<String>,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateStatusForm {
    /// Validates the form for `kind`, enforcing the rule's reason
    /// requirement.
    pub fn into_mutation(self, kind: EntityKind) -> Result<EntityMutation, FormError> {
        self.validate()?;
        let rule = validate_transition(kind, &self.status)
            .map_err(|err| FormError::InvalidStatus(err.to_string()))?;

        let reason = self.reason.and_then(|r| TransitionReason::new(r).ok());
        if rule.reason_required && reason.is_none() {
            return Err(FormError::ReasonRequired(rule.label));
        }

        Ok(EntityMutation::UpdateStatus {
            status: self.status,
            reason,
            notes: NonEmptyString::optional(self.notes),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
/// Form data for dropping a case on a pipeline column.
pub struct StageForm {
    #[validate(length(min = 1))]
    pub stage: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<StageForm> for EntityMutation {
    type Error = FormError;

    fn try_from(form: StageForm) -> Result<Self, Self::Error> {
        form.validate()?;
        let stage: CaseStage = form.stage.parse().map_err(FormError::InvalidStage)?;
        Ok(EntityMutation::SetStage {
            stage,
            notes: NonEmptyString::optional(form.notes),
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
/// Optional notes accompanying a stage advance or lead conversion.
pub struct TransitionNotesForm {
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransitionNotesForm {
    pub fn into_notes(self) -> Result<Option<NonEmptyString>, FormError> {
        self.validate()?;
        Ok(NonEmptyString::optional(self.notes))
    }
}
