//! # Appeal Intake Linker
//!
//! Every absence becomes eligible for dispute the moment it is recorded:
//! one `AppealIntakeLink` per absence, written in the same step.

use crate::store::HealthStore;
use crate::{AbsenceDetermination, AppealIntakeLink, AppealLinkId, AppealStatus, HealthError};

/// Create one `Eligible` link per absence, as a single batch.
pub fn link_appeals<S: HealthStore + ?Sized>(
    store: &mut S,
    absences: &[AbsenceDetermination],
) -> Result<Vec<AppealIntakeLink>, HealthError> {
    let links = absences
        .iter()
        .map(|absence| AppealIntakeLink {
            id: AppealLinkId::default(),
            program_id: absence.program_id.clone(),
            determination_id: absence.id,
            status: AppealStatus::Eligible,
        })
        .collect();
    let stored = store.insert_appeal_links(links)?;
    tracing::debug!(links = stored.len(), "appeal links created");
    Ok(stored)
}
