//! # Recruiting Impact Reader
//!
//! Read-only view over the latest succeeded run: which absences can be
//! mitigated by adding personnel, how urgent stabilization is, and how much
//! each incoming candidate would help.
//!
//! ## Scoring
//!
//! All signals are integer basis points in `0..=BP_SCALE`.
//!
//! | Signal | Value |
//! |---|---|
//! | coverage | `min(BP_SCALE, units * BP_SCALE / deficit)` |
//! | confidence | candidate confidence, clamped |
//! | time alignment | `BP_SCALE - LATE_HORIZON_PENALTY_BP * horizons_late` |
//!
//! `impact = (5 * coverage + 3 * confidence + 2 * time_alignment) / 10`, and
//! a candidate's total is the sum over every recruitable absence whose node it
//! contributes to. Tiers cut the total at 20 000, 10 000 and 2 500 bp.

use crate::inspect::latest_succeeded_run;
use crate::primitives::{
    BP_SCALE, CONFIDENCE_WEIGHT, COVERAGE_WEIGHT, LATE_HORIZON_PENALTY_BP, TIER0_THRESHOLD_BP,
    TIER1_THRESHOLD_BP, TIER2_THRESHOLD_BP, TIME_ALIGNMENT_WEIGHT,
};
use crate::store::HealthStore;
use crate::{AbsenceDetermination, AbsenceId, HealthError, Horizon, ProgramId, RunId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Where a recruitable absence is routed and what to tell recruiters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recruitability {
    pub sector_key: String,
    #[serde(default)]
    pub notes: String,
}

/// Decides whether an absence can be mitigated by recruiting.
pub trait RecruitabilityClassifier: Send + Sync {
    /// `None` means the absence is not recruitable.
    fn classify(&self, absence: &AbsenceDetermination) -> Option<Recruitability>;
}

/// Classifies by node code, with an optional fallback for unlisted nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileClassifier {
    profiles: BTreeMap<String, Recruitability>,
    fallback: Option<Recruitability>,
}

impl ProfileClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every absence is recruitable into `sector_key`.
    #[must_use]
    pub fn uniform(sector_key: impl Into<String>) -> Self {
        Self::new().with_fallback(sector_key, "")
    }

    #[must_use]
    pub fn with_profile(
        mut self,
        node_code: impl Into<String>,
        sector_key: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        self.profiles.insert(
            node_code.into(),
            Recruitability {
                sector_key: sector_key.into(),
                notes: notes.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, sector_key: impl Into<String>, notes: impl Into<String>) -> Self {
        self.fallback = Some(Recruitability {
            sector_key: sector_key.into(),
            notes: notes.into(),
        });
        self
    }
}

impl RecruitabilityClassifier for ProfileClassifier {
    fn classify(&self, absence: &AbsenceDetermination) -> Option<Recruitability> {
        self.profiles
            .get(&absence.evidence.node_code)
            .or(self.fallback.as_ref())
            .cloned()
    }
}

// =============================================================================
// OUTPUT TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilizationBand {
    WithinTolerances,
    StabilizingRequired,
}

impl StabilizationBand {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StabilizationBand::WithinTolerances => "within_tolerances",
            StabilizationBand::StabilizingRequired => "stabilizing_required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stabilization {
    pub band: StabilizationBand,
    pub message: String,
    pub recruitable_absence_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nobody covers the node.
    Critical,
    /// Covered, but below the minimum.
    Elevated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitableAbsence {
    pub absence_id: AbsenceId,
    pub node_code: String,
    pub horizon: Horizon,
    pub severity: Severity,
    pub coverage_count: u32,
    pub min_coverage: u32,
    pub notes: String,
}

/// How many assignments a candidate would add to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub node_code: String,
    pub units: u32,
}

/// A candidate record from the recruiting pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitCandidate {
    pub id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Likelihood the candidate joins, in basis points.
    pub confidence_bp: u32,
    /// Horizon at which the candidate would be available.
    pub arrival: Horizon,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
    #[serde(default)]
    pub rationale: Vec<String>,
}

fn default_active() -> bool {
    true
}

/// One candidate's score against one absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceImpact {
    pub absence_id: AbsenceId,
    pub node_code: String,
    pub horizon: Horizon,
    pub coverage_bp: u32,
    pub confidence_bp: u32,
    pub time_alignment_bp: u32,
    pub impact_bp: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateImpact {
    pub candidate_id: String,
    pub name: String,
    pub total_impact_bp: u32,
    /// 0 = high contribution, 3 = negligible.
    pub tier: u8,
    pub touched: Vec<AbsenceImpact>,
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitingImpact {
    pub program_id: ProgramId,
    /// Run the view was built from; `None` if the program has no succeeded run.
    pub run_id: Option<RunId>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub as_of_system_time: Option<Timestamp>,
    pub horizon: Option<Horizon>,
    pub stabilization: Stabilization,
    /// Grouped by sector key.
    pub recruitable_absences: BTreeMap<String, Vec<RecruitableAbsence>>,
    /// Sorted by tier, then total impact descending, then candidate id.
    pub cohorts: Vec<CandidateImpact>,
}

// =============================================================================
// SCORING
// =============================================================================

/// Share of the deficit the candidate's units close, capped at 1.0.
#[must_use]
pub fn coverage_signal(units: u32, deficit: u32) -> u32 {
    if deficit == 0 {
        return 0;
    }
    let share = u64::from(units) * u64::from(BP_SCALE) / u64::from(deficit);
    share.min(u64::from(BP_SCALE)) as u32
}

/// Full alignment when the candidate arrives at or before the absence horizon.
#[must_use]
pub fn time_alignment_signal(arrival: Horizon, absence_horizon: Horizon) -> u32 {
    let late = arrival.index().saturating_sub(absence_horizon.index()) as u32;
    BP_SCALE.saturating_sub(LATE_HORIZON_PENALTY_BP.saturating_mul(late))
}

#[must_use]
pub fn impact_score(coverage_bp: u32, confidence_bp: u32, time_alignment_bp: u32) -> u32 {
    let weighted = COVERAGE_WEIGHT * coverage_bp.min(BP_SCALE)
        + CONFIDENCE_WEIGHT * confidence_bp.min(BP_SCALE)
        + TIME_ALIGNMENT_WEIGHT * time_alignment_bp.min(BP_SCALE);
    weighted / (COVERAGE_WEIGHT + CONFIDENCE_WEIGHT + TIME_ALIGNMENT_WEIGHT)
}

#[must_use]
pub fn tier_for(total_impact_bp: u32) -> u8 {
    if total_impact_bp >= TIER0_THRESHOLD_BP {
        0
    } else if total_impact_bp >= TIER1_THRESHOLD_BP {
        1
    } else if total_impact_bp >= TIER2_THRESHOLD_BP {
        2
    } else {
        3
    }
}

fn severity_of(absence: &AbsenceDetermination) -> Severity {
    if absence.evidence.coverage_count == 0 {
        Severity::Critical
    } else {
        Severity::Elevated
    }
}

/// Score one candidate against the recruitable absences.
#[must_use]
pub fn score_candidate(
    candidate: &RecruitCandidate,
    absences: &[&AbsenceDetermination],
) -> CandidateImpact {
    let confidence_bp = candidate.confidence_bp.min(BP_SCALE);
    let mut touched = Vec::new();
    let mut total: u32 = 0;

    for absence in absences {
        let units: u32 = candidate
            .contributions
            .iter()
            .filter(|c| c.node_code == absence.evidence.node_code)
            .fold(0, |acc, c| acc.saturating_add(c.units));
        if units == 0 {
            continue;
        }
        let deficit = absence
            .evidence
            .min_coverage
            .saturating_sub(absence.evidence.coverage_count);
        let coverage_bp = coverage_signal(units, deficit);
        let time_alignment_bp = time_alignment_signal(candidate.arrival, absence.horizon);
        let impact_bp = impact_score(coverage_bp, confidence_bp, time_alignment_bp);
        total = total.saturating_add(impact_bp);
        touched.push(AbsenceImpact {
            absence_id: absence.id,
            node_code: absence.evidence.node_code.clone(),
            horizon: absence.horizon,
            coverage_bp,
            confidence_bp,
            time_alignment_bp,
            impact_bp,
        });
    }

    CandidateImpact {
        candidate_id: candidate.id.clone(),
        name: candidate.name.clone(),
        total_impact_bp: total,
        tier: tier_for(total),
        touched,
        rationale: candidate.rationale.clone(),
    }
}

// =============================================================================
// READER
// =============================================================================

/// Builds the recruiting view. Performs no writes.
pub struct RecruitingImpactReader<'a, S: ?Sized> {
    store: &'a S,
    classifier: &'a dyn RecruitabilityClassifier,
}

impl<'a, S: HealthStore + ?Sized> RecruitingImpactReader<'a, S> {
    pub fn new(store: &'a S, classifier: &'a dyn RecruitabilityClassifier) -> Self {
        Self { store, classifier }
    }

    /// Read the latest succeeded run for `program`.
    ///
    /// `horizon = None` considers all four horizons.
    pub fn read(
        &self,
        program: &ProgramId,
        horizon: Option<Horizon>,
        candidates: &[RecruitCandidate],
    ) -> Result<RecruitingImpact, HealthError> {
        let Some(run) = latest_succeeded_run(self.store, program)? else {
            return Ok(RecruitingImpact {
                program_id: program.clone(),
                run_id: None,
                as_of_system_time: None,
                horizon,
                stabilization: Stabilization {
                    band: StabilizationBand::WithinTolerances,
                    message: "No completed capability health run exists for this program yet."
                        .to_string(),
                    recruitable_absence_count: 0,
                },
                recruitable_absences: BTreeMap::new(),
                cohorts: Vec::new(),
            });
        };

        let provenance = self
            .store
            .provenance_for_run(run.id)?
            .ok_or_else(|| HealthError::NotFound(format!("provenance for run {}", run.id)))?;
        let absences = self.store.absences_for_provenance(provenance.id)?;

        let mut recruitable = Vec::new();
        let mut grouped: BTreeMap<String, Vec<RecruitableAbsence>> = BTreeMap::new();
        for absence in absences
            .iter()
            .filter(|a| horizon.is_none_or(|h| a.horizon == h))
        {
            let Some(class) = self.classifier.classify(absence) else {
                continue;
            };
            grouped
                .entry(class.sector_key)
                .or_default()
                .push(RecruitableAbsence {
                    absence_id: absence.id,
                    node_code: absence.evidence.node_code.clone(),
                    horizon: absence.horizon,
                    severity: severity_of(absence),
                    coverage_count: absence.evidence.coverage_count,
                    min_coverage: absence.evidence.min_coverage,
                    notes: class.notes,
                });
            recruitable.push(absence);
        }

        let count = recruitable.len();
        let stabilization = if count == 0 {
            Stabilization {
                band: StabilizationBand::WithinTolerances,
                message: "All recruitable capability coverage is within tolerances.".to_string(),
                recruitable_absence_count: 0,
            }
        } else {
            Stabilization {
                band: StabilizationBand::StabilizingRequired,
                message: format!(
                    "{} recruitable capability absence(s) need stabilizing.",
                    count
                ),
                recruitable_absence_count: count,
            }
        };

        let mut cohorts: Vec<CandidateImpact> = candidates
            .iter()
            .filter(|c| c.is_active)
            .map(|c| score_candidate(c, &recruitable))
            .collect();
        cohorts.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then(b.total_impact_bp.cmp(&a.total_impact_bp))
                .then(a.candidate_id.cmp(&b.candidate_id))
        });

        tracing::debug!(
            program_id = %program,
            run_id = %run.id,
            recruitable = count,
            candidates = cohorts.len(),
            band = stabilization.band.as_str(),
            "recruiting impact read"
        );

        Ok(RecruitingImpact {
            program_id: program.clone(),
            run_id: Some(run.id),
            as_of_system_time: Some(provenance.system_time),
            horizon,
            stabilization,
            recruitable_absences: grouped,
            cohorts,
        })
    }
}
