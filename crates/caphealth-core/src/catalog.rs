//! # Capability Catalog
//!
//! Defines capability nodes and their coverage, redundancy and fragility
//! requirements, and feeds assignment rows into the store.

use crate::primitives::{MAX_CATALOG_NODES, MAX_NODE_CODE_LENGTH};
use crate::store::HealthStore;
use crate::{CapabilityNodeId, HealthError, NodeDef, ProgramCapabilityAssignment, ProgramId};
use std::collections::{BTreeMap, BTreeSet};

/// The catalog seeded when no override is configured.
#[must_use]
pub fn default_catalog() -> Vec<NodeDef> {
    vec![
        NodeDef::new("coaching_continuity", "Coaching Continuity", 1)
            .with_description("A coach is available to lead every scheduled session")
            .with_min_depth(1),
        NodeDef::new("compliance_authority", "Compliance Authority", 1)
            .with_description("Someone is authorized to sign off on eligibility and safety")
            .with_min_depth(1),
        NodeDef::new("recruiting_function", "Recruiting Function", 1)
            .with_description("Someone owns the pipeline of incoming athletes")
            .with_min_depth(1),
    ]
}

/// Check node definitions before anything is written.
pub fn validate_node_defs(defs: &[NodeDef]) -> Result<(), HealthError> {
    if defs.len() > MAX_CATALOG_NODES {
        return Err(HealthError::Validation(format!(
            "catalog has {} nodes, maximum is {}",
            defs.len(),
            MAX_CATALOG_NODES
        )));
    }
    let mut seen = BTreeSet::new();
    for def in defs {
        let code = def.node_code.trim();
        if code.is_empty() {
            return Err(HealthError::Validation("nodeCode is required".to_string()));
        }
        if code != def.node_code {
            return Err(HealthError::Validation(format!(
                "nodeCode '{}' has surrounding whitespace",
                def.node_code
            )));
        }
        if code.len() > MAX_NODE_CODE_LENGTH {
            return Err(HealthError::Validation(format!(
                "nodeCode '{}' exceeds maximum {} bytes",
                code, MAX_NODE_CODE_LENGTH
            )));
        }
        if def.name.trim().is_empty() {
            return Err(HealthError::Validation(format!(
                "node '{}' has no name",
                code
            )));
        }
        if !seen.insert(code) {
            return Err(HealthError::Validation(format!(
                "nodeCode '{}' appears more than once",
                code
            )));
        }
    }
    Ok(())
}

/// Idempotent insert-or-update of node definitions keyed by
/// `(program, node_code)`.
///
/// Re-invoking with identical input returns the same ids and adds no rows.
pub fn seed_or_update_nodes<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    defs: &[NodeDef],
) -> Result<Vec<CapabilityNodeId>, HealthError> {
    validate_node_defs(defs)?;
    let ids = store.upsert_catalog(program, defs)?;
    tracing::debug!(program_id = %program, nodes = ids.len(), "catalog seeded");
    Ok(ids)
}

/// Insert the definitions whose `node_code` the program lacks.
///
/// Existing rows are left as they are, so edits made through
/// [`seed_or_update_nodes`] survive later computes. Returns ids in input
/// order.
pub fn seed_missing_nodes<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    defs: &[NodeDef],
) -> Result<Vec<CapabilityNodeId>, HealthError> {
    validate_node_defs(defs)?;
    let mut known: BTreeMap<String, CapabilityNodeId> = store
        .catalog(program)?
        .into_iter()
        .map(|entry| (entry.node.node_code, entry.node.id))
        .collect();

    let missing: Vec<NodeDef> = defs
        .iter()
        .filter(|def| !known.contains_key(&def.node_code))
        .cloned()
        .collect();
    if !missing.is_empty() {
        let ids = store.upsert_catalog(program, &missing)?;
        for (def, id) in missing.iter().zip(ids) {
            known.insert(def.node_code.clone(), id);
        }
        tracing::debug!(program_id = %program, added = missing.len(), "catalog extended");
    }

    defs.iter()
        .map(|def| {
            known.get(&def.node_code).copied().ok_or_else(|| {
                HealthError::Storage(format!("node '{}' was not stored", def.node_code))
            })
        })
        .collect()
}

/// Record that `assignee` covers the node with `node_code`.
///
/// Returns `HealthError::NotFound` if the program has no such node.
pub fn assign_node<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    node_code: &str,
    assignee: &str,
    is_active: bool,
) -> Result<ProgramCapabilityAssignment, HealthError> {
    let assignee = assignee.trim();
    if assignee.is_empty() {
        return Err(HealthError::Validation("assignee is required".to_string()));
    }
    let node = store
        .catalog(program)?
        .into_iter()
        .find(|entry| entry.node.node_code == node_code.trim())
        .ok_or_else(|| {
            HealthError::NotFound(format!("node '{}' in program {}", node_code, program))
        })?;

    let assignment = ProgramCapabilityAssignment {
        program_id: program.clone(),
        capability_node_id: node.node.id,
        assignee: assignee.to_string(),
        is_active,
    };
    store.upsert_assignment(&assignment)?;
    tracing::debug!(
        program_id = %program,
        node_code = %node.node.node_code,
        assignee,
        is_active,
        "assignment recorded"
    );
    Ok(assignment)
}
