//! Candidate selection for task assignment

use tracing::debug;

use crate::agent::AgentRecord;
use crate::task::TaskAssignmentRequest;

/// Pick the agent a request should be routed to
///
/// 1. Keep agents that are idle or busy and below `max_workload`.
/// 2. Narrow to `preferred_agent_type` if at least one candidate has it.
/// 3. Narrow to agents sharing a capability with `requirements`, unless that
///    leaves nobody.
/// 4. Least workload wins; ties go to the lowest id.
pub fn select_agent<'a, I>(
    agents: I,
    request: &TaskAssignmentRequest,
    max_workload: u32,
) -> Option<&'a AgentRecord>
where
    I: IntoIterator<Item = &'a AgentRecord>,
{
    let mut candidates: Vec<&AgentRecord> = agents
        .into_iter()
        .filter(|agent| agent.has_capacity(max_workload))
        .collect();

    if let Some(preferred) = &request.preferred_agent_type {
        if candidates
            .iter()
            .any(|agent| &agent.agent_type == preferred)
        {
            candidates.retain(|agent| &agent.agent_type == preferred);
        } else {
            debug!(
                task_id = %request.task_id,
                preferred = %preferred,
                "No candidate of preferred type, keeping all candidates"
            );
        }
    }

    if !request.requirements.is_empty() {
        let matching: Vec<&AgentRecord> = candidates
            .iter()
            .copied()
            .filter(|agent| agent.has_any_capability(&request.requirements))
            .collect();
        if matching.is_empty() {
            debug!(
                task_id = %request.task_id,
                requirements = ?request.requirements,
                "No candidate advertises the requirements, falling back"
            );
        } else {
            candidates = matching;
        }
    }

    candidates
        .into_iter()
        .min_by(|a, b| a.workload.cmp(&b.workload).then_with(|| a.id.cmp(&b.id)))
}
