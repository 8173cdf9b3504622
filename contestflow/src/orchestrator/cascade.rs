//! Upward cascades from applications to contests to procedures.

use tracing::info;
use uuid::Uuid;

use crate::engine::Engine;
use crate::errors::Result;
use crate::events::ProcedureStageTransition;
use crate::instances::ops;

/// Second transaction of a cascade.
///
/// If the procedure sits at its `Contests` stage and every contest is
/// terminal, announces the stage transition. The procedure itself is not
/// mutated here; the `ProcedureStageAdvanced` handler applies the decision.
pub(crate) async fn recheck_procedure(
    engine: &Engine,
    procedure_instance_id: Uuid,
) -> Result<Option<ProcedureStageTransition>> {
    engine
        .transact(move |tables, outbox| {
            let decision = ops::procedure_ready_to_leave_contests(tables, procedure_instance_id)?;
            if let Some(transition) = &decision {
                info!(
                    %procedure_instance_id,
                    current_stage_id = %transition.current_stage_id,
                    next_stage_id = ?transition.next_stage_id,
                    "All contests terminal; requesting procedure stage transition"
                );
                outbox.push(transition.clone());
            }
            Ok(decision)
        })
        .await
}
