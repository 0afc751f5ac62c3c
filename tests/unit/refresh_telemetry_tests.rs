use console_gateway::Error;
use console_gateway::telemetry::refresh::{RefreshOutcome, RefreshTelemetry};
use uuid::Uuid;

#[test]
fn telemetry_preserves_context_and_id() {
    let context = Uuid::new_v4();
    let telemetry = RefreshTelemetry::new(context, 3);
    assert_eq!(telemetry.context(), context);
    assert_eq!(telemetry.generation(), 3);
    let first = telemetry.attempt_id();
    assert_eq!(first, telemetry.clone().attempt_id());
}

#[test]
fn settled_reports_outcome() {
    let telemetry = RefreshTelemetry::new(Uuid::new_v4(), 0);
    assert_eq!(telemetry.emit_settled(&Ok(())), RefreshOutcome::Success);
    assert_eq!(
        telemetry.emit_settled(&Err(Error::Api("refresh token revoked".into()))),
        RefreshOutcome::Failed
    );
}
