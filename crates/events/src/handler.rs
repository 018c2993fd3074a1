/// Run one command against an in-memory aggregate: decide, then evolve.
///
/// No persistence and no publication; the dispatcher in `miam-infra` wraps
/// the same two steps with a store and a bus. Mostly useful in tests that
/// walk an aggregate through its lifecycle.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: miam_core::Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
