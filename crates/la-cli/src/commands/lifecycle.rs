use anyhow::Result;
use la_application::SweepOutcome;
use la_core::lifecycle::InstallReason;

use super::Context;

pub async fn install(ctx: &Context, reason: InstallReason) -> Result<()> {
    let outcome = ctx.host.install(reason).await;
    report(outcome);
    Ok(())
}

pub async fn startup(ctx: &Context) -> Result<()> {
    let outcome = ctx.host.startup().await;
    report(outcome);
    Ok(())
}

fn report(outcome: SweepOutcome) {
    let message = match outcome {
        SweepOutcome::Empty => "No stored session.",
        SweepOutcome::Kept => "Stored session is valid.",
        SweepOutcome::Removed => "Removed an invalid stored session.",
        SweepOutcome::Failed => "Could not check the stored session (see logs).",
    };
    println!("{message}");
}
