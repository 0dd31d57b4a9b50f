use anyhow::{Result, anyhow};
use la_core::auth::{StudentData, StudentDataSource};

use super::Context;

/// Prints membership-checked rows for the signed-in student.
pub async fn read(ctx: &Context, data: StudentData, organization: Option<String>) -> Result<()> {
    let session = ctx
        .host
        .sessions()
        .load()
        .await?
        .into_valid()
        .ok_or_else(|| anyhow!("Not signed in. Run `la login` first."))?;
    let organization = organization
        .or(session.user.organization_id)
        .ok_or_else(|| anyhow!("No organization on the session; pass --org"))?;

    let rows = ctx
        .supabase
        .ensure_secure_access(&organization, data, &session.token)
        .await?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
