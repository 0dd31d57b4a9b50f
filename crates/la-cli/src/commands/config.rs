use anyhow::Result;

use super::Context;

pub async fn show(ctx: &Context) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&ctx.config)?);
    Ok(())
}

pub async fn set(ctx: &Context, key: &str, value: &str) -> Result<()> {
    ctx.config_service.set(key, value).await?;
    println!("{key} set.");
    Ok(())
}

pub async fn unset(ctx: &Context, key: &str) -> Result<()> {
    ctx.config_service.unset(key).await?;
    println!("{key} removed.");
    Ok(())
}

pub async fn test(ctx: &Context) -> Result<()> {
    ctx.supabase.check_connection().await?;
    println!("Supabase connection successful.");
    Ok(())
}
