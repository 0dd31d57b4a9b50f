use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use la_execution::PageHandle;

use super::Context;

pub const DEFAULT_PAGE_URL: &str = "https://www.skool.com/";

const BOOTSTRAP_WAIT: Duration = Duration::from_secs(5);

async fn mount(ctx: &Context, url: &str) -> Result<PageHandle> {
    let page = ctx
        .host
        .open_page(url)
        .await
        .ok_or_else(|| anyhow!("{url} is outside the assistant's host scope"))?;
    page.wait_until(BOOTSTRAP_WAIT, |s| s.bootstrapped)
        .await
        .context("Widget did not finish loading")?;
    Ok(page)
}

pub async fn page(ctx: &Context, url: &str) -> Result<()> {
    let page = mount(ctx, url).await?;
    let snapshot = page.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn chat(ctx: &Context, url: &str, message: &str) -> Result<()> {
    ctx.host.start_background().await;
    let page = mount(ctx, url).await?;
    match page.send_message(message).await? {
        Some(reply) => println!("{reply}"),
        None => println!("(nothing sent)"),
    }
    let snapshot = page.snapshot().await?;
    eprintln!("{}", snapshot.quota);
    Ok(())
}
