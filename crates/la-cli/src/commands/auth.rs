use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use la_application::popup::{PopupController, PopupView};
use la_core::auth::WebAuthFlow;
use la_core::error::LaError;
use la_core::session::Session;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Context;

pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:54321/auth/callback";

pub async fn login(ctx: &Context, email: &str, password: &str) -> Result<()> {
    ctx.host.start_background().await;
    let mut popup = ctx.host.popup();
    let result = popup.sign_in_with_password(email, password).await;
    finish(&popup, result)
}

pub async fn send_code(ctx: &Context, email: &str) -> Result<()> {
    let mut popup = ctx.host.popup();
    let result = popup.request_code(email).await;
    println!("{}", popup.status());
    result.map_err(Into::into)
}

pub async fn verify_code(ctx: &Context, email: &str, code: &str) -> Result<()> {
    ctx.host.start_background().await;
    let mut popup = ctx.host.popup();
    let result = popup.verify_code(email, code).await;
    finish(&popup, result)
}

pub async fn oauth(ctx: &Context, redirect_url: String) -> Result<()> {
    ctx.host.start_background().await;
    let mut popup = ctx
        .host
        .popup()
        .with_web_auth(Arc::new(TerminalWebAuth { redirect_url }));
    let result = popup.sign_in_with_oauth().await;
    finish(&popup, result)
}

pub async fn status(ctx: &Context) -> Result<()> {
    ctx.host.start_background().await;
    let mut popup = ctx.host.popup();
    if !popup.load().await {
        println!("Not signed in.");
        return Ok(());
    }
    print_home(&popup);
    Ok(())
}

pub async fn sign_out(ctx: &Context) -> Result<()> {
    let mut popup = ctx.host.popup();
    popup.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

fn finish(popup: &PopupController, result: la_core::error::Result<Session>) -> Result<()> {
    match result {
        Ok(_) => {
            print_home(popup);
            Ok(())
        }
        Err(e) => bail!("{}", status_or(popup, &e)),
    }
}

fn status_or(popup: &PopupController, err: &LaError) -> String {
    if popup.status().is_empty() {
        err.to_string()
    } else {
        popup.status().to_string()
    }
}

fn print_home(popup: &PopupController) {
    println!("{}", popup.status());
    if let PopupView::Home {
        session,
        communities,
    } = popup.view()
    {
        let user = &session.user;
        println!(
            "  organization: {}",
            user.organization_name
                .as_deref()
                .or(user.organization_id.as_deref())
                .unwrap_or("-")
        );
        println!("  role: {}", user.role.as_deref().unwrap_or("-"));
        println!("  tier: {}", user.tier.as_deref().unwrap_or("-"));
        if communities.is_empty() {
            println!("  communities: none");
        }
        for community in communities {
            println!("  [{}] {}", community.initials, community.name);
        }
    }
}

/// Prints the authorize URL and reads the final redirect back from stdin.
struct TerminalWebAuth {
    redirect_url: String,
}

#[async_trait]
impl WebAuthFlow for TerminalWebAuth {
    fn redirect_url(&self) -> String {
        self.redirect_url.clone()
    }

    async fn launch(&self, auth_url: &str) -> la_core::error::Result<String> {
        eprintln!("Open this URL in a browser and sign in:\n\n  {auth_url}\n");
        eprintln!("Then paste the URL you were redirected to:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        let redirected = line.trim();
        if redirected.is_empty() {
            return Err(LaError::auth("Authorization denied"));
        }
        Ok(redirected.to_string())
    }
}
