//! Subcommand implementations. Each prints plain text to stdout.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tracing::{debug, warn};

use folio_core::models::{Holding, StockQuote};
use folio_core::{ApiError, Config, DashboardApi, Identity, RefreshProofStore, SessionStore};

// ============================================================================
// Session
// ============================================================================

pub async fn register(session: &SessionStore, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        bail!("Email is required");
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password is required");
    }
    if rpassword::prompt_password("Confirm password: ")? != password {
        bail!("Passwords do not match");
    }

    session
        .register(&email, &password)
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => anyhow::anyhow!("{} is already registered", email),
            other => anyhow::Error::new(other).context("Registration failed"),
        })?;

    println!("Account created. Sign in with `folio login --email {}`.", email);
    Ok(())
}

pub async fn login(session: &SessionStore, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        bail!("Email is required");
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password is required");
    }

    session
        .login(&email, &password)
        .await
        .map_err(|e| match e {
            ApiError::Unauthorized => anyhow::anyhow!("Invalid email or password"),
            other => anyhow::Error::new(other).context("Sign-in failed"),
        })?;

    config.last_email = Some(email.clone());
    config.save().context("Failed to save configuration")?;

    match session.identity().await {
        Some(identity) => println!("Signed in as {}", describe(&identity)),
        None => println!("Signed in as {}", email),
    }
    Ok(())
}

pub async fn logout(session: &SessionStore, config: &Config) -> Result<()> {
    if let Err(e) = session.logout().await {
        warn!(error = %e, "Backend sign-out failed, cleared local session anyway");
    }
    if let Some(email) = config.last_email.as_deref() {
        RefreshProofStore::delete(email)?;
    }
    println!("Signed out");
    Ok(())
}

/// Save the current refresh cookie for the next run, or drop a stale one.
pub fn persist_refresh_proof(session: &SessionStore, config: &Config) {
    let Some(email) = config.last_email.as_deref() else {
        return;
    };

    let result = match session.refresh_proof() {
        Some(proof) => RefreshProofStore::store(email, &proof),
        None => RefreshProofStore::delete(email),
    };
    if let Err(e) = result {
        warn!(error = %e, "Could not update refresh cookie in keychain");
    }
}

pub async fn whoami(api: &DashboardApi) -> Result<()> {
    let user = api.current_user().await.map_err(not_signed_in)?;
    match user.email {
        Some(email) => println!("{} ({})", email, user.id),
        None => println!("{}", user.id),
    }
    Ok(())
}

// ============================================================================
// Portfolio
// ============================================================================

pub async fn portfolio(api: &DashboardApi) -> Result<()> {
    let me = api.require_identity().await.map_err(not_signed_in)?;
    let portfolio = api.portfolio(&me.id).await.map_err(not_signed_in)?;

    if portfolio.is_empty() {
        println!("No holdings yet. Add one with `folio add <symbol> <quantity> <price>`.");
        return Ok(());
    }

    let quotes = join_all(portfolio.symbols().into_iter().map(|symbol| async move {
        match api.quote(symbol).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                debug!(symbol = symbol, error = %e, "Quote unavailable");
                None
            }
        }
    }))
    .await;

    println!(
        "{:<8} {:>10} {:>10} {:>10} {:>12} {:>10}",
        "SYMBOL", "QTY", "AVG", "PRICE", "VALUE", "GAIN %"
    );
    let mut total = 0.0;
    for holding in &portfolio.holdings {
        let quote = quotes
            .iter()
            .flatten()
            .find(|quote| quote.symbol.eq_ignore_ascii_case(&holding.symbol));
        let row = HoldingRow::new(holding, quote);
        total += row.value.unwrap_or(0.0);
        println!("{}", row);
    }

    let total = portfolio.total_market_value.unwrap_or(total);
    println!("{:<8} {:>67.2}", "TOTAL", total);
    Ok(())
}

struct HoldingRow<'a> {
    holding: &'a Holding,
    price: Option<f64>,
    value: Option<f64>,
    gain_percent: Option<f64>,
}

impl<'a> HoldingRow<'a> {
    fn new(holding: &'a Holding, quote: Option<&StockQuote>) -> Self {
        let price = quote.map(|quote| quote.current);
        let value = price.map(|price| price * holding.quantity);
        let gain_percent = price
            .filter(|_| holding.average_price > 0.0)
            .map(|price| (price - holding.average_price) / holding.average_price * 100.0);
        Self {
            holding,
            price,
            value,
            gain_percent,
        }
    }
}

impl std::fmt::Display for HoldingRow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<8} {:>10} {:>10.2} {:>10} {:>12} {:>10}",
            self.holding.symbol,
            self.holding.quantity,
            self.holding.average_price,
            fmt_amount(self.price),
            fmt_amount(self.value),
            fmt_amount(self.gain_percent),
        )
    }
}

pub async fn add(api: &DashboardApi, symbol: &str, quantity: f64, price: f64) -> Result<()> {
    let me = api.require_identity().await.map_err(not_signed_in)?;
    let item = api
        .add_holding(&me.id, symbol, quantity, price)
        .await
        .map_err(not_signed_in)?;
    println!(
        "{}: {} shares at {:.2} average",
        item.symbol, item.quantity, item.average_price
    );
    Ok(())
}

pub async fn remove(api: &DashboardApi, symbol: &str) -> Result<()> {
    let me = api.require_identity().await.map_err(not_signed_in)?;
    api.remove_holding(&me.id, symbol)
        .await
        .map_err(not_signed_in)?;
    println!("Removed {}", symbol.trim().to_uppercase());
    Ok(())
}

// ============================================================================
// Market data and agent
// ============================================================================

pub async fn quote(api: &DashboardApi, symbol: &str) -> Result<()> {
    let quote = api.quote(symbol).await.map_err(not_signed_in)?;
    println!(
        "{} {:.2} ({:+.2}, {:+.2}%)",
        quote.symbol, quote.current, quote.change, quote.percent
    );
    Ok(())
}

pub async fn search(api: &DashboardApi, query: &str) -> Result<()> {
    let hits = api.search(query).await.map_err(not_signed_in)?;
    if hits.is_empty() {
        println!("No matches");
    }
    for hit in hits {
        println!("{}", hit.label());
    }
    Ok(())
}

pub async fn ask(api: &DashboardApi, prompt: &str) -> Result<()> {
    let reply = api.ask_agent(prompt).await.map_err(not_signed_in)?;
    println!("{}", reply.display_text());

    let sources: Vec<_> = reply
        .sources
        .iter()
        .filter_map(|source| source.uri.as_deref().map(|uri| (uri, source.title.as_deref())))
        .collect();
    if !sources.is_empty() {
        println!();
        println!("Sources:");
        for (uri, title) in sources {
            match title {
                Some(title) => println!("  {} <{}>", title, uri),
                None => println!("  {}", uri),
            }
        }
    }
    Ok(())
}

// ============================================================================
// Settings
// ============================================================================

pub async fn update_username(api: &DashboardApi, username: &str) -> Result<()> {
    let reply = api.update_username(username).await.map_err(not_signed_in)?;
    print_message(reply.message, "Username updated");
    Ok(())
}

pub async fn update_email(api: &DashboardApi, email: &str) -> Result<()> {
    let reply = api.update_email(email).await.map_err(not_signed_in)?;
    print_message(reply.message, "Email updated");
    Ok(())
}

pub async fn set_theme(api: &DashboardApi, theme: &str) -> Result<()> {
    let me = api.require_identity().await.map_err(not_signed_in)?;
    let reply = api.set_theme(&me.id, theme).await.map_err(not_signed_in)?;
    print_message(reply.message, "Theme updated");
    Ok(())
}

pub async fn set_notifications(api: &DashboardApi, enabled: bool) -> Result<()> {
    let me = api.require_identity().await.map_err(not_signed_in)?;
    let reply = api
        .set_notifications(&me.id, enabled)
        .await
        .map_err(not_signed_in)?;
    print_message(reply.message, "Notification preference updated");
    Ok(())
}

pub async fn delete_account(api: &DashboardApi, config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to delete the account without --yes");
    }
    let reply = api.delete_account().await.map_err(not_signed_in)?;
    api.client().session().clear().await;
    if let Some(email) = config.last_email.as_deref() {
        RefreshProofStore::delete(email)?;
    }
    print_message(reply.message, "Account deleted");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn not_signed_in(e: ApiError) -> anyhow::Error {
    match e {
        ApiError::Unauthorized => anyhow::anyhow!("Not signed in - run `folio login`"),
        other => other.into(),
    }
}

fn describe(identity: &Identity) -> String {
    match &identity.email {
        Some(email) => format!("{} ({})", email, identity.id),
        None => identity.id.clone(),
    }
}

fn print_message(message: Option<String>, fallback: &str) {
    println!("{}", message.unwrap_or_else(|| fallback.to_string()));
}

fn fmt_amount(value: Option<f64>) -> String {
    value
        .map(|value| format!("{:.2}", value))
        .unwrap_or_else(|| "-".to_string())
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
