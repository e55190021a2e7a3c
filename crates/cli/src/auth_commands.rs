use std::{path::PathBuf, time::Duration};

use {
    anyhow::{Result, anyhow, bail},
    chrono::{DateTime, Utc},
    clap::Subcommand,
    cs_config::{CsConfig, VcpConfig, load_config},
    cs_oauth::{
        AuthContext, LoginOptions, LoginOrchestrator, PortCandidateRange, ProviderIdentity,
        SystemBrowser, TlsPolicy, TokenStore, VcpToken, build_http_client,
    },
    secrecy::ExposeSecret,
    tracing::debug,
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Log in to every configured provider via the browser.
    Login {
        /// Ports tried for the local callback listener (MIN-MAX or PORT).
        #[arg(long, default_value_t = PortCandidateRange::default())]
        callback_ports: PortCandidateRange,
        /// How long to wait for the browser redirect, in milliseconds.
        #[arg(long, default_value_t = 120_000)]
        timeout_ms: u64,
    },
    /// Show token validity for all providers.
    Status,
    /// Print a provider's access token, refreshing tokens close to expiry.
    Token {
        /// Provider id from the configuration.
        #[arg(long)]
        provider: u32,
    },
    /// Remove all stored access tokens.
    Logout,
}

/// Where the configuration and the token store live.
pub struct AuthPaths {
    pub config: PathBuf,
    pub token_store: PathBuf,
}

pub async fn handle_auth(action: AuthAction, paths: &AuthPaths) -> Result<()> {
    match action {
        AuthAction::Login {
            callback_ports,
            timeout_ms,
        } => {
            login(paths, LoginOptions {
                callback_ports,
                callback_timeout: Duration::from_millis(timeout_ms),
            })
            .await
        },
        AuthAction::Status => status(paths),
        AuthAction::Token { provider } => token(paths, provider).await,
        AuthAction::Logout => logout(paths),
    }
}

async fn login(paths: &AuthPaths, options: LoginOptions) -> Result<()> {
    let config = load_config(&paths.config)?;
    let ctx = auth_context(&config, paths)?;
    if ctx.providers.is_empty() {
        println!("No providers configured.");
    } else {
        println!(
            "Opening browser for authentication with {} provider(s)...",
            ctx.providers.len()
        );
    }
    let store = LoginOrchestrator::new(&ctx, &SystemBrowser, options)
        .login()
        .await?;

    println!(
        "Successfully logged in. Tokens saved to {}",
        paths.token_store.display()
    );
    for token in store.tokens() {
        println!("  {} [{}]", token.vcp_base_url, describe_validity(token, Utc::now()));
    }
    Ok(())
}

fn status(paths: &AuthPaths) -> Result<()> {
    if !TokenStore::exists(&paths.token_store) {
        println!("Not logged in. Run `cs login` first.");
        return Ok(());
    }
    let store = TokenStore::load_from(&paths.token_store)?;
    if store.tokens().is_empty() {
        println!("No access tokens stored.");
        return Ok(());
    }
    let now = Utc::now();
    for token in store.tokens() {
        println!("{} [{}]", token.vcp_base_url, describe_validity(token, now));
    }
    Ok(())
}

async fn token(paths: &AuthPaths, provider_id: u32) -> Result<()> {
    let config = load_config(&paths.config)?;
    let provider = config.provider(provider_id)?;
    if !TokenStore::exists(&paths.token_store) {
        bail!("not logged in; run `cs login` first");
    }

    let ctx = auth_context(&config, paths)?;
    let store = TokenStore::load(&ctx, true).await?;
    let token = store.token_for(&provider.base_url).ok_or_else(|| {
        anyhow!("no access token stored for provider {provider_id}; run `cs login` first")
    })?;
    println!("{}", token.access_token.expose_secret());
    Ok(())
}

fn logout(paths: &AuthPaths) -> Result<()> {
    if TokenStore::remove(&paths.token_store)? {
        println!("Logged out. Removed {}", paths.token_store.display());
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

fn auth_context(config: &CsConfig, paths: &AuthPaths) -> Result<AuthContext> {
    let tls = tls_policy(config);
    debug!(?tls, "building HTTP client");
    Ok(AuthContext {
        providers: config.providers.iter().map(provider_identity).collect(),
        http: build_http_client(&tls)?,
        token_store_path: paths.token_store.clone(),
    })
}

fn tls_policy(config: &CsConfig) -> TlsPolicy {
    if config.no_ssl_validation {
        TlsPolicy::Insecure
    } else if !config.trusted_certificates.is_empty() {
        TlsPolicy::TrustedCertificates(config.trusted_certificates.clone())
    } else {
        TlsPolicy::System
    }
}

fn provider_identity(vcp: &VcpConfig) -> ProviderIdentity {
    ProviderIdentity {
        id: vcp.id,
        base_url: vcp.base_url.clone(),
        client_id: vcp.oauth2_client_id.clone(),
        auth_endpoint: vcp.oauth2_auth_endpoint_uri.clone(),
        token_endpoint: vcp.oauth2_token_endpoint_uri.clone(),
        callback_url: vcp.oauth2_callback_url.clone(),
    }
}

fn describe_validity(token: &VcpToken, now: DateTime<Utc>) -> String {
    if token.is_expired_at(now) {
        return "expired".to_string();
    }
    let remaining = token.remaining_validity(now).num_seconds();
    let hours = remaining / 3600;
    let mins = (remaining % 3600) / 60;
    format!("valid ({hours}h {mins}m remaining)")
}
