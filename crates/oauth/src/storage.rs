use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read, Write},
    path::Path,
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    error::{StoreIoError, TokenStoreError},
    exchange::refresh_tokens,
    types::{AuthContext, ProviderIdentity, VcpToken},
};

/// Tokens with less remaining validity than this are refreshed.
const REFRESH_THRESHOLD_SECS: i64 = 3600;

/// Persisted set of provider tokens, at most one per provider base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredTokens")]
pub struct TokenStore {
    tokens: Vec<VcpToken>,
}

/// On-disk shape; every read goes through [`TokenStore::new`].
#[derive(Deserialize)]
struct StoredTokens {
    tokens: Vec<VcpToken>,
}

impl From<StoredTokens> for TokenStore {
    fn from(stored: StoredTokens) -> Self {
        Self::new(stored.tokens)
    }
}

impl TokenStore {
    /// A later token replaces an earlier one for the same base URL. Base
    /// URLs are compared in their parsed form, so `https://a.com` and
    /// `https://a.com/` name the same provider.
    pub fn new(tokens: Vec<VcpToken>) -> Self {
        let mut unique: Vec<VcpToken> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let key = base_url_key(&token.vcp_base_url);
            match unique
                .iter_mut()
                .find(|t| base_url_key(&t.vcp_base_url) == key)
            {
                Some(existing) => *existing = token,
                None => unique.push(token),
            }
        }
        Self { tokens: unique }
    }

    pub fn tokens(&self) -> &[VcpToken] {
        &self.tokens
    }

    pub fn token_for(&self, base_url: &Url) -> Option<&VcpToken> {
        self.tokens
            .iter()
            .find(|t| base_url_key(&t.vcp_base_url) == base_url.as_str())
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    pub fn read_from(reader: impl Read) -> Result<Self, TokenStoreError> {
        serde_json::from_reader(reader)
            .map_err(|e| TokenStoreError::ReadingTokenStoreFailed(StoreIoError::Json(e)))
    }

    pub fn write_to(&self, writer: impl Write) -> Result<(), TokenStoreError> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| TokenStoreError::PersistingTokenStoreFailed(StoreIoError::Json(e)))
    }

    /// Reads the store at `path` without touching the network.
    pub fn load_from(path: &Path) -> Result<Self, TokenStoreError> {
        let file = fs::File::open(path).map_err(|e| {
            debug!(path = %path.display(), error = %e, "cannot open token store");
            TokenStoreError::ReadingTokenStoreFailed(e.into())
        })?;
        Self::read_from(io::BufReader::new(file))
    }

    /// Reads the store from the context's location, optionally refreshing
    /// tokens close to expiry and persisting the result.
    pub async fn load(ctx: &AuthContext, refresh: bool) -> Result<Self, TokenStoreError> {
        let store = Self::load_from(&ctx.token_store_path)?;
        if !refresh {
            return Ok(store);
        }
        let refreshed = store.refresh(ctx).await?;
        refreshed.persist(&ctx.token_store_path)?;
        Ok(refreshed)
    }

    /// Writes the store with owner-only permissions, creating the parent
    /// directory if needed.
    pub fn persist(&self, path: &Path) -> Result<(), TokenStoreError> {
        let persisting = |e: io::Error| TokenStoreError::PersistingTokenStoreFailed(e.into());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persisting)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
            }
        }

        let mut options = fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = io::BufWriter::new(options.open(path).map_err(persisting)?);
        self.write_to(&mut file)?;
        file.flush().map_err(persisting)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }

        debug!(path = %path.display(), tokens = self.tokens.len(), "token store persisted");
        Ok(())
    }

    /// Deletes the store. Returns `false` when there was nothing to delete.
    pub fn remove(path: &Path) -> Result<bool, TokenStoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TokenStoreError::PersistingTokenStoreFailed(e.into())),
        }
    }

    /// Returns a copy of the store with every token that expires within the
    /// next hour refreshed.
    ///
    /// Every token must belong to a configured provider, whether or not it
    /// is due for a refresh. All tokens are attempted; failures are collected
    /// per provider and reported together.
    pub async fn refresh(&self, ctx: &AuthContext) -> Result<Self, TokenStoreError> {
        let now = Utc::now();
        let mut tokens = Vec::with_capacity(self.tokens.len());
        let mut failures = BTreeMap::new();

        for token in &self.tokens {
            let key = base_url_key(&token.vcp_base_url);
            let Some(provider) = ctx.provider_for(&token.vcp_base_url) else {
                warn!(base_url = %token.vcp_base_url, "no provider configured for stored token");
                failures.insert(
                    key,
                    TokenStoreError::VcpConfigurationUnavailable(token.vcp_base_url.clone()),
                );
                continue;
            };
            if !needs_refresh(token, now) {
                tokens.push(token.clone());
                continue;
            }
            match refresh_token(ctx, provider, token).await {
                Ok(refreshed) => {
                    info!(base_url = %token.vcp_base_url, "access token refreshed");
                    tokens.push(refreshed);
                },
                Err(e) => {
                    warn!(base_url = %token.vcp_base_url, error = %e, "token refresh failed");
                    failures.insert(key, e);
                },
            }
        }

        if failures.is_empty() {
            Ok(Self { tokens })
        } else {
            Err(TokenStoreError::ByToken(failures))
        }
    }
}

fn needs_refresh(token: &VcpToken, now: DateTime<Utc>) -> bool {
    token.remaining_validity(now).num_seconds() < REFRESH_THRESHOLD_SECS
}

/// Parsed form of a stored base URL; unparsable values are kept verbatim.
fn base_url_key(raw: &str) -> String {
    Url::parse(raw).map_or_else(|_| raw.to_string(), String::from)
}

async fn refresh_token(
    ctx: &AuthContext,
    provider: &ProviderIdentity,
    token: &VcpToken,
) -> Result<VcpToken, TokenStoreError> {
    let issued_at = Utc::now();
    let issued = refresh_tokens(&ctx.http, provider, token)
        .await
        .map_err(|source| TokenStoreError::RefreshingTokenFailed {
            base_url: token.vcp_base_url.clone(),
            source,
        })?;

    let mut refreshed = VcpToken::issued(&provider.base_url, issued_at, issued);
    refreshed.vcp_base_url.clone_from(&token.vcp_base_url);
    Ok(refreshed)
}
