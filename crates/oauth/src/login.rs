use tracing::info;

use crate::{
    browser::BrowserLauncher,
    error::LoginError,
    flow::ProviderLoginSession,
    storage::TokenStore,
    types::{AuthContext, LoginOptions},
};

/// Logs in to every configured provider, one after another, and persists
/// the resulting token store.
///
/// The first failing provider aborts the run; nothing is persisted then.
pub struct LoginOrchestrator<'a> {
    ctx: &'a AuthContext,
    browser: &'a dyn BrowserLauncher,
    options: LoginOptions,
}

impl<'a> LoginOrchestrator<'a> {
    pub fn new(ctx: &'a AuthContext, browser: &'a dyn BrowserLauncher, options: LoginOptions) -> Self {
        Self {
            ctx,
            browser,
            options,
        }
    }

    pub async fn login(&self) -> Result<TokenStore, LoginError> {
        let mut tokens = Vec::with_capacity(self.ctx.providers.len());
        for provider in &self.ctx.providers {
            info!(provider = provider.id, base_url = %provider.base_url, "logging in");
            let token = ProviderLoginSession::new(provider, &self.ctx.http, self.browser, self.options)
                .run()
                .await?;
            tokens.push(token);
        }

        let store = TokenStore::new(tokens);
        store.persist(&self.ctx.token_store_path)?;
        info!(
            providers = store.tokens().len(),
            path = %self.ctx.token_store_path.display(),
            "login complete"
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::error::BrowserLaunchError, async_trait::async_trait, url::Url};

    struct PanickingBrowser;

    #[async_trait]
    impl BrowserLauncher for PanickingBrowser {
        async fn browse(&self, _url: &Url) -> Result<(), BrowserLaunchError> {
            panic!("no provider is configured, browser must not open");
        }
    }

    #[tokio::test]
    async fn test_login_without_providers_persists_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AuthContext {
            providers: Vec::new(),
            http: reqwest::Client::new(),
            token_store_path: dir.path().join("access-tokens.json"),
        };

        let store = LoginOrchestrator::new(&ctx, &PanickingBrowser, LoginOptions::default())
            .login()
            .await
            .unwrap();

        assert!(store.tokens().is_empty());
        assert_eq!(TokenStore::load_from(&ctx.token_store_path).unwrap(), store);
    }
}
