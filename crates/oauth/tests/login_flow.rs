//! End-to-end login against mocked token endpoints, with a fake browser that
//! follows the authorization redirect.

use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    cs_oauth::{
        AuthContext, BrowserLaunchError, BrowserLauncher, CallbackError, LoginError,
        LoginOptions, LoginOrchestrator, PortCandidateRange, ProviderIdentity, TokenStore,
    },
    mockito::Matcher,
    secrecy::ExposeSecret,
    url::Url,
};

/// Redirects to the callback with a per-launch code, except for launches
/// listed in `without_code`.
#[derive(Default)]
struct FakeBrowser {
    launches: AtomicUsize,
    without_code: Vec<usize>,
    authorization_requests: Mutex<Vec<Url>>,
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn browse(&self, url: &Url) -> Result<(), BrowserLaunchError> {
        let launch = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        self.authorization_requests.lock().unwrap().push(url.clone());

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let mut redirect = Url::parse(&params["redirect_uri"]).unwrap();
        redirect
            .query_pairs_mut()
            .append_pair("state", &params["state"]);
        if !self.without_code.contains(&launch) {
            redirect
                .query_pairs_mut()
                .append_pair("code", &format!("code-{launch}"));
        }
        tokio::spawn(async move {
            let _ = reqwest::get(redirect).await;
        });
        Ok(())
    }
}

fn free_port_range(len: u16) -> PortCandidateRange {
    for _ in 0..100 {
        let base = 20_000 + rand::random::<u16>() % 20_000;
        let holders: Vec<TcpListener> = (base..base + len)
            .map_while(|port| TcpListener::bind(("127.0.0.1", port)).ok())
            .collect();
        if holders.len() == usize::from(len) {
            return PortCandidateRange::new(base, base + len - 1).unwrap();
        }
    }
    panic!("no run of {len} free ports found");
}

fn provider(id: u32, server: &mockito::Server) -> ProviderIdentity {
    ProviderIdentity {
        id,
        base_url: Url::parse(&format!("https://vcp-{id}.example.com")).unwrap(),
        client_id: format!("client-{id}"),
        auth_endpoint: Url::parse(&format!("https://auth.vcp-{id}.example.com/oauth2/auth"))
            .unwrap(),
        token_endpoint: Url::parse(&format!("{}/vcp-{id}/oauth2/token", server.url())).unwrap(),
        callback_url: Url::parse("http://127.0.0.1/callback").unwrap(),
    }
}

async fn mock_token_endpoint(server: &mut mockito::Server, id: u32, code: &str) -> mockito::Mock {
    server
        .mock("POST", format!("/vcp-{id}/oauth2/token").as_str())
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), code.into()),
            Matcher::UrlEncoded("client_id".into(), format!("client-{id}")),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"access-{id}","id_token":"id-{id}","refresh_token":"refresh-{id}","expires_in":7200,"token_type":"Bearer"}}"#
        ))
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn login_to_all_providers_persists_store() {
    let mut server = mockito::Server::new_async().await;
    let first = mock_token_endpoint(&mut server, 1, "code-1").await;
    let second = mock_token_endpoint(&mut server, 2, "code-2").await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = AuthContext {
        providers: vec![provider(1, &server), provider(2, &server)],
        http: reqwest::Client::new(),
        token_store_path: dir.path().join(".cs").join("access-tokens.json"),
    };
    let browser = FakeBrowser::default();
    let options = LoginOptions {
        callback_ports: free_port_range(4),
        callback_timeout: Duration::from_secs(10),
    };

    let store = LoginOrchestrator::new(&ctx, &browser, options)
        .login()
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(browser.launches.load(Ordering::SeqCst), 2);

    let requests = browser.authorization_requests.lock().unwrap().clone();
    assert_eq!(requests[0].host_str(), Some("auth.vcp-1.example.com"));
    assert_eq!(requests[1].host_str(), Some("auth.vcp-2.example.com"));

    let tokens = store.tokens();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].vcp_base_url, "https://vcp-1.example.com/");
    assert_eq!(tokens[0].access_token.expose_secret(), "access-1");
    assert_eq!(tokens[1].vcp_base_url, "https://vcp-2.example.com/");
    assert_eq!(tokens[1].refresh_token.expose_secret(), "refresh-2");
    assert!(tokens.iter().all(|t| !t.is_expired()));

    let persisted = TokenStore::load_from(&ctx.token_store_path).unwrap();
    assert_eq!(persisted, store);
    let loaded = TokenStore::load(&ctx, true).await.unwrap();
    assert_eq!(loaded, store);
}

#[tokio::test]
async fn failing_provider_aborts_login_without_persisting() {
    let mut server = mockito::Server::new_async().await;
    let first = mock_token_endpoint(&mut server, 1, "code-1").await;
    let third = server
        .mock("POST", "/vcp-3/oauth2/token")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = AuthContext {
        providers: vec![provider(1, &server), provider(2, &server), provider(3, &server)],
        http: reqwest::Client::new(),
        token_store_path: dir.path().join("access-tokens.json"),
    };
    let browser = FakeBrowser {
        without_code: vec![2],
        ..FakeBrowser::default()
    };
    let options = LoginOptions {
        callback_ports: free_port_range(4),
        callback_timeout: Duration::from_secs(10),
    };

    let err = LoginOrchestrator::new(&ctx, &browser, options)
        .login()
        .await
        .unwrap_err();

    assert!(matches!(err, LoginError::Callback {
        provider: 2,
        source: CallbackError::MissingAuthenticationCode
    }));
    first.assert_async().await;
    third.assert_async().await;
    assert_eq!(browser.launches.load(Ordering::SeqCst), 2);
    assert!(!TokenStore::exists(&ctx.token_store_path));
}
