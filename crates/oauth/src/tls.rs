use std::{fs, path::Path, time::Duration};

use tracing::{debug, warn};

use crate::{error::TlsError, types::TlsPolicy};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client used for all token endpoint traffic.
///
/// Trusted certificates are added on top of the platform's root store.
pub fn build_http_client(policy: &TlsPolicy) -> Result<reqwest::Client, TlsError> {
    let mut builder = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("cs/", env!("CARGO_PKG_VERSION")));

    match policy {
        TlsPolicy::System => {},
        TlsPolicy::Insecure => {
            warn!("TLS certificate and hostname verification is disabled");
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        },
        TlsPolicy::TrustedCertificates(paths) => {
            for path in paths {
                for certificate in load_pem_certificates(path)? {
                    builder = builder.add_root_certificate(certificate);
                }
            }
        },
    }

    builder.build().map_err(TlsError::Client)
}

fn load_pem_certificates(path: &Path) -> Result<Vec<reqwest::Certificate>, TlsError> {
    let pem = fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = pem.as_slice();
    let mut certificates = Vec::new();
    for der in rustls_pemfile::certs(&mut reader) {
        let der = der.map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let certificate =
            reqwest::Certificate::from_der(der.as_ref()).map_err(|source| TlsError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        certificates.push(certificate);
    }

    if certificates.is_empty() {
        return Err(TlsError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), count = certificates.len(), "loaded trusted certificates");
    Ok(certificates)
}
