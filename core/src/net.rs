/*
 * net.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client transport.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! TLS setup: trust store and rustls client configuration.

use std::sync::Arc;

use tokio_rustls::rustls::client::ClientConfig;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::RootCertStore;

use crate::transport::error::ConfigError;

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback,
/// plus any DER-encoded anchors supplied by the caller.
pub fn build_root_store(extra_roots: &[Vec<u8>]) -> Result<RootCertStore, ConfigError> {
    let mut root_store = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = root_store.add_parsable_certificates(certs);
            tracing::debug!(added, ignored, "loaded native root certificates");
        }
        Err(e) => tracing::warn!(error = %e, "could not load native root certificates"),
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    for der in extra_roots {
        root_store
            .add(CertificateDer::from(der.clone()))
            .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;
    }
    Ok(root_store)
}

/// TLS client config offering `alpn` (most preferred first). No client auth.
pub fn tls_client_config(
    extra_roots: &[Vec<u8>],
    alpn: Vec<Vec<u8>>,
) -> Result<Arc<ClientConfig>, ConfigError> {
    let mut config = ClientConfig::builder()
        .with_root_certificates(build_root_store(extra_roots)?)
        .with_no_client_auth();
    config.alpn_protocols = alpn;
    Ok(Arc::new(config))
}
