//! TLS policy for the HTTP client.
//!
//! Two policies exist: certificates verified against the bundled webpki roots
//! (the default), and an explicit insecure mode that accepts any server
//! certificate for stub servers with self-signed certificates.

use crate::error::HttpError;
use hyper_rustls::{ConfigBuilderExt as _, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

/// Get the crypto provider for TLS connections.
///
/// Uses the process-wide default provider when one is installed, otherwise
/// creates an aws-lc-rs provider without installing it globally.
#[must_use]
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Certificate verifier that trusts every server certificate.
///
/// Handshake signatures are still checked, so the peer must hold the private
/// key of whatever certificate it presents; only the chain of trust and the
/// server name are ignored.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    #[must_use]
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build a rustls `ClientConfig` that accepts any server certificate.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the crypto provider supports none of the safe
/// default protocol versions.
pub fn insecure_client_config() -> Result<rustls::ClientConfig, HttpError> {
    let provider = get_crypto_provider();
    let verifier = Arc::new(AcceptAnyServerCert::new(Arc::clone(&provider)));

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(config)
}

/// Build a rustls `ClientConfig` verifying against the bundled webpki roots.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the crypto provider supports none of the safe
/// default protocol versions.
pub fn verified_client_config() -> Result<rustls::ClientConfig, HttpError> {
    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?
        .with_webpki_roots()
        .with_no_client_auth();

    Ok(config)
}

/// Wrap a TCP connector with TLS according to the configured policy.
///
/// Both `http` and `https` schemes are served; which one is used is decided
/// by the base URL. HTTP/2 is negotiated via ALPN when the server offers it.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the rustls configuration cannot be built.
pub fn build_https_connector(
    http: HttpConnector,
    accept_invalid_certs: bool,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let tls_config = if accept_invalid_certs {
        insecure_client_config()?
    } else {
        verified_client_config()?
    };

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(http))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_accept_any_server_cert_trusts_garbage() {
        let verifier = AcceptAnyServerCert::new(get_crypto_provider());
        let cert = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x01]);
        let name = ServerName::try_from("stub.invalid").unwrap();

        let result = verifier.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());
        assert!(result.is_ok());
    }

    #[test]
    fn test_accept_any_server_cert_advertises_schemes() {
        let verifier = AcceptAnyServerCert::new(get_crypto_provider());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn test_client_configs_build() {
        assert!(insecure_client_config().is_ok());
        assert!(verified_client_config().is_ok());
    }

    #[test]
    fn test_build_https_connector_both_policies() {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        assert!(build_https_connector(http.clone(), true).is_ok());
        assert!(build_https_connector(http, false).is_ok());
    }
}
