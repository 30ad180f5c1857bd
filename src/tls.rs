//! TLS trust configuration.
//!
//! The teacher's old `conn.rs` builds a bare `rustls::ClientConfig` with the
//! webpki-roots trust anchors inline at dial time; the modern teacher moves
//! this into `tls/rustls.rs` behind a pluggable `tls::TlsConfig`. This module
//! follows the modern shape: a cheaply-cloneable, `Arc`-backed config built
//! once on the [`crate::Agent`] and shared read-only across requests (spec
//! §5: "TLS trust material is shared read-only ... per-request `verify =
//! false` constructs an ephemeral unverified configuration without mutating
//! the shared one").

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

/// Shared, read-only TLS trust configuration.
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) client_config: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    /// Trust the platform/Mozilla root store (via `webpki-roots`) and verify
    /// server identity normally. This is the session default.
    pub fn platform_verified() -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .expect("ring provider supports TLS 1.2/1.3")
        .with_root_certificates(roots)
        .with_no_client_auth();

        TlsConfig {
            client_config: Arc::new(config),
        }
    }

    /// An ephemeral configuration that accepts any server certificate,
    /// matching a per-request `verify = false` override (spec §6, §4.5).
    /// Never mutates the session's shared configuration.
    pub fn insecure() -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .expect("ring provider supports TLS 1.2/1.3")
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
            .with_no_client_auth();
        TlsConfig {
            client_config: Arc::new(config),
        }
    }
}

/// Accepts any certificate chain and signature. Used only for the explicit
/// per-request opt-out of verification (spec §4.5: "verify_tls").
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
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
        .map(|_| HandshakeSignatureValid::assertion())
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
        .map(|_| HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
