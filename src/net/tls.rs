//! Client TLS context construction.
//!
//! Strict mode trusts the bundled web PKI roots (or a caller-supplied PEM
//! bundle). Insecure mode skips certificate verification entirely. Both
//! modes only negotiate TLS 1.2 and 1.3, and rustls never negotiates TLS
//! compression.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

/// Errors building a client TLS context.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("either disable certificate validation or supply a trust context, not both")]
    ConflictingTrust,
    #[error("failed to read trust anchors from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Where trust comes from when building a context.
#[derive(Debug, Clone)]
pub enum Trust {
    /// Built-in web PKI roots.
    Default,
    /// Roots loaded from a PEM bundle.
    CaFile(PathBuf),
    /// No certificate verification at all.
    Insecure,
}

impl Trust {
    /// Resolve the trust mode from the `verify_ssl` / `ca_file` pair.
    pub fn from_settings(verify_ssl: bool, ca_file: Option<&Path>) -> Result<Self, TlsError> {
        match (verify_ssl, ca_file) {
            (false, Some(_)) => Err(TlsError::ConflictingTrust),
            (false, None) => Ok(Trust::Insecure),
            (true, Some(path)) => Ok(Trust::CaFile(path.to_path_buf())),
            (true, None) => Ok(Trust::Default),
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a client config for the given trust mode.
pub fn client_config(trust: &Trust) -> Result<Arc<ClientConfig>, TlsError> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?;

    let config = match trust {
        Trust::Default => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        Trust::CaFile(path) => builder
            .with_root_certificates(load_roots(path)?)
            .with_no_client_auth(),
        Trust::Insecure => {
            tracing::warn!("TLS certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
                .with_no_client_auth()
        }
    };

    Ok(Arc::new(config))
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let io_err = |source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(io_err)?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    if ignored > 0 {
        tracing::warn!(path = %path.display(), ignored, "Skipped unparsable trust anchors");
    }
    Ok(roots)
}

/// Accepts any server certificate; handshake signatures are still checked.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
