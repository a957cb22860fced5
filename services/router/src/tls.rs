//! TLS material: configured certificate files or a generated
//! self-signed ed25519 certificate, plus the optional client
//! certificate handling.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use sha2::{Digest, Sha256};

use crate::config::TlsConfig;

/// Build the rustls server config: certificate chain, TLS 1.3, the
/// configured ALPN list, and optional (never required) client
/// certificates.
pub fn build_server_crypto(tls: &TlsConfig) -> Result<rustls::ServerConfig> {
    let (certs, key) = load_certificates(tls)?;
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = Arc::new(AcceptAnyClientCert::new(Arc::clone(&provider)));

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .context("TLS 1.3 unavailable in crypto provider")?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .context("invalid certificate/key pair")?;

    config.alpn_protocols = tls.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    Ok(config)
}

/// Load the configured PEM files, or generate a self-signed ed25519
/// certificate for `localhost` when none are configured.
pub fn load_certificates(
    tls: &TlsConfig,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    if !tls.cert_file.is_empty() || !tls.key_file.is_empty() {
        let cert_pem = std::fs::File::open(&tls.cert_file)
            .with_context(|| format!("open tls.cert_file {:?}", tls.cert_file))?;
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
                .collect::<Result<_, _>>()
                .context("parse tls.cert_file")?;
        if certs.is_empty() {
            bail!("tls.cert_file contains no certificates");
        }

        let key_pem = std::fs::File::open(&tls.key_file)
            .with_context(|| format!("open tls.key_file {:?}", tls.key_file))?;
        let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
            .context("parse tls.key_file")?
            .context("tls.key_file contains no private key")?;

        return Ok((certs, key));
    }

    let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519)
        .context("generate ed25519 key")?;
    let params = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .context("build certificate params")?;
    let cert = params
        .self_signed(&key_pair)
        .context("self-sign certificate")?;

    let cert_der = cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    Ok((vec![cert_der], key_der))
}

/// SHA-256 of a DER certificate as unpadded URL-safe base64, the form
/// exposed to plugins.
pub fn certificate_fingerprint(der: &[u8]) -> String {
    let sum = Sha256::digest(der);
    URL_SAFE_NO_PAD.encode(sum)
}

/// Accepts any client certificate the peer offers without requiring
/// one. The handshake records it so its fingerprint reaches plugins.
#[derive(Debug)]
pub struct AcceptAnyClientCert {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl AcceptAnyClientCert {
    pub fn new(provider: Arc<rustls::crypto::CryptoProvider>) -> Self {
        AcceptAnyClientCert { provider }
    }
}

impl rustls::server::danger::ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<rustls::server::danger::ClientCertVerified, rustls::Error> {
        Ok(rustls::server::danger::ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
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
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
