//! Live TLS endpoint probing.
//!
//! The probe opens a TLS connection with certificate verification disabled
//! (the point is to read the certificate, not to trust it) and extracts
//! leaf metadata. Connection, handshake, and read all run under one
//! caller-supplied timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

use atlas_core::{Node, NodeType};
use atlas_store::AssetStore;

use crate::error::{CertError, ProbeError};

/// Leaf certificate metadata extracted from a live endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CertInfo {
    pub host: String,
    pub port: u16,
    pub subject_cn: String,
    pub issuer_cn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
    pub serial: String,
}

/// Probe `host[:port]` (port defaults to 443) and return the leaf
/// certificate's metadata.
pub async fn probe(endpoint: &str, timeout: Duration) -> Result<CertInfo, ProbeError> {
    let (host, port) = split_endpoint(endpoint);

    tokio::time::timeout(timeout, probe_inner(&host, port))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
}

/// Other crates in this workspace graph (reqwest and neo4rs) pull in both of
/// rustls's `aws-lc-rs` and `ring` crypto backends, which leaves rustls
/// unable to auto-select a process-wide default. Install one explicitly,
/// once, before building any `ClientConfig`.
fn ensure_crypto_provider() {
    static INSTALLED: std::sync::Once = std::sync::Once::new();
    INSTALLED.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

async fn probe_inner(host: &str, port: u16) -> Result<CertInfo, ProbeError> {
    ensure_crypto_provider();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ProbeError::InvalidEndpoint(format!("{host}:{port}")))?;

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = TcpStream::connect((host, port)).await?;
    let tls = connector.connect(server_name, tcp).await?;

    let (_, connection) = tls.get_ref();
    let chain = connection
        .peer_certificates()
        .filter(|certs| !certs.is_empty())
        .ok_or(ProbeError::NoPeerCertificates)?;

    extract_leaf(host, port, &chain[0])
}

fn extract_leaf(host: &str, port: u16, der: &CertificateDer<'_>) -> Result<CertInfo, ProbeError> {
    let (_, cert) =
        X509Certificate::from_der(der.as_ref()).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let subject_cn = common_name(cert.subject());
    let issuer_cn = common_name(cert.issuer());

    let not_before = DateTime::<Utc>::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .unwrap_or_default();
    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .unwrap_or_default();

    let dns_names = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CertInfo {
        host: host.to_string(),
        port,
        subject_cn,
        issuer_cn,
        not_before,
        not_after,
        dns_names,
        serial: cert.raw_serial_as_string(),
    })
}

fn common_name(name: &x509_parser::x509::X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Probe an endpoint and upsert the result as a certificate node with the
/// stable id `"probe:certificate:<host>"`.
pub async fn probe_and_store(
    store: &AssetStore,
    endpoint: &str,
    timeout: Duration,
) -> Result<Node, CertError> {
    let info = probe(endpoint, timeout).await?;

    let name = if info.subject_cn.is_empty() {
        info.host.clone()
    } else {
        info.subject_cn.clone()
    };

    let mut node = Node::new("probe", NodeType::Certificate, &info.host);
    node.name = name;
    node.source_file = endpoint.to_string();
    node.provider = info.issuer_cn.clone();
    node.expires_at = Some(info.not_after);
    node.metadata
        .insert("host".to_string(), info.host.clone());
    node.metadata
        .insert("port".to_string(), info.port.to_string());
    node.metadata
        .insert("serial".to_string(), info.serial.clone());
    node.metadata
        .insert("dns_names".to_string(), info.dns_names.join(","));
    node.metadata.insert(
        "not_before".to_string(),
        info.not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    store.upsert_node(&node).await?;
    tracing::debug!(endpoint = %endpoint, expires_at = %info.not_after, "Probed certificate stored");
    Ok(node)
}

fn split_endpoint(endpoint: &str) -> (String, u16) {
    match endpoint.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (endpoint.to_string(), 443),
        },
        None => (endpoint.to_string(), 443),
    }
}

/// Verifier that accepts every chain: this is a probe, not a client.
#[derive(Debug)]
struct AcceptAnyCert;

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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::generate_simple_self_signed;
    use rustls_pki_types::PrivatePkcs8KeyDer;
    use tokio::net::TcpListener;
    use tokio_rustls::rustls::ServerConfig;
    use tokio_rustls::TlsAcceptor;

    #[test]
    fn endpoint_splitting_defaults_to_443() {
        assert_eq!(split_endpoint("example.com"), ("example.com".to_string(), 443));
        assert_eq!(
            split_endpoint("example.com:8443"),
            ("example.com".to_string(), 8443)
        );
    }

    /// Serve one TLS handshake with a freshly generated self-signed cert,
    /// returning the bound address.
    async fn spawn_tls_server(san: &str) -> std::net::SocketAddr {
        ensure_crypto_provider();

        let certified = generate_simple_self_signed(vec![san.to_string()]).unwrap();
        let cert_der = certified.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                // Hold the session open briefly so the client can read
                // the negotiated chain.
                if let Ok(tls) = acceptor.accept(stream).await {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    drop(tls);
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn probe_extracts_leaf_metadata() {
        let addr = spawn_tls_server("localhost").await;
        let endpoint = format!("127.0.0.1:{}", addr.port());

        let info = probe(&endpoint, Duration::from_secs(5)).await.unwrap();
        assert_eq!(info.port, addr.port());
        assert!(info.dns_names.contains(&"localhost".to_string()));
        assert!(info.not_after > Utc::now());
        assert!(!info.serial.is_empty());
    }

    #[tokio::test]
    async fn probe_times_out_on_silent_listener() {
        // A listener that accepts TCP but never speaks TLS.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let endpoint = format!("127.0.0.1:{}", addr.port());
        let err = probe(&endpoint, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
    }

    #[tokio::test]
    async fn probe_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = format!("127.0.0.1:{}", addr.port());
        let err = probe(&endpoint, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Connect(_)));
    }

    #[tokio::test]
    async fn probe_and_store_upserts_certificate_node() {
        let addr = spawn_tls_server("api.internal").await;
        let endpoint = format!("127.0.0.1:{}", addr.port());

        let store = AssetStore::open_in_memory().await.unwrap();
        let node = probe_and_store(&store, &endpoint, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(node.id, "probe:certificate:127.0.0.1");
        assert_eq!(node.node_type, NodeType::Certificate);
        assert!(node.expires_at.is_some());
        assert_eq!(
            node.metadata.get("port").map(String::as_str),
            Some(endpoint.rsplit(':').next().unwrap())
        );

        // Certificate validity has whole-second precision, so the value
        // survives the storage round trip exactly.
        let stored = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, node.expires_at);
    }
}
