//! Minimal GET client for the cluster metrics API and the kubelet.
//!
//! One connection per request over hyper's http1 client, optionally wrapped
//! in rustls. The bearer token and CA bundle are re-read on every request so
//! rotated service-account credentials are picked up without a restart, and
//! a missing file surfaces as a request error rather than a startup failure.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tracing::debug;

use burnrate_core::{SourceError, SourceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Http,
    Https,
}

/// How the server certificate is verified on `https` endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trust {
    /// PEM bundle on disk, e.g. the service-account `ca.crt`.
    CaFile(PathBuf),
    /// Mozilla's root set.
    WebPkiRoots,
    /// Accept any certificate. Only reachable through explicit config.
    InsecureSkipVerify,
}

impl Trust {
    fn client_config(&self) -> SourceResult<Arc<rustls::ClientConfig>> {
        let builder = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| SourceError::Tls(format!("protocol versions: {e}")))?;

        let config = match self {
            Trust::CaFile(path) => {
                let roots = load_ca_bundle(path)?;
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            Trust::WebPkiRoots => {
                let mut roots = rustls::RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            Trust::InsecureSkipVerify => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
                .with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}

fn load_ca_bundle(path: &Path) -> SourceResult<rustls::RootCertStore> {
    let credentials_err = |reason: String| SourceError::Credentials {
        path: path.display().to_string(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| credentials_err(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| credentials_err(e.to_string()))?;
    if certs.is_empty() {
        return Err(credentials_err("no certificates in bundle".to_string()));
    }

    let mut roots = rustls::RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| credentials_err(e.to_string()))?;
    }
    Ok(roots)
}

/// A base URL plus the credentials to present to it.
#[derive(Debug, Clone)]
pub struct ApiClient {
    scheme: Scheme,
    host: String,
    port: u16,
    base_path: String,
    trust: Trust,
    token_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ApiClient {
    /// Parse `base_url` (`http://` or `https://`). Any path component is
    /// prefixed to every request path.
    pub fn new(base_url: &str, trust: Trust) -> SourceResult<Self> {
        let uri: http::Uri = base_url
            .parse()
            .map_err(|e| SourceError::Request(format!("invalid url {base_url:?}: {e}")))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            other => {
                return Err(SourceError::Request(format!(
                    "unsupported scheme {other:?} in {base_url:?}"
                )));
            }
        };

        let host = uri
            .host()
            .ok_or_else(|| SourceError::Request(format!("no host in {base_url:?}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = uri.port_u16().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        Ok(Self {
            scheme,
            host,
            port,
            base_path: uri.path().trim_end_matches('/').to_string(),
            trust,
            token_path: None,
            timeout: None,
        })
    }

    /// Present the token in this file as `Authorization: Bearer`.
    pub fn with_token_file(mut self, path: Option<PathBuf>) -> Self {
        self.token_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// GET `path` (relative to the base URL) and return the body of a 2xx
    /// response.
    pub async fn get(&self, path: &str) -> SourceResult<Bytes> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.get_once(path))
                .await
                .map_err(|_| SourceError::Timeout(timeout.as_secs()))?,
            None => self.get_once(path).await,
        }
    }

    async fn get_once(&self, path: &str) -> SourceResult<Bytes> {
        let target = self.request_target(path);
        let request = self.build_request(&target).await?;

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| SourceError::Connect(format!("{}:{}: {e}", self.host, self.port)))?;

        match self.scheme {
            Scheme::Http => send(TokioIo::new(stream), request, &target).await,
            Scheme::Https => {
                let config = self.trust.client_config()?;
                let server_name = ServerName::try_from(self.host.as_str())
                    .map_err(|e| {
                        SourceError::Tls(format!("invalid server name {:?}: {e}", self.host))
                    })?
                    .to_owned();
                let tls = tokio_rustls::TlsConnector::from(config)
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| SourceError::Tls(format!("handshake with {}: {e}", self.host)))?;
                send(TokioIo::new(tls), request, &target).await
            }
        }
    }

    fn request_target(&self, path: &str) -> String {
        let target = format!("{}{}", self.base_path, path);
        if target.is_empty() { "/".to_string() } else { target }
    }

    async fn build_request(&self, target: &str) -> SourceResult<http::Request<Empty<Bytes>>> {
        let authority = if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        };

        let mut builder = http::Request::builder()
            .method(http::Method::GET)
            .uri(target)
            .header(http::header::HOST, authority)
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::USER_AGENT, "burnrate/0.1");

        if let Some(path) = &self.token_path {
            let token = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SourceError::Credentials {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            builder = builder.header(
                http::header::AUTHORIZATION,
                format!("Bearer {}", token.trim()),
            );
        }

        builder
            .body(Empty::<Bytes>::new())
            .map_err(|e| SourceError::Request(e.to_string()))
    }
}

async fn send<T>(io: T, request: http::Request<Empty<Bytes>>, target: &str) -> SourceResult<Bytes>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| SourceError::Connect(format!("http handshake: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "upstream connection closed with error");
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| SourceError::Request(format!("GET {target}: {e}")))?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| SourceError::Request(format!("reading body of {target}: {e}")))?
        .to_bytes();

    if !status.is_success() {
        debug!(%status, %target, "upstream returned non-2xx");
        return Err(SourceError::Status {
            status: status.as_u16(),
            path: target.to_string(),
        });
    }

    Ok(body)
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
