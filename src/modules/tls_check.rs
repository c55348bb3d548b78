use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use url::Url;

use crate::crawler::CrawledPage;
use crate::finding::{Confidence, Evidence, Finding};
use crate::http::HttpClient;
use crate::modules::ScanModule;
use crate::scoring::cvss::Severity;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn tls_finding(
    vuln_type: &str,
    score: f64,
    vector: &str,
    cwe: &str,
    url: String,
    description: String,
    evidence: Vec<Evidence>,
) -> Finding {
    Finding {
        module_name: "tls_check".to_string(),
        vuln_type: vuln_type.to_string(),
        severity: Severity::from_score(score),
        cvss_score: score,
        cvss_vector: vector.to_string(),
        owasp_category: "A02".to_string(),
        cwe_id: cwe.to_string(),
        affected_url: url,
        affected_parameter: None,
        description,
        remediation: String::new(),
        confidence: Confidence::Confirmed,
        evidence,
    }
}

fn connect_tcp(host: &str, port: u16) -> Option<TcpStream> {
    let addr = format!("{host}:{port}").to_socket_addrs().ok()?.next()?;
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).ok()?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT)).ok()?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT)).ok()?;
    Some(stream)
}

fn check_certificate(host: &str, port: u16) -> Vec<Finding> {
    let mut findings = Vec::new();
    let affected = format!("https://{host}:{port}");

    // Unverified handshake first: we want the certificate itself even when
    // it would fail validation.
    let cert = (|| {
        let mut builder = SslConnector::builder(SslMethod::tls()).ok()?;
        builder.set_verify(SslVerifyMode::NONE);
        let connector = builder.build();
        let stream = connect_tcp(host, port)?;
        let tls = connector.connect(host, stream).ok()?;
        tls.ssl().peer_certificate()
    })();

    let mut expired = false;
    if let Some(cert) = cert {
        let not_after = cert.not_after().to_string();
        if let Ok(now) = openssl::asn1::Asn1Time::days_from_now(0) {
            if let Ok(diff) = now.diff(cert.not_after()) {
                if diff.days < 0 || (diff.days == 0 && diff.secs < 0) {
                    expired = true;
                    let days_ago = -diff.days;
                    let mut f = tls_finding(
                        "Expired TLS Certificate",
                        7.5,
                        "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N",
                        "CWE-298",
                        affected.clone(),
                        format!("The TLS certificate expired {days_ago} day(s) ago on {not_after}."),
                        vec![Evidence::log(
                            "Certificate Expiry",
                            format!("Expired: {not_after} ({days_ago} days ago)"),
                        )],
                    );
                    f.severity = Severity::Critical;
                    f.cvss_score = 9.1;
                    f.cvss_vector = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N".to_string();
                    f.remediation = "Renew the TLS certificate immediately. Use automated \
                                     certificate management (ACME/Let's Encrypt)."
                        .to_string();
                    findings.push(f);
                } else if diff.days < 30 {
                    let mut f = tls_finding(
                        "TLS Certificate Expiring Soon",
                        5.3,
                        "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N",
                        "CWE-298",
                        affected.clone(),
                        format!(
                            "The TLS certificate expires in {} day(s) on {not_after}.",
                            diff.days
                        ),
                        vec![Evidence::log(
                            "Certificate Expiry",
                            format!("Expires: {not_after} ({} days remaining)", diff.days),
                        )],
                    );
                    f.remediation =
                        "Renew the certificate before expiry; consider automated renewal via \
                         ACME."
                            .to_string();
                    findings.push(f);
                }
            }
        }
    }

    // Verified handshake: any failure that is not plain expiry means the
    // chain or the name does not validate.
    if !expired {
        if let Some(stream) = connect_tcp(host, port) {
            if let Ok(connector) = SslConnector::builder(SslMethod::tls()).map(|b| b.build()) {
                if let Err(e) = connector.connect(host, stream) {
                    let mut f = tls_finding(
                        "Invalid TLS Certificate",
                        7.4,
                        "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:H/I:H/A:N",
                        "CWE-295",
                        affected.clone(),
                        format!("TLS certificate validation failed: {e}"),
                        vec![Evidence::log("TLS Error", e.to_string())],
                    );
                    f.remediation = "Install a valid certificate from a trusted CA and make \
                                     sure the CN/SAN matches the domain."
                        .to_string();
                    findings.push(f);
                }
            }
        }
    }

    findings
}

fn check_weak_protocols(host: &str, port: u16) -> Vec<Finding> {
    let mut findings = Vec::new();
    let affected = format!("https://{host}:{port}");

    for (version, label) in [(SslVersion::TLS1, "TLS 1.0"), (SslVersion::TLS1_1, "TLS 1.1")] {
        let accepted = (|| {
            let mut builder = SslConnector::builder(SslMethod::tls()).ok()?;
            builder.set_verify(SslVerifyMode::NONE);
            builder.set_min_proto_version(Some(version)).ok()?;
            builder.set_max_proto_version(Some(version)).ok()?;
            let connector = builder.build();
            let stream = connect_tcp(host, port)?;
            connector.connect(host, stream).ok()
        })()
        .is_some();

        if accepted {
            let mut f = tls_finding(
                &format!("Weak TLS Protocol Supported: {label}"),
                5.9,
                "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:H/I:N/A:N",
                "CWE-326",
                affected.clone(),
                format!(
                    "The server accepts {label}, which has known weaknesses (POODLE, BEAST)."
                ),
                vec![Evidence::log(
                    "Accepted Protocol",
                    format!("Handshake completed with maximum protocol pinned to {label}"),
                )],
            );
            f.remediation = format!("Disable {label}; set the minimum TLS version to 1.2.");
            findings.push(f);
        }
    }

    findings
}

/// Direct TLS inspection of HTTPS targets: certificate expiry and
/// validity, plus handshake probes with the protocol pinned to TLS 1.0 and
/// 1.1. Runs on a blocking thread since the handshakes use synchronous
/// sockets.
pub struct TlsCheck;

#[async_trait]
impl ScanModule for TlsCheck {
    fn name(&self) -> &'static str {
        "tls_check"
    }

    fn description(&self) -> &'static str {
        "Checks TLS configuration for expired certs and weak protocols"
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn active(&self, page: &CrawledPage, _http: &HttpClient) -> anyhow::Result<Vec<Finding>> {
        let parsed = match Url::parse(&page.url) {
            Ok(u) => u,
            Err(_) => return Ok(Vec::new()),
        };
        if parsed.scheme() != "https" {
            // Plain-HTTP exposure is https_check's finding.
            return Ok(Vec::new());
        }
        let host = match parsed.host_str() {
            Some(h) => h.to_string(),
            None => return Ok(Vec::new()),
        };
        let port = parsed.port().unwrap_or(443);

        let findings = tokio::task::spawn_blocking(move || {
            let mut out = check_certificate(&host, port);
            out.extend(check_weak_protocols(&host, port));
            out
        })
        .await?;

        Ok(findings)
    }
}
