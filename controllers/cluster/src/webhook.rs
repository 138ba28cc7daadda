//! Admission webhook, health probes and metrics.
//!
//! One server serves the validating webhook for ScyllaCluster objects
//! together with `/healthz`, `/readyz` and `/metrics`. It terminates TLS
//! itself unless the configuration disables it.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use crds::{ScyllaCluster, TransitionError, TransitionGuard, validate};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::response::{StatusCause, StatusDetails};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::WebhookTls;
use crate::error::ControllerError;
use crate::metrics::Metrics;

/// Path of the validating webhook.
pub const VALIDATE_PATH: &str = "/validate-scyllacluster";

#[derive(Clone)]
pub struct WebhookState {
    pub guard: TransitionGuard,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/readyz", get(|| async { StatusCode::OK }))
        .route("/metrics", get(metrics))
        .route(VALIDATE_PATH, post(validate_cluster).layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serves `router` on `addr` until the listener fails.
pub async fn serve(addr: SocketAddr, tls: WebhookTls, state: WebhookState) -> Result<(), ControllerError> {
    match tls {
        WebhookTls::Files { cert, key } => {
            let acceptor = tls_acceptor(&cert, &key)?;
            let listener = TcpListener::bind(addr).await?;
            info!(%addr, cert = %cert.display(), "Webhook server listening over TLS");
            serve_tls(listener, acceptor, router(state)).await
        }
        WebhookTls::Disabled => {
            let listener = TcpListener::bind(addr).await?;
            warn!(%addr, "Webhook server listening over plain HTTP");
            axum::serve(listener, router(state)).await?;
            Ok(())
        }
    }
}

/// Builds the TLS acceptor from a PEM certificate chain and private key.
pub fn tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, ControllerError> {
    let certs = CertificateDer::pem_file_iter(cert)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ControllerError::Tls(format!("{}: {e}", cert.display())))?;
    let key = PrivateKeyDer::from_pem_file(key).map_err(|e| ControllerError::Tls(format!("{}: {e}", key.display())))?;

    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .and_then(|builder| builder.with_no_client_auth().with_single_cert(certs, key))
        .map_err(|e| ControllerError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accepts connections on `listener` and serves each over TLS on its own task.
async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, router: Router) -> Result<(), ControllerError> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Error accepting webhook connection");
                continue;
            }
        };
        let (acceptor, service) = (acceptor.clone(), TowerToHyperService::new(router.clone()));
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let builder = Builder::new(TokioExecutor::new());
            if let Err(e) = builder.serve_connection(TokioIo::new(stream), service).await {
                debug!(%peer, error = %e, "Webhook connection closed with error");
            }
        });
    }
}

async fn metrics(State(state): State<WebhookState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn validate_cluster(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<ScyllaCluster>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<ScyllaCluster> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(admit(&state.guard, &request).into_review())
}

/// Decides on one admission request.
///
/// Creates and updates must carry a valid spec; updates must also carry the
/// stored object and be an allowed transition from it. Deletes and connects pass.
pub fn admit(guard: &TransitionGuard, request: &AdmissionRequest<ScyllaCluster>) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    let cluster = match &request.operation {
        Operation::Delete | Operation::Connect => return response,
        Operation::Create | Operation::Update => match &request.object {
            Some(cluster) => cluster,
            None => return response.deny("no ScyllaCluster object in the request"),
        },
    };

    if let Err(e) = validate(&cluster.spec) {
        debug!(name = %request.name, error = %e, "Rejecting invalid spec");
        return response.deny(e.to_string());
    }
    if request.operation == Operation::Update {
        let Some(old) = &request.old_object else {
            return response.deny("update carries no stored ScyllaCluster to check the transition against");
        };
        if let Err(e) = guard.validate_transition(&old.spec, &cluster.spec) {
            debug!(name = %request.name, field = %e.field_path(), error = %e, "Rejecting spec transition");
            return deny_transition(response, &request.name, &e);
        }
    }
    response
}

/// Denies with the offending field recorded as the status cause.
fn deny_transition(mut response: AdmissionResponse, name: &str, error: &TransitionError) -> AdmissionResponse {
    response.result.details = Some(StatusDetails {
        name: name.to_string(),
        group: "scylla.scylladb.com".to_string(),
        kind: "ScyllaCluster".to_string(),
        uid: String::new(),
        causes: vec![StatusCause {
            reason: "FieldValueForbidden".to_string(),
            message: error.to_string(),
            field: error.field_path(),
        }],
        retry_after_seconds: 0,
    });
    response.deny(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use crds::ScaleDownPolicy;
    use crds::fixtures::single_rack_cluster;
    use rustls::pki_types::ServerName;
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    fn state(scale_down: ScaleDownPolicy) -> WebhookState {
        WebhookState {
            guard: TransitionGuard::new(scale_down),
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    fn review(operation: &str, object: Option<&ScyllaCluster>, old: Option<&ScyllaCluster>) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "scylla.scylladb.com", "version": "v1", "kind": "ScyllaCluster"},
                "resource": {"group": "scylla.scylladb.com", "version": "v1", "resource": "scyllaclusters"},
                "name": "test-cluster",
                "namespace": "test-ns",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": object,
                "oldObject": old,
                "dryRun": false
            }
        })
    }

    async fn post_review(state: WebhookState, body: Value) -> Value {
        let response = router(state)
            .oneshot(
                Request::post(VALIDATE_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_create_is_allowed() {
        let cluster = single_rack_cluster(3);
        let body = post_review(state(ScaleDownPolicy::Reject), review("CREATE", Some(&cluster), None)).await;

        assert_eq!(body["response"]["allowed"], true);
        assert_eq!(body["response"]["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    }

    #[tokio::test]
    async fn test_invalid_create_is_denied_with_reason() {
        let mut cluster = single_rack_cluster(3);
        let rack = cluster.spec.datacenter.racks[0].clone();
        cluster.spec.datacenter.racks.push(rack);

        let body = post_review(state(ScaleDownPolicy::Reject), review("CREATE", Some(&cluster), None)).await;

        assert_eq!(body["response"]["allowed"], false);
        let message = body["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("test-rack"), "{message}");
    }

    #[tokio::test]
    async fn test_immutable_update_is_denied() {
        let old = single_rack_cluster(3);
        let mut new = old.clone();
        new.spec.datacenter.name = "other-dc".to_string();

        let body = post_review(state(ScaleDownPolicy::Reject), review("UPDATE", Some(&new), Some(&old))).await;

        assert_eq!(body["response"]["allowed"], false);
        let message = body["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("spec.datacenter.name"), "{message}");
        assert_eq!(
            body["response"]["status"]["details"]["causes"][0]["field"],
            "spec.datacenter.name"
        );
    }

    #[tokio::test]
    async fn test_update_without_old_object_is_denied() {
        let cluster = single_rack_cluster(3);

        let body = post_review(state(ScaleDownPolicy::Allow), review("UPDATE", Some(&cluster), None)).await;

        assert_eq!(body["response"]["allowed"], false);
        let message = body["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("stored ScyllaCluster"), "{message}");
    }

    #[tokio::test]
    async fn test_scale_down_follows_policy() {
        let old = single_rack_cluster(3);
        let mut new = old.clone();
        new.spec.datacenter.racks[0].members = 2;

        let body = post_review(state(ScaleDownPolicy::Reject), review("UPDATE", Some(&new), Some(&old))).await;
        assert_eq!(body["response"]["allowed"], false);

        let body = post_review(state(ScaleDownPolicy::Allow), review("UPDATE", Some(&new), Some(&old))).await;
        assert_eq!(body["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_delete_is_allowed() {
        let mut cluster = single_rack_cluster(3);
        let rack = cluster.spec.datacenter.racks[0].clone();
        cluster.spec.datacenter.racks.push(rack);

        let body = post_review(state(ScaleDownPolicy::Reject), review("DELETE", None, Some(&cluster))).await;
        assert_eq!(body["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_probes_and_metrics() {
        let state = state(ScaleDownPolicy::Reject);
        state.metrics.reconcile_total.with_label_values(&["success"]).inc();

        for path in ["/healthz", "/readyz"] {
            let response = router(state.clone())
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }

        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("scylla_operator_reconcile_total"));
    }

    fn testdata(file: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(file)
    }

    #[test]
    fn test_missing_certificate_is_a_tls_error() {
        let result = tls_acceptor(&testdata("missing.crt"), &testdata("tls.key"));
        assert!(matches!(result, Err(ControllerError::Tls(ref m)) if m.contains("missing.crt")));
    }

    #[tokio::test]
    async fn test_serves_over_tls() {
        let acceptor = tls_acceptor(&testdata("tls.crt"), &testdata("tls.key")).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_tls(listener, acceptor, router(state(ScaleDownPolicy::Reject))));

        let mut roots = rustls::RootCertStore::empty();
        for cert in CertificateDer::pem_file_iter(testdata("tls.crt")).unwrap() {
            roots.add(cert.unwrap()).unwrap();
        }
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut stream = connector
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap();

        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        while !response.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the response headers");
            response.extend_from_slice(&buf[..n]);
        }
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");

        // Plain HTTP is refused on the TLS port
        let mut plain = TcpStream::connect(addr).await.unwrap();
        plain.write_all(b"GET /healthz HTTP/1.1\r\nhost: localhost\r\n\r\n").await.unwrap();
        let mut reply = Vec::new();
        let _ = plain.read_to_end(&mut reply).await;
        assert!(!String::from_utf8_lossy(&reply).starts_with("HTTP/1.1 200"));

        server.abort();
    }
}
