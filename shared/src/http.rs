use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accept loop shared by the public and admin listeners. Each connection is
/// handed to hyper with auto-detected h1/h2 and served on its own task.
pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<
            hyper::Request<Incoming>,
            Response = Response<BoxBody<Bytes, Infallible>>,
            Error = E,
        > + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = PeerService {
            inner: service_arc.clone(),
            peer_addr,
        };

        tokio::spawn(async move {
            let _ = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await;
        });
    }
}

/// Wraps the user service so every request carries the peer address in its
/// extensions. The redirector needs it as the last-resort client ip.
struct PeerService<S> {
    inner: Arc<S>,
    peer_addr: SocketAddr,
}

impl<S, E> Service<hyper::Request<Incoming>> for PeerService<S>
where
    S: Service<hyper::Request<Incoming>, Response = Response<BoxBody<Bytes, Infallible>>, Error = E>,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future = S::Future;

    fn call(&self, mut req: hyper::Request<Incoming>) -> Self::Future {
        req.extensions_mut().insert(PeerAddr(self.peer_addr));
        self.inner.call(req)
    }
}

/// Peer socket address, inserted into request extensions by the accept loop.
#[derive(Clone, Copy, Debug)]
pub struct PeerAddr(pub SocketAddr);

/// Builds a minimal response carrying the status code's canonical reason.
pub fn make_error_response(status: StatusCode) -> Response<BoxBody<Bytes, Infallible>> {
    let reason = status.canonical_reason().unwrap_or("error");
    let mut response = Response::new(
        Full::new(Bytes::from(format!("{reason}\n")))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}

/// Boxes a string body into the service body type.
pub fn full_body(content: impl Into<Bytes>) -> BoxBody<Bytes, Infallible> {
    Full::new(content.into()).map_err(|e| match e {}).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_carries_reason() {
        let response = make_error_response(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_response_unknown_status() {
        let status = StatusCode::from_u16(599).unwrap();
        let response = make_error_response(status);
        assert_eq!(response.status().as_u16(), 599);
    }
}
