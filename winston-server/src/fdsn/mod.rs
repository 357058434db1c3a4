//! FDSN web services over HTTP: station and dataselect queries, plus the
//! `version` and `application.wadl` resources. The event service answers
//! 501 for everything.

pub mod dataselect;
pub mod error;
pub mod mseed;
pub mod query;
pub mod station;

use std::io;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{Method, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::store::Storage;
pub use error::FdsnRequestError;
use query::{FdsnQuery, Service};

/// Configuration for the FDSN surface.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FdsnConfig {
    /// Reported by `version` and in error bodies. Default: `"1.1.0"`.
    pub service_version: String,
    /// Queries matching more channels are refused with 413. Default: `10_000`.
    pub max_query_channels: usize,
}

impl Default for FdsnConfig {
    fn default() -> Self {
        Self {
            service_version: "1.1.0".to_owned(),
            max_query_channels: 10_000,
        }
    }
}

/// Shared by every request handler.
#[derive(Clone)]
pub struct FdsnState {
    pub storage: Arc<dyn Storage>,
    pub config: Arc<FdsnConfig>,
}

impl FdsnState {
    pub fn new(storage: Arc<dyn Storage>, config: FdsnConfig) -> Self {
        Self {
            storage,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: FdsnState) -> Router {
    Router::new()
        .route(
            "/fdsnws/{service}/1/{resource}",
            get(endpoint).post(endpoint),
        )
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown_rx` turns true.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "fdsn service listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
}

async fn endpoint(
    State(state): State<FdsnState>,
    Path((service, resource)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    debug!(%method, %uri, "fdsn request");
    match handle(&state, &service, &resource, &method, &uri, &body).await {
        Ok(response) => response,
        Err(e) => {
            debug!(status = %e.status, message = %e.message, "fdsn request failed");
            e.render(&uri.to_string(), &state.config.service_version)
        }
    }
}

async fn handle(
    state: &FdsnState,
    service: &str,
    resource: &str,
    method: &Method,
    uri: &Uri,
    body: &str,
) -> Result<Response, FdsnRequestError> {
    let kind = match service {
        "station" => Service::Station,
        "dataselect" => Service::Dataselect,
        "event" => {
            return Err(FdsnRequestError::not_implemented(
                "the event service is not provided by this server",
            ));
        }
        other => {
            let what = format!("unknown service: {other}");
            return Err(FdsnRequestError::not_found(what));
        }
    };

    match resource {
        "version" => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            state.config.service_version.clone(),
        )
            .into_response()),
        "application.wadl" => Ok((
            [(header::CONTENT_TYPE, "application/xml")],
            wadl(service),
        )
            .into_response()),
        "query" => {
            let query = if *method == Method::POST {
                FdsnQuery::from_post_body(body, kind)?
            } else {
                let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri)
                    .map_err(|e| FdsnRequestError::bad_request(e.body_text()))?;
                FdsnQuery::from_pairs(&pairs, kind)?
            };
            match kind {
                Service::Station => station::query(state, query).await,
                Service::Dataselect => dataselect::query(state, query).await,
            }
        }
        other => {
            let what = format!("unknown resource: {other}");
            Err(FdsnRequestError::not_found(what))
        }
    }
}

fn wadl(service: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<application xmlns="http://wadl.dev.java.net/2009/02">
  <resources base="/fdsnws/{service}/1/">
    <resource path="query">
      <method name="GET"><request/><response status="200"/></method>
      <method name="POST"><request/><response status="200"/></method>
    </resource>
    <resource path="version">
      <method name="GET"><response><representation mediaType="text/plain"/></response></method>
    </resource>
    <resource path="application.wadl">
      <method name="GET"><response><representation mediaType="application/xml"/></response></method>
    </resource>
  </resources>
</application>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use winston_rs_protocol::{Instrument, Scnl, TracePacket};

    struct HttpResponse {
        status: u16,
        head: String,
        body: Vec<u8>,
    }

    impl HttpResponse {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    async fn start() -> (String, watch::Sender<bool>) {
        let store = MemoryStore::new();
        for (sta, net) in [("ABC", "XX"), ("DEF", "XX"), ("GHI", "YY")] {
            for i in 0..10 {
                store.push_packet(TracePacket::new(
                    Scnl::new(sta, "EHZ", net, "--"),
                    f64::from(i * 10),
                    1.0,
                    vec![i; 10],
                ));
            }
        }
        let scnl = Scnl::new("ABC", "EHZ", "XX", "--");
        store
            .set_instrument(&scnl, Instrument::at(-7.5, 110.4))
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = watch::channel(false);
        let state = FdsnState::new(Arc::new(store), FdsnConfig::default());
        tokio::spawn(serve(listener, router(state), rx));
        (addr, tx)
    }

    /// HTTP/1.0 so bodies are either length- or close-delimited.
    async fn request(addr: &str, method: &str, target: &str, body: &str) -> HttpResponse {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let req = format!(
            "{method} {target} HTTP/1.0\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(req.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8(raw[..split].to_vec()).unwrap();
        let status = head.split(' ').nth(1).unwrap().parse().unwrap();
        HttpResponse {
            status,
            head: head.to_ascii_lowercase(),
            body: raw[split + 4..].to_vec(),
        }
    }

    #[tokio::test]
    async fn version_and_wadl() {
        let (addr, _tx) = start().await;
        let resp = request(&addr, "GET", "/fdsnws/station/1/version", "").await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "1.1.0");

        let resp = request(&addr, "GET", "/fdsnws/dataselect/1/application.wadl", "").await;
        assert_eq!(resp.status, 200);
        assert!(resp.head.contains("content-type: application/xml"));
        assert!(resp.text().contains("/fdsnws/dataselect/1/"));
    }

    #[tokio::test]
    async fn station_text_query() {
        let (addr, _tx) = start().await;
        let resp = request(&addr, "GET", "/fdsnws/station/1/query?net=XX", "").await;
        assert_eq!(resp.status, 200);
        let text = resp.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("XX|ABC|-7.5|110.4|"));
        assert!(lines[2].starts_with("XX|DEF|"));
    }

    #[tokio::test]
    async fn station_geo_and_xml() {
        let (addr, _tx) = start().await;
        let resp = request(
            &addr,
            "GET",
            "/fdsnws/station/1/query?lat=-7.5&lon=110.4&maxradius=1&level=channel&format=xml",
            "",
        )
        .await;
        assert_eq!(resp.status, 200);
        let xml = resp.text();
        assert_eq!(xml.matches("<Channel ").count(), 1);
        assert!(xml.contains("<Station code=\"ABC\""));
    }

    #[tokio::test]
    async fn station_post_query() {
        let (addr, _tx) = start().await;
        let body = "level=network\n\
                    YY * * * 2000-01-01T12:00:00 2000-01-01T12:01:00\n";
        let resp = request(&addr, "POST", "/fdsnws/station/1/query", body).await;
        assert_eq!(resp.status, 200);
        let text = resp.text();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("YY|"));
    }

    #[tokio::test]
    async fn errors_and_nodata() {
        let (addr, _tx) = start().await;
        let resp = request(&addr, "GET", "/fdsnws/station/1/query?colour=red", "").await;
        assert_eq!(resp.status, 400);
        let text = resp.text();
        assert!(text.starts_with("Error 400: Bad Request\n\nunknown parameter: colour"));
        assert!(text.contains("Request:\n/fdsnws/station/1/query?colour=red\n"));
        assert!(text.ends_with("Service version:\n1.1.0\n"));

        let resp = request(&addr, "GET", "/fdsnws/station/1/query?sta=NOPE", "").await;
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_empty());

        let uri = "/fdsnws/station/1/query?sta=NOPE&nodata=404";
        let resp = request(&addr, "GET", uri, "").await;
        assert_eq!(resp.status, 404);
        assert!(resp.text().starts_with("Error 404: Not Found"));

        let resp = request(&addr, "GET", "/fdsnws/event/1/query", "").await;
        assert_eq!(resp.status, 501);
        assert!(resp.text().starts_with("Error 501: Not Implemented"));

        let resp = request(&addr, "GET", "/fdsnws/station/1/nothing", "").await;
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn dataselect_streams_records() {
        let (addr, _tx) = start().await;
        let resp = request(
            &addr,
            "GET",
            "/fdsnws/dataselect/1/query?sta=ABC&starttime=2000-01-01T12:00:00&endtime=2000-01-01T12:00:25",
            "",
        )
        .await;
        assert_eq!(resp.status, 200);
        assert!(resp.head.contains(dataselect::CONTENT_TYPE));
        assert_eq!(resp.body.len(), 3 * mseed::RECORD_LEN);
        assert_eq!(&resp.body[8..13], b"ABC  ");
        let second = &resp.body[mseed::RECORD_LEN..];
        assert_eq!(&second[..6], b"000002");
        let record = miniseed_rs::decode(&resp.body[..mseed::RECORD_LEN]).unwrap();
        assert_eq!(record.nslc(), "XX.ABC..EHZ");
        assert_eq!(record.samples.len(), 10);

        let resp = request(&addr, "GET", "/fdsnws/dataselect/1/query?sta=ABC", "").await;
        assert_eq!(resp.status, 400);

        let resp = request(
            &addr,
            "GET",
            "/fdsnws/dataselect/1/query?sta=ABC&starttime=2001-01-01&endtime=2001-01-02",
            "",
        )
        .await;
        assert_eq!(resp.status, 204);
    }

    #[tokio::test]
    async fn dataselect_post_lines() {
        let (addr, _tx) = start().await;
        let body = "XX ABC -- EHZ 2000-01-01T12:00:00 2000-01-01T12:00:05\n\
                    YY GHI -- EHZ 2000-01-01T12:01:30 2000-01-01T12:01:35\n";
        let resp = request(&addr, "POST", "/fdsnws/dataselect/1/query", body).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), 2 * mseed::RECORD_LEN);
        assert_eq!(&resp.body[8..13], b"ABC  ");
        let second = &resp.body[mseed::RECORD_LEN..];
        assert_eq!(&second[8..13], b"GHI  ");
    }

    #[tokio::test]
    async fn shutdown_stops_listener() {
        let (addr, tx) = start().await;
        tx.send(true).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(TcpStream::connect(&addr).await.is_err());
    }
}
