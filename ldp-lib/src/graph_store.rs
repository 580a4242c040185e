use async_trait::async_trait;
use log::{debug, warn};
use oxrdf::Graph;
use oxttl::{NTriplesParser, NTriplesSerializer, TurtleParser, TurtleSerializer};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;

use crate::{vocab, LdpError, LdpResult, ResourceMapper};

pub const TEXT_TURTLE: &str = "text/turtle";
pub const APPLICATION_N_TRIPLES: &str = "application/n-triples";

/// Parses raw bytes into a triple graph.
pub fn parse_graph(data: &[u8], base_url: &str, content_type: &str) -> LdpResult<Graph> {
    let mut graph = Graph::new();
    match content_type {
        APPLICATION_N_TRIPLES => {
            for triple in NTriplesParser::new().for_reader(data) {
                let triple = triple
                    .map_err(|e| LdpError::ParseError(format!("{}: {}", base_url, e)))?;
                graph.insert(&triple);
            }
        }
        TEXT_TURTLE => {
            let parser = TurtleParser::new()
                .with_base_iri(base_url)
                .map_err(|e| LdpError::InvalidParam(format!("bad base iri {}: {}", base_url, e)))?;
            for triple in parser.for_reader(data) {
                let triple = triple
                    .map_err(|e| LdpError::ParseError(format!("{}: {}", base_url, e)))?;
                graph.insert(&triple);
            }
        }
        other => {
            return Err(LdpError::Unsupported(format!(
                "cannot parse {} as RDF",
                other
            )))
        }
    }
    Ok(graph)
}

/// Serializes a graph in the negotiated format.
pub fn serialize_graph(graph: &Graph, content_type: &str) -> LdpResult<Vec<u8>> {
    match content_type {
        APPLICATION_N_TRIPLES => {
            let mut serializer = NTriplesSerializer::new().for_writer(Vec::new());
            for triple in graph.iter() {
                serializer
                    .serialize_triple(triple)
                    .map_err(|e| LdpError::Internal(format!("serialize failed: {}", e)))?;
            }
            Ok(serializer.finish())
        }
        TEXT_TURTLE => {
            let mut serializer = TurtleSerializer::new()
                .with_prefix("ldp", vocab::ldp::NS)
                .map_err(|e| LdpError::Internal(format!("bad prefix: {}", e)))?
                .with_prefix("stat", "http://www.w3.org/ns/posix/stat#")
                .map_err(|e| LdpError::Internal(format!("bad prefix: {}", e)))?
                .for_writer(Vec::new());
            for triple in graph.iter() {
                serializer
                    .serialize_triple(triple)
                    .map_err(|e| LdpError::Internal(format!("serialize failed: {}", e)))?;
            }
            serializer
                .finish()
                .map_err(|e| LdpError::Internal(format!("serialize failed: {}", e)))
        }
        other => Err(LdpError::Unsupported(format!(
            "cannot serialize RDF as {}",
            other
        ))),
    }
}

/// Fetches a parsed graph for a URL. `NotFound` stays distinguishable from
/// every other failure: the ACL walk continues on the former and aborts on
/// the latter.
#[async_trait]
pub trait GraphFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> LdpResult<Graph>;
}

/// Scoped TLS settings for outbound document fetches.
#[derive(Debug, Clone, Default)]
pub struct FetchTlsConfig {
    pub accept_invalid_certs: bool,
}

pub struct RemoteGraphFetcher {
    client: reqwest::Client,
}

impl RemoteGraphFetcher {
    pub fn new(tls: &FetchTlsConfig) -> LdpResult<Self> {
        if tls.accept_invalid_certs {
            warn!("remote graph fetcher will accept invalid TLS certificates");
        }
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(tls.accept_invalid_certs)
            .build()
            .map_err(|e| LdpError::Internal(format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl GraphFetcher for RemoteGraphFetcher {
    async fn fetch(&self, url: &str) -> LdpResult<Graph> {
        debug!("fetching remote graph {}", url);
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, TEXT_TURTLE)
            .send()
            .await
            .map_err(|e| LdpError::RemoteError(format!("{}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(LdpError::from_http_status(resp.status(), url.to_string()));
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or("").trim().to_string())
            .unwrap_or_else(|| TEXT_TURTLE.to_string());
        let body = resp
            .bytes()
            .await
            .map_err(|e| LdpError::RemoteError(format!("{}: {}", url, e)))?;
        parse_graph(&body, url, &content_type)
    }
}

/// Resolves URLs under the server root straight to files through the
/// Resource Mapper; anything else goes to the remote fetcher, if any.
pub struct LocalGraphFetcher {
    mapper: Arc<ResourceMapper>,
    remote: Option<RemoteGraphFetcher>,
}

impl LocalGraphFetcher {
    pub fn new(mapper: Arc<ResourceMapper>, remote: Option<RemoteGraphFetcher>) -> Self {
        Self { mapper, remote }
    }
}

#[async_trait]
impl GraphFetcher for LocalGraphFetcher {
    async fn fetch(&self, url: &str) -> LdpResult<Graph> {
        if !self.mapper.owns_url(url) {
            return match &self.remote {
                Some(remote) => remote.fetch(url).await,
                None => Err(LdpError::RemoteError(format!(
                    "no remote fetcher configured for {}",
                    url
                ))),
            };
        }
        let mapped = self.mapper.map_url_to_file(url, None, false).await?;
        debug!("reading graph {} from {}", url, mapped.path.display());
        let data = tokio::fs::read(&mapped.path).await?;
        parse_graph(&data, url, &mapped.content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LdpConfig;

    fn local_fetcher(root: &std::path::Path) -> LocalGraphFetcher {
        let config = LdpConfig {
            root_url: "http://localhost:8443".to_string(),
            root_path: root.to_str().unwrap().to_string(),
            ..LdpConfig::default()
        };
        LocalGraphFetcher::new(Arc::new(ResourceMapper::new(&config).unwrap()), None)
    }

    #[test]
    fn test_parse_and_serialize_round_trip() {
        let turtle = b"<http://ex.org/a> a <http://www.w3.org/ns/ldp#Resource>.";
        let graph = parse_graph(turtle, "http://ex.org/", TEXT_TURTLE).unwrap();
        assert_eq!(graph.len(), 1);

        let bytes = serialize_graph(&graph, APPLICATION_N_TRIPLES).unwrap();
        let again = parse_graph(&bytes, "http://ex.org/", APPLICATION_N_TRIPLES).unwrap();
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_relative_iris_resolve_against_base() {
        let graph = parse_graph(
            b"<#owner> <http://www.w3.org/ns/auth/acl#accessTo> </>.",
            "http://localhost:8443/.acl",
            TEXT_TURTLE,
        )
        .unwrap();
        let triple = graph.iter().next().unwrap();
        assert_eq!(triple.object.to_string(), "<http://localhost:8443/>");
    }

    #[test]
    fn test_malformed_turtle_is_a_parse_error() {
        let err = parse_graph(b"this is not turtle @@@", "http://ex.org/", TEXT_TURTLE).unwrap_err();
        assert!(matches!(err, LdpError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_local_fetch_distinguishes_absent_from_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".acl"),
            "<#o> <http://www.w3.org/ns/auth/acl#mode> <http://www.w3.org/ns/auth/acl#Read>.",
        )
        .unwrap();
        let fetcher = local_fetcher(dir.path());

        let graph = fetcher.fetch("http://localhost:8443/.acl").await.unwrap();
        assert_eq!(graph.len(), 1);

        let err = fetcher
            .fetch("http://localhost:8443/sub/.acl")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_local_fetch_surfaces_malformed_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".acl"), "@prefix broken").unwrap();
        let fetcher = local_fetcher(dir.path());

        let err = fetcher.fetch("http://localhost:8443/.acl").await.unwrap_err();
        assert!(matches!(err, LdpError::ParseError(_)));
    }
}
