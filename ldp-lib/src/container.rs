use log::{debug, warn};
use oxrdf::{Graph, Literal, NamedNode, TermRef, TripleRef};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::graph_store::{parse_graph, serialize_graph, TEXT_TURTLE};
use crate::resource_mapper::encode_url_path;
use crate::{vocab, LdpConfig, LdpError, LdpResult};

const RDF_EXTENSION: &str = ".ttl";

/// Builds the RDF description of a directory's contents.
pub struct ContainerBuilder {
    suffix_acl: String,
    suffix_meta: String,
}

impl ContainerBuilder {
    pub fn new(config: &LdpConfig) -> Self {
        Self {
            suffix_acl: config.suffix_acl.clone(),
            suffix_meta: config.suffix_meta.clone(),
        }
    }

    /// Lists a directory as a container graph.
    ///
    /// Per-entry stat races and unreadable sidecars are recovered locally;
    /// a failure to read the directory itself propagates.
    pub async fn list(&self, dir_path: &Path, dir_url: &str) -> LdpResult<Graph> {
        let dir_url = if dir_url.ends_with('/') {
            dir_url.to_string()
        } else {
            format!("{}/", dir_url)
        };
        let container = NamedNode::new(dir_url.clone())
            .map_err(|e| LdpError::InvalidParam(format!("bad container url: {}", e)))?;

        let mut graph = Graph::new();
        graph.insert(TripleRef::new(
            &container,
            vocab::rdf::TYPE,
            vocab::ldp::CONTAINER,
        ));
        graph.insert(TripleRef::new(
            &container,
            vocab::rdf::TYPE,
            vocab::ldp::BASIC_CONTAINER,
        ));
        if let Ok(meta) = tokio::fs::metadata(dir_path).await {
            add_stats(&mut graph, &container, &meta);
        }

        // The container's own sidecar contributes additional triples.
        if let Some(meta_graph) = self
            .read_metadata_graph(&dir_path.join(&self.suffix_meta), &dir_url)
            .await
        {
            for triple in meta_graph.iter() {
                graph.insert(triple);
            }
        }

        let mut entries = tokio::fs::read_dir(dir_path).await?;
        loop {
            let entry = match entries.next_entry().await? {
                Some(entry) => entry,
                None => break,
            };
            let name = match entry.file_name().to_str() {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name.ends_with(&self.suffix_acl) || name.ends_with(&self.suffix_meta) {
                continue;
            }
            // The entry may vanish between readdir and stat.
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!("skipping {}: {}", name, e);
                    continue;
                }
            };
            let is_dir = meta.is_dir();
            let entry_url = format!(
                "{}{}{}",
                dir_url,
                encode_url_path(&name),
                if is_dir { "/" } else { "" }
            );
            let subject = match NamedNode::new(entry_url.clone()) {
                Ok(subject) => subject,
                Err(e) => {
                    warn!("skipping unrepresentable entry {}: {}", name, e);
                    continue;
                }
            };

            graph.insert(TripleRef::new(&container, vocab::ldp::CONTAINS, &subject));
            add_stats(&mut graph, &subject, &meta);
            if is_dir {
                graph.insert(TripleRef::new(&subject, vocab::rdf::TYPE, vocab::ldp::CONTAINER));
                graph.insert(TripleRef::new(
                    &subject,
                    vocab::rdf::TYPE,
                    vocab::ldp::BASIC_CONTAINER,
                ));
            }
            graph.insert(TripleRef::new(&subject, vocab::rdf::TYPE, vocab::ldp::RESOURCE));

            let sidecar = if is_dir {
                entry.path().join(&self.suffix_meta)
            } else if name.ends_with(RDF_EXTENSION) {
                // An RDF document carries its own metadata.
                entry.path()
            } else {
                dir_path.join(format!("{}{}", name, self.suffix_meta))
            };
            if let Some(meta_graph) = self.read_metadata_graph(&sidecar, &entry_url).await {
                copy_entry_types(&mut graph, &meta_graph, &subject, is_dir);
            }
        }

        Ok(graph)
    }

    /// Lists a directory and serializes it in the negotiated format.
    pub async fn list_serialized(
        &self,
        dir_path: &Path,
        dir_url: &str,
        content_type: &str,
    ) -> LdpResult<Vec<u8>> {
        let graph = self.list(dir_path, dir_url).await?;
        serialize_graph(&graph, content_type)
    }

    async fn read_metadata_graph(&self, path: &Path, base_url: &str) -> Option<Graph> {
        let data = tokio::fs::read(path).await.ok()?;
        match parse_graph(&data, base_url, TEXT_TURTLE) {
            Ok(graph) => Some(graph),
            Err(e) => {
                debug!("ignoring unparseable metadata {}: {}", path.display(), e);
                None
            }
        }
    }
}

// A sidecar can add types, but a plain file cannot retroactively claim to
// be a container.
fn copy_entry_types(graph: &mut Graph, meta_graph: &Graph, subject: &NamedNode, is_dir: bool) {
    for triple in meta_graph.triples_for_subject(subject) {
        if triple.predicate != vocab::rdf::TYPE {
            continue;
        }
        if !is_dir {
            if let TermRef::NamedNode(object) = triple.object {
                if object == vocab::ldp::CONTAINER || object == vocab::ldp::BASIC_CONTAINER {
                    debug!("dropping container type claim from sidecar of {}", subject);
                    continue;
                }
            }
        }
        graph.insert(triple);
    }
}

fn add_stats(graph: &mut Graph, subject: &NamedNode, meta: &std::fs::Metadata) {
    if let Ok(modified) = meta.modified() {
        if let Ok(elapsed) = modified.duration_since(UNIX_EPOCH) {
            let mtime = Literal::new_typed_literal(elapsed.as_secs().to_string(), vocab::xsd::INTEGER);
            graph.insert(TripleRef::new(subject, vocab::stat::MTIME, &mtime));
        }
    }
    let size = Literal::new_typed_literal(meta.len().to_string(), vocab::xsd::INTEGER);
    graph.insert(TripleRef::new(subject, vocab::stat::SIZE, &size));
}
