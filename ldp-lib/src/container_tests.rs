use oxrdf::{NamedNode, NamedNodeRef};
use std::sync::Once;

use crate::{vocab, ContainerBuilder, LdpConfig, LdpError};

static INIT_LOGGER: Once = Once::new();

fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn builder() -> ContainerBuilder {
    init_logging();
    ContainerBuilder::new(&LdpConfig::default())
}

fn node(iri: &str) -> NamedNode {
    NamedNode::new(iri).unwrap()
}

fn has_type(graph: &oxrdf::Graph, subject: &NamedNode, class: NamedNodeRef<'_>) -> bool {
    graph
        .objects_for_subject_predicate(subject, vocab::rdf::TYPE)
        .any(|object| object == class.into())
}

#[tokio::test]
async fn test_listing_excludes_acl_and_meta_sidecars() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.ttl"), "").unwrap();
    std::fs::write(dir.path().join("a.ttl.acl"), "").unwrap();
    std::fs::write(dir.path().join("a.ttl.meta"), "").unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let container = node("http://localhost:8443/");
    let contained: Vec<String> = graph
        .objects_for_subject_predicate(&container, vocab::ldp::CONTAINS)
        .map(|object| object.to_string())
        .collect();
    assert_eq!(contained, vec!["<http://localhost:8443/a.ttl>".to_string()]);
}

#[tokio::test]
async fn test_container_and_entry_types() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("doc.ttl"), "").unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let container = node("http://localhost:8443/");
    assert!(has_type(&graph, &container, vocab::ldp::CONTAINER));
    assert!(has_type(&graph, &container, vocab::ldp::BASIC_CONTAINER));

    let sub = node("http://localhost:8443/sub/");
    assert!(has_type(&graph, &sub, vocab::ldp::CONTAINER));
    assert!(has_type(&graph, &sub, vocab::ldp::BASIC_CONTAINER));
    assert!(has_type(&graph, &sub, vocab::ldp::RESOURCE));

    let doc = node("http://localhost:8443/doc.ttl");
    assert!(has_type(&graph, &doc, vocab::ldp::RESOURCE));
    assert!(!has_type(&graph, &doc, vocab::ldp::CONTAINER));
}

#[tokio::test]
async fn test_sidecar_types_are_copied_for_entries() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pic.png"), [0u8; 4]).unwrap();
    std::fs::write(
        dir.path().join("pic.png.meta"),
        "<> a <http://ex.org/Photo>.",
    )
    .unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let pic = node("http://localhost:8443/pic.png");
    assert!(has_type(
        &graph,
        &pic,
        NamedNodeRef::new("http://ex.org/Photo").unwrap()
    ));
}

#[tokio::test]
async fn test_sidecar_cannot_claim_container_type_for_a_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plain"), "data").unwrap();
    std::fs::write(
        dir.path().join("plain.meta"),
        "<> a <http://www.w3.org/ns/ldp#BasicContainer>, <http://ex.org/Thing>.",
    )
    .unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let plain = node("http://localhost:8443/plain");
    assert!(!has_type(&graph, &plain, vocab::ldp::BASIC_CONTAINER));
    assert!(!has_type(&graph, &plain, vocab::ldp::CONTAINER));
    assert!(has_type(
        &graph,
        &plain,
        NamedNodeRef::new("http://ex.org/Thing").unwrap()
    ));
}

#[tokio::test]
async fn test_rdf_documents_are_their_own_metadata() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("note.ttl"), "<> a <http://ex.org/Note>.").unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let note = node("http://localhost:8443/note.ttl");
    assert!(has_type(
        &graph,
        &note,
        NamedNodeRef::new("http://ex.org/Note").unwrap()
    ));
}

#[tokio::test]
async fn test_entries_carry_stats() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blob"), [0u8; 16]).unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let blob = node("http://localhost:8443/blob");
    let size = graph
        .object_for_subject_predicate(&blob, vocab::stat::SIZE)
        .expect("size triple");
    assert_eq!(size.to_string(), "\"16\"^^<http://www.w3.org/2001/XMLSchema#integer>");
    assert!(graph
        .object_for_subject_predicate(&blob, vocab::stat::MTIME)
        .is_some());
}

#[tokio::test]
async fn test_container_own_sidecar_is_merged() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".meta"),
        "<> <http://purl.org/dc/terms/title> \"Root Container\".",
    )
    .unwrap();

    let graph = builder()
        .list(dir.path(), "http://localhost:8443/")
        .await
        .unwrap();

    let container = node("http://localhost:8443/");
    let title = graph
        .object_for_subject_predicate(
            &container,
            NamedNodeRef::new("http://purl.org/dc/terms/title").unwrap(),
        )
        .expect("title triple");
    assert_eq!(title.to_string(), "\"Root Container\"");
}

#[tokio::test]
async fn test_missing_directory_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let err = builder()
        .list(&dir.path().join("gone"), "http://localhost:8443/gone/")
        .await
        .unwrap_err();
    assert!(matches!(err, LdpError::NotFound(_)));
}

#[tokio::test]
async fn test_listing_serializes_as_turtle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.ttl"), "").unwrap();

    let bytes = builder()
        .list_serialized(dir.path(), "http://localhost:8443/", "text/turtle")
        .await
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("a.ttl"));
    assert!(text.contains("ldp:"));
}
