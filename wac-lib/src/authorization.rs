use ldp_lib::vocab;
use log::debug;
use oxrdf::{Graph, Subject, TermRef};
use std::collections::HashSet;

use crate::AccessMode;

/// One typed policy entry, built by a single scan over the raw ACL graph.
/// Checks afterwards are plain field access instead of ad hoc triple-pattern
/// queries.
#[derive(Debug, Default, Clone)]
pub struct Authorization {
    pub modes: HashSet<AccessMode>,
    pub agents: HashSet<String>,
    /// Set when the entry names the `foaf:Agent` class: everyone,
    /// authenticated or not.
    pub public: bool,
    pub agent_groups: Vec<String>,
    pub access_to: HashSet<String>,
    /// Union of `acl:default` and the legacy `acl:defaultForNew`.
    pub default_for: HashSet<String>,
    pub origins: Vec<String>,
}

impl Authorization {
    /// Extracts every Authorization from a policy graph. A subject qualifies
    /// by carrying at least one `acl:mode`; an entry without modes grants
    /// nothing anyway.
    pub fn scan(graph: &Graph) -> Vec<Authorization> {
        let mut subjects: Vec<Subject> = Vec::new();
        let mut seen: HashSet<Subject> = HashSet::new();
        for triple in graph.iter() {
            if triple.predicate == vocab::acl::MODE {
                let subject = triple.subject.into_owned();
                if seen.insert(subject.clone()) {
                    subjects.push(subject);
                }
            }
        }

        let mut entries = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let mut entry = Authorization::default();
            for triple in graph.triples_for_subject(&subject) {
                let object_iri = match triple.object {
                    TermRef::NamedNode(node) => node,
                    _ => continue,
                };
                match triple.predicate {
                    p if p == vocab::acl::MODE => {
                        let mode = match object_iri {
                            m if m == vocab::acl::READ => AccessMode::Read,
                            m if m == vocab::acl::WRITE => AccessMode::Write,
                            m if m == vocab::acl::APPEND => AccessMode::Append,
                            m if m == vocab::acl::CONTROL => AccessMode::Control,
                            other => {
                                debug!("ignoring unknown acl:mode {}", other);
                                continue;
                            }
                        };
                        entry.modes.insert(mode);
                    }
                    p if p == vocab::acl::AGENT => {
                        entry.agents.insert(object_iri.as_str().to_string());
                    }
                    p if p == vocab::acl::AGENT_CLASS => {
                        if object_iri == vocab::foaf::AGENT {
                            entry.public = true;
                        } else {
                            debug!("ignoring unsupported acl:agentClass {}", object_iri);
                        }
                    }
                    p if p == vocab::acl::AGENT_GROUP => {
                        entry.agent_groups.push(object_iri.as_str().to_string());
                    }
                    p if p == vocab::acl::ACCESS_TO => {
                        entry.access_to.insert(object_iri.as_str().to_string());
                    }
                    p if p == vocab::acl::DEFAULT || p == vocab::acl::DEFAULT_FOR_NEW => {
                        entry.default_for.insert(object_iri.as_str().to_string());
                    }
                    p if p == vocab::acl::ORIGIN => {
                        entry.origins.push(object_iri.as_str().to_string());
                    }
                    _ => {}
                }
            }
            entries.push(entry);
        }
        entries
    }

    /// Whether this entry governs the resource. An entry found via a
    /// directory ancestor applies through `default`; a container's own
    /// policy applies to the container only through `accessTo`.
    pub fn covers(&self, resource: &str, container_url: &str, direct: bool) -> bool {
        if self.access_to.contains(resource) {
            return true;
        }
        !direct && self.default_for.contains(container_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldp_lib::parse_graph;

    fn scan(turtle: &str) -> Vec<Authorization> {
        let graph = parse_graph(turtle.as_bytes(), "http://localhost:8443/.acl", "text/turtle")
            .unwrap();
        Authorization::scan(&graph)
    }

    #[test]
    fn test_scan_builds_typed_entries() {
        let entries = scan(
            r#"@prefix acl: <http://www.w3.org/ns/auth/acl#>.
               <#owner> a acl:Authorization;
                   acl:agent <https://u/#me>;
                   acl:mode acl:Read, acl:Write;
                   acl:accessTo </>;
                   acl:default </>."#,
        );
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert!(entry.modes.contains(&AccessMode::Read));
        assert!(entry.modes.contains(&AccessMode::Write));
        assert!(!entry.modes.contains(&AccessMode::Control));
        assert!(entry.agents.contains("https://u/#me"));
        assert!(entry.access_to.contains("http://localhost:8443/"));
        assert!(entry.default_for.contains("http://localhost:8443/"));
        assert!(!entry.public);
    }

    #[test]
    fn test_scan_skips_subjects_without_modes() {
        let entries = scan(
            r#"@prefix acl: <http://www.w3.org/ns/auth/acl#>.
               <#dangling> acl:agent <https://u/#me>; acl:accessTo </>."#,
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn test_public_class_and_groups() {
        let entries = scan(
            r#"@prefix acl: <http://www.w3.org/ns/auth/acl#>.
               @prefix foaf: <http://xmlns.com/foaf/0.1/>.
               <#share> acl:mode acl:Read;
                   acl:agentClass foaf:Agent;
                   acl:agentGroup </groups.ttl#team>;
                   acl:accessTo </shared>."#,
        );
        let entry = &entries[0];
        assert!(entry.public);
        assert_eq!(
            entry.agent_groups,
            vec!["http://localhost:8443/groups.ttl#team".to_string()]
        );
    }

    #[test]
    fn test_covers_direct_vs_default() {
        let entries = scan(
            r#"@prefix acl: <http://www.w3.org/ns/auth/acl#>.
               <#inherit> acl:mode acl:Read; acl:default </a/>."#,
        );
        let entry = &entries[0];
        // Descendant found via the ancestor policy.
        assert!(entry.covers(
            "http://localhost:8443/a/b",
            "http://localhost:8443/a/",
            false
        ));
        // The container itself, via its own policy: default does not apply.
        assert!(!entry.covers(
            "http://localhost:8443/a/",
            "http://localhost:8443/a/",
            true
        ));
    }
}
