use ldp_lib::{GraphFetcher, LdpConfig};
use log::{debug, info, warn};
use oxrdf::{NamedNode, TermRef};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use crate::{AccessMode, Authorization, WacError, WacResult};

use ldp_lib::vocab;

#[derive(Debug, Clone)]
pub struct AclCheckerOptions {
    pub suffix: String,
    pub strict_origin: bool,
    pub trusted_origins: Vec<String>,
    /// The request's `Origin` header, if any.
    pub origin: Option<String>,
}

impl AclCheckerOptions {
    pub fn from_config(config: &LdpConfig, origin: Option<String>) -> Self {
        Self {
            suffix: config.suffix_acl.clone(),
            strict_origin: config.strict_origin,
            trusted_origins: config.trusted_origins.clone(),
            origin,
        }
    }
}

struct NearestPolicy {
    acl_url: String,
    /// The ACL URL with the suffix stripped: the resource or container this
    /// policy is attached to.
    container_url: String,
    /// Found at the resource's own policy location, not via an ancestor.
    direct: bool,
    entries: Vec<Authorization>,
}

/// Resolves whether an agent may perform an access mode on one resource.
///
/// One checker is created per resource per request and dropped at request
/// end; all caches below are scoped to that lifetime and never shared.
pub struct AclChecker {
    resource: String,
    fetcher: Arc<dyn GraphFetcher>,
    suffix: String,
    strict_origin: bool,
    trusted_origins: Vec<String>,
    origin: Option<String>,
    // Coalesces concurrent mode checks onto one policy walk.
    nearest: OnceCell<Result<Arc<NearestPolicy>, WacError>>,
    decisions: Mutex<HashMap<(AccessMode, Option<String>), WacResult<()>>>,
    groups: Mutex<HashMap<String, Arc<OnceCell<Option<HashSet<String>>>>>>,
}

impl AclChecker {
    pub fn new(resource: &str, fetcher: Arc<dyn GraphFetcher>, options: AclCheckerOptions) -> Self {
        Self {
            resource: resource.to_string(),
            fetcher,
            suffix: options.suffix,
            strict_origin: options.strict_origin,
            trusted_origins: options.trusted_origins,
            origin: options.origin,
            nearest: OnceCell::new(),
            decisions: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_acl(&self, url: &str) -> bool {
        url.ends_with(&self.suffix)
    }

    /// Checks whether `user` may perform `mode` on the resource. Decisions
    /// are memoized per (mode, user) for the checker's lifetime.
    pub async fn can(&self, user: Option<&str>, mode: AccessMode) -> WacResult<()> {
        let key = (mode, user.map(str::to_string));
        if let Some(hit) = self.decisions.lock().await.get(&key) {
            return hit.clone();
        }
        let result = self.check(user, mode).await;
        self.decisions.lock().await.insert(key, result.clone());
        result
    }

    /// Grants if any of `modes` is permitted; otherwise reports the most
    /// specific denial observed across them.
    pub async fn can_any(&self, user: Option<&str>, modes: &[AccessMode]) -> WacResult<()> {
        let mut denial: Option<WacError> = None;
        for mode in modes {
            match self.can(user, *mode).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if denial.as_ref().map_or(true, |held| err.rank() > held.rank()) {
                        denial = Some(err);
                    }
                }
            }
        }
        Err(denial.unwrap_or_else(|| WacError::PolicyMissing(self.resource.clone())))
    }

    async fn check(&self, user: Option<&str>, requested: AccessMode) -> WacResult<()> {
        // A policy document is only ever governed by Control over the
        // resource it protects.
        let (resource, mode) = if self.is_acl(&self.resource) {
            let subject = self.resource[..self.resource.len() - self.suffix.len()].to_string();
            (subject, AccessMode::Control)
        } else {
            (self.resource.clone(), requested)
        };
        debug!(
            "can {} {} {}?",
            user.unwrap_or("an unauthenticated agent"),
            mode,
            resource
        );

        let nearest = self.nearest(&resource).await?;
        for entry in &nearest.entries {
            if !entry.modes.contains(&mode) {
                continue;
            }
            if !entry.covers(&resource, &nearest.container_url, nearest.direct) {
                continue;
            }
            if !self.origin_applicable(&entry.origins) {
                continue;
            }
            if self.entry_grants(entry, user).await {
                info!(
                    "{} access to {} permitted by {}",
                    mode, resource, nearest.acl_url
                );
                return Ok(());
            }
        }

        match user {
            None => Err(WacError::Unauthenticated(resource)),
            Some(user) => Err(WacError::Forbidden(user.to_string())),
        }
    }

    async fn nearest(&self, resource: &str) -> WacResult<Arc<NearestPolicy>> {
        self.nearest
            .get_or_init(|| async { self.find_nearest(resource).await.map(Arc::new) })
            .await
            .clone()
    }

    /// Walks the candidate list nearest-first. Only "not found" continues
    /// the walk; a document that exists but cannot be read or parsed aborts,
    /// so a broken nearer policy can never fall through to a more permissive
    /// ancestor.
    async fn find_nearest(&self, resource: &str) -> WacResult<NearestPolicy> {
        let candidates = possible_acl_urls(resource, &self.suffix);
        for (index, acl_url) in candidates.iter().enumerate() {
            debug!("checking for policy at {}", acl_url);
            match self.fetcher.fetch(acl_url).await {
                Ok(graph) => {
                    let entries = Authorization::scan(&graph);
                    debug!("found policy {} with {} entries", acl_url, entries.len());
                    let container_url =
                        acl_url[..acl_url.len() - self.suffix.len()].to_string();
                    return Ok(NearestPolicy {
                        acl_url: acl_url.clone(),
                        container_url,
                        direct: index == 0,
                        entries,
                    });
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    warn!("aborting policy walk at {}: {}", acl_url, err);
                    return Err(WacError::PolicyUnreadable(format!("{}: {}", acl_url, err)));
                }
            }
        }
        Err(WacError::PolicyMissing(resource.to_string()))
    }

    // An entry listing origins applies when the request's
    // Origin matches; with strict enforcement off, unlisted origins are
    // tolerated for same-origin and explicitly trusted origins only. A
    // request without an Origin header is same-origin by definition.
    fn origin_applicable(&self, entry_origins: &[String]) -> bool {
        if entry_origins.is_empty() {
            return true;
        }
        let origin = match self.origin.as_deref() {
            Some(origin) => origin,
            None => return true,
        };
        if entry_origins.iter().any(|listed| listed == origin) {
            return true;
        }
        if self.strict_origin {
            debug!("origin {} not listed, strict enforcement denies", origin);
            return false;
        }
        self.is_same_or_trusted_origin(origin)
    }

    fn is_same_or_trusted_origin(&self, origin: &str) -> bool {
        if let Ok(parsed) = Url::parse(&self.resource) {
            if parsed.origin().ascii_serialization() == origin {
                return true;
            }
        }
        self.trusted_origins
            .iter()
            .any(|trusted| trusted.trim_end_matches('/') == origin.trim_end_matches('/'))
    }

    async fn entry_grants(&self, entry: &Authorization, user: Option<&str>) -> bool {
        if entry.public {
            return true;
        }
        let user = match user {
            Some(user) => user,
            None => return false,
        };
        if entry.agents.contains(user) {
            return true;
        }
        for group in &entry.agent_groups {
            if let Some(members) = self.group_members(group).await {
                if members.contains(user) {
                    debug!("{} listed as member of group {}", user, group);
                    return true;
                }
            }
        }
        false
    }

    /// Members of a group document, fetched once per checker lifetime. A
    /// group that cannot be fetched or parsed means "no membership", never
    /// a failed evaluation.
    async fn group_members(&self, group_url: &str) -> Option<HashSet<String>> {
        let cell = {
            let mut groups = self.groups.lock().await;
            groups
                .entry(group_url.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        cell.get_or_init(|| async { self.fetch_group_members(group_url).await })
            .await
            .clone()
    }

    async fn fetch_group_members(&self, group_url: &str) -> Option<HashSet<String>> {
        let document_url = match group_url.find('#') {
            Some(idx) => &group_url[..idx],
            None => group_url,
        };
        let graph = match self.fetcher.fetch(document_url).await {
            Ok(graph) => graph,
            Err(err) => {
                warn!("treating group {} as empty: {}", group_url, err);
                return None;
            }
        };
        let group = match NamedNode::new(group_url) {
            Ok(group) => group,
            Err(err) => {
                warn!("bad group uri {}: {}", group_url, err);
                return None;
            }
        };
        let mut members = HashSet::new();
        for predicate in [vocab::foaf::MEMBER, vocab::vcard::HAS_MEMBER] {
            for object in graph.objects_for_subject_predicate(&group, predicate) {
                if let TermRef::NamedNode(member) = object {
                    members.insert(member.as_str().to_string());
                }
            }
        }
        Some(members)
    }
}

/// Ordered policy candidates for a resource: its own policy location first,
/// then each ancestor directory's, nearest first, root last.
fn possible_acl_urls(resource: &str, suffix: &str) -> Vec<String> {
    let parsed = match Url::parse(resource) {
        Ok(parsed) => parsed,
        Err(_) => return vec![format!("{}{}", resource, suffix)],
    };
    // Rebuilding from origin + path normalizes a bare-origin resource to its
    // root form, so "http://h" walks to "http://h/.acl" rather than the
    // nonsense candidate "http://h.acl".
    let base = parsed.origin().ascii_serialization();
    let mut urls = vec![format!("{}{}{}", base, parsed.path(), suffix)];
    let mut path = parsed.path().trim_end_matches('/').to_string();
    while let Some(idx) = path.rfind('/') {
        path.truncate(idx);
        urls.push(format!("{}{}/{}", base, path, suffix));
        if path.is_empty() {
            break;
        }
    }
    urls
}
