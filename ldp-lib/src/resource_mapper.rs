use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::{LdpConfig, LdpError, LdpResult};

// Characters escaped when a filesystem name becomes a URL path. The decoded
// form must survive the encode/decode round trip byte for byte.
const URL_PATH_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'%');

pub(crate) fn encode_url_path(path: &str) -> String {
    utf8_percent_encode(path, URL_PATH_ENCODE).to_string()
}

/// Result of mapping a URL to a backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedFile {
    pub path: PathBuf,
    pub content_type: String,
}

/// Result of mapping a backing file to its public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedUrl {
    pub url: String,
    pub content_type: String,
}

/// Maintains the mapping between public URLs and server filenames.
///
/// All components go through this one type; nothing else in the codebase is
/// allowed to know how slugs, index files and `$.<ext>` disambiguation
/// markers translate to disk names.
pub struct ResourceMapper {
    root_url: String,
    root_path: String,
    include_host: bool,
    // Pre-split from root_url when include_host is set.
    protocol: String,
    port: String,
    default_content_type: String,
    index_filename: String,
    index_content_type: String,
    type_overrides: HashMap<String, String>,
    extension_overrides: HashMap<String, String>,
}

impl ResourceMapper {
    pub fn new(config: &LdpConfig) -> LdpResult<Self> {
        let mut type_overrides = HashMap::new();
        for ext in [
            config.suffix_acl.trim_start_matches('.'),
            config.suffix_meta.trim_start_matches('.'),
            "ttl",
        ] {
            type_overrides.insert(ext.to_string(), "text/turtle".to_string());
        }
        let mut extension_overrides = HashMap::new();
        extension_overrides.insert("text/turtle".to_string(), "ttl".to_string());

        let (root_url, protocol, port) = if config.include_host {
            let parsed = Url::parse(&config.root_url)
                .map_err(|e| LdpError::InvalidParam(format!("bad root url: {}", e)))?;
            let port = match parsed.port() {
                Some(p) => format!(":{}", p),
                None => String::new(),
            };
            (
                remove_trailing_slash(parsed.path()),
                format!("{}:", parsed.scheme()),
                port,
            )
        } else {
            (remove_trailing_slash(&config.root_url), String::new(), String::new())
        };

        let mut mapper = Self {
            root_url,
            root_path: remove_trailing_slash(&config.root_path),
            include_host: config.include_host,
            protocol,
            port,
            default_content_type: config.default_content_type.clone(),
            index_filename: config.index_filename.clone(),
            index_content_type: String::new(),
            type_overrides,
            extension_overrides,
        };
        mapper.index_content_type = mapper.content_type_by_extension(&mapper.index_filename);
        Ok(mapper)
    }

    /// Public URL for a path relative to the server root.
    pub fn resolve_url(&self, hostname: &str, pathname: &str) -> String {
        if !self.include_host {
            format!("{}{}", self.root_url, pathname)
        } else {
            format!(
                "{}//{}{}{}{}",
                self.protocol, hostname, self.port, self.root_url, pathname
            )
        }
    }

    /// Filesystem path for a file path relative to the server root.
    pub fn resolve_file_path(&self, hostname: &str, file_path: &str) -> String {
        if !self.include_host {
            format!("{}{}", self.root_path, file_path)
        } else {
            format!("{}/{}{}", self.root_path, hostname, file_path)
        }
    }

    /// Whether a URL names a resource served from this root.
    pub fn owns_url(&self, url: &str) -> bool {
        if !self.include_host {
            return url == self.root_url || url.starts_with(&format!("{}/", self.root_url));
        }
        match Url::parse(url) {
            Ok(parsed) => {
                let port = match parsed.port() {
                    Some(p) => format!(":{}", p),
                    None => String::new(),
                };
                format!("{}:", parsed.scheme()) == self.protocol && port == self.port
            }
            Err(_) => false,
        }
    }

    /// Maps a resource URL and representation format to a server file.
    ///
    /// With `create_if_not_exists` the returned path is where a new
    /// representation must be stored; otherwise the parent directory is
    /// scanned for an existing representation of the slug.
    pub async fn map_url_to_file(
        &self,
        url: &str,
        content_type: Option<&str>,
        create_if_not_exists: bool,
    ) -> LdpResult<MappedFile> {
        let parsed = Url::parse(url)
            .map_err(|e| LdpError::InvalidParam(format!("bad url {}: {}", url, e)))?;
        let hostname = parsed.host_str().unwrap_or("").to_string();
        // Url::parse resolves dot segments away; a traversal attempt must be
        // rejected rather than silently normalized, so decode the raw path.
        let pathname = percent_decode_str(raw_url_path(url))
            .decode_utf8()
            .map_err(|e| LdpError::InvalidPath(format!("{}: {}", url, e)))?
            .to_string();
        if pathname.split('/').any(|segment| segment == "..") {
            return Err(LdpError::InvalidPath(format!(
                "disallowed .. segment in {}",
                url
            )));
        }

        let file_path = self.resolve_file_path(&hostname, &pathname);
        let is_index = file_path.ends_with('/');

        if create_if_not_exists {
            let mut path = file_path;
            if is_index {
                let requested = content_type.ok_or_else(|| {
                    LdpError::InvalidParam("container index needs a content type".to_string())
                })?;
                if requested != self.index_content_type {
                    return Err(LdpError::ContentTypeMismatch(format!(
                        "index file needs {} as content type, got {}",
                        self.index_content_type, requested
                    )));
                }
                path.push_str(&self.index_filename);
            }
            // Two representations of one slug must never share a filename,
            // and the stored name alone must recover the content type.
            if let Some(requested) = content_type {
                if self.content_type_by_extension(&path) != requested {
                    let marker = match self.extension_for(requested) {
                        Some(ext) => format!("$.{}", ext),
                        None => "$.unknown".to_string(),
                    };
                    path.push_str(&marker);
                }
            }
            let content_type = content_type
                .unwrap_or(&self.default_content_type)
                .to_string();
            debug!("mapped {} for writing to {}", url, path);
            return Ok(MappedFile {
                path: PathBuf::from(path),
                content_type,
            });
        }

        // Existing-file lookup: scan the folder for a name whose
        // dollar-stripped form equals the requested slug.
        let filename = match file_path.rfind('/') {
            Some(idx) => file_path[idx + 1..].to_string(),
            None => file_path.clone(),
        };
        let folder = file_path[..file_path.len() - filename.len()].to_string();
        let names = read_dir_names(&folder).await?;

        let matched = if !is_index {
            names
                .iter()
                .find(|name| strip_dollar_extension(name) == filename)
                .cloned()
        } else if names.iter().any(|name| *name == self.index_filename) {
            Some(self.index_filename.clone())
        } else {
            // No index file: fall back to the directory itself.
            Some(String::new())
        };
        let matched = matched.ok_or_else(|| {
            LdpError::NotFound(format!("resource not found: {}", pathname))
        })?;

        let content_type = self.content_type_by_extension(&matched);
        Ok(MappedFile {
            path: PathBuf::from(format!("{}{}", folder, matched)),
            content_type,
        })
    }

    /// Maps a server file back to its public URL.
    pub fn map_file_to_url(&self, path: &Path, hostname: Option<&str>) -> LdpResult<MappedUrl> {
        let path = path
            .to_str()
            .ok_or_else(|| LdpError::InvalidParam(format!("non-utf8 path: {:?}", path)))?
            .replace('\\', "/");
        // The prefix match must end on a path boundary, or "/data" would
        // claim "/database/x".
        let mut rel = match path.strip_prefix(&self.root_path) {
            Some(rel) if rel.is_empty() || rel.starts_with('/') => rel.to_string(),
            _ => {
                return Err(LdpError::InvalidParam(format!(
                    "path outside server root {}: {}",
                    self.root_path, path
                )))
            }
        };
        let hostname = hostname.unwrap_or("");
        if self.include_host {
            let prefix = format!("/{}/", hostname);
            if !rel.starts_with(&prefix) {
                return Err(LdpError::InvalidParam(format!(
                    "path must start with hostname (/{}): {}",
                    hostname, rel
                )));
            }
            rel = rel[prefix.len() - 1..].to_string();
        }

        let pathname = strip_dollar_extension(&rel);
        let url = format!("{}{}", self.resolve_url(hostname, ""), encode_url_path(pathname));
        let content_type = self.content_type_by_extension(&rel);
        Ok(MappedUrl { url, content_type })
    }

    /// Expected content type for the extension of a path, falling back to
    /// the configured default.
    pub fn content_type_by_extension(&self, path: &str) -> String {
        self.known_content_type_by_extension(path)
            .unwrap_or_else(|| self.default_content_type.clone())
    }

    fn known_content_type_by_extension(&self, path: &str) -> Option<String> {
        let idx = path.rfind('.')?;
        let ext = &path[idx + 1..];
        if ext.is_empty() || ext.contains('/') {
            return None;
        }
        let ext = ext.to_lowercase();
        if let Some(content_type) = self.type_overrides.get(&ext) {
            return Some(content_type.clone());
        }
        mime_guess::from_ext(&ext).first_raw().map(str::to_string)
    }

    fn extension_for(&self, content_type: &str) -> Option<String> {
        if let Some(ext) = self.extension_overrides.get(content_type) {
            return Some(ext.clone());
        }
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    }
}

// Path portion of an absolute URL as written, query and fragment removed,
// dot segments left alone.
fn raw_url_path(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    };
    match path.find(|c| c == '?' || c == '#') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

async fn read_dir_names(folder: &str) -> LdpResult<Vec<String>> {
    let mut dir = tokio::fs::read_dir(folder).await?;
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn remove_trailing_slash(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

// "index$.html" becomes "index"; a stray '$' after the marker disables it.
fn strip_dollar_extension(path: &str) -> &str {
    if let Some(idx) = path.rfind("$.") {
        if !path[idx + 2..].contains('$') {
            return &path[..idx];
        }
    }
    path
}
