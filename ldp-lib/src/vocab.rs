//! IRI constants for the vocabularies the server speaks.

pub use oxrdf::vocab::{rdf, xsd};

pub mod ldp {
    use oxrdf::NamedNodeRef;

    pub const RESOURCE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/ldp#Resource");
    pub const CONTAINER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/ldp#Container");
    pub const BASIC_CONTAINER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/ldp#BasicContainer");
    pub const CONTAINS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/ldp#contains");

    pub const NS: &str = "http://www.w3.org/ns/ldp#";
}

pub mod acl {
    use oxrdf::NamedNodeRef;

    pub const MODE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#mode");
    pub const AGENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#agent");
    pub const AGENT_CLASS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#agentClass");
    pub const AGENT_GROUP: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#agentGroup");
    pub const ACCESS_TO: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#accessTo");
    pub const DEFAULT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#default");
    pub const DEFAULT_FOR_NEW: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#defaultForNew");
    pub const ORIGIN: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#origin");

    pub const READ: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Read");
    pub const WRITE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Write");
    pub const APPEND: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Append");
    pub const CONTROL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Control");
}

pub mod foaf {
    use oxrdf::NamedNodeRef;

    /// The "everyone" agent class, authenticated or not.
    pub const AGENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://xmlns.com/foaf/0.1/Agent");
    pub const MEMBER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://xmlns.com/foaf/0.1/member");
}

pub mod vcard {
    use oxrdf::NamedNodeRef;

    pub const HAS_MEMBER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#hasMember");
}

pub mod stat {
    use oxrdf::NamedNodeRef;

    pub const MTIME: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/posix/stat#mtime");
    pub const SIZE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/posix/stat#size");
}
