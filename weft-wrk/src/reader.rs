//  READER.rs
//    by Lut99
//
//  Created:
//    27 Jan 2025, 10:05:12
//  Last edited:
//    22 Jun 2026, 12:04:40
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the metadata reader that discovers workflow and activity
//!   entry points on user-declared types. The primary source is the
//!   structured attribute records a type carries; a legacy reader can
//!   additionally scrape `@`-style markers out of doc strings, with the
//!   attribute reader taking precedence.
//

use log::debug;

pub use crate::errors::ReaderError as Error;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    /// Builds the metadata of a workflow type with one signal and one query member.
    fn greeter_info() -> TypeInfo {
        TypeInfo::new("Greeter")
            .with_attr(Attribute::new("workflow", Some("Greeter")))
            .with_member(MemberInfo::new("set_name").with_attr(Attribute::new("signal", Some("setName"))).with_param("name"))
            .with_member(MemberInfo::new("greeting").with_attr(Attribute::new("query", None)))
    }


    #[test]
    fn test_attribute_reader() {
        let defs: Vec<HandlerDef> = AttributeReader.read(&greeter_info()).unwrap();
        assert_eq!(defs.len(), 3);
        assert_eq!((defs[0].kind, defs[0].name.as_str()), (HandlerKind::Workflow, "Greeter"));
        assert_eq!((defs[1].kind, defs[1].name.as_str(), defs[1].params.as_slice()), (HandlerKind::Signal, "setName", &["name".to_string()][..]));
        // An attribute without an argument falls back to the member name
        assert_eq!((defs[2].kind, defs[2].name.as_str()), (HandlerKind::Query, "greeting"));
    }

    #[test]
    fn test_reserved_names_are_suppressed() {
        let info: TypeInfo = TypeInfo::new("Config")
            .with_attr(Attribute::new("workflow", None))
            .with_member(MemberInfo::new("flag").with_attr(Attribute::new("readonly", None)));
        let defs: Vec<HandlerDef> = AttributeReader.read(&info).unwrap();
        // The `readonly` marker never becomes a handler
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, HandlerKind::Workflow);
    }

    #[test]
    fn test_attribute_reader_rejects_bad_metadata() {
        let empty: TypeInfo = TypeInfo::new("Nothing");
        assert!(matches!(AttributeReader.read(&empty), Err(Error::NoHandlers { .. })));

        let twice: TypeInfo = TypeInfo::new("Twice")
            .with_attr(Attribute::new("workflow", Some("Same")))
            .with_member(MemberInfo::new("run").with_attr(Attribute::new("signal", Some("Same"))));
        assert!(matches!(AttributeReader.read(&twice), Err(Error::DuplicateHandler { .. })));

        let unnamed: TypeInfo = TypeInfo::new("Unnamed").with_member(MemberInfo::new("run").with_attr(Attribute::new("signal", Some(""))));
        assert!(matches!(AttributeReader.read(&unnamed), Err(Error::EmptyName { .. })));
    }

    #[test]
    fn test_annotation_reader() {
        let info: TypeInfo = TypeInfo::new("LegacyGreeter")
            .with_docs("A workflow from before structured attributes existed.\n@Workflow(LegacyGreeter)")
            .with_member(MemberInfo::new("set_name").with_docs("@Signal(setName)").with_param("name"))
            .with_member(MemberInfo::new("greeting").with_docs("@Query"));

        let defs: Vec<HandlerDef> = AnnotationReader.read(&info).unwrap();
        assert_eq!(defs.len(), 3);
        assert_eq!((defs[0].kind, defs[0].name.as_str()), (HandlerKind::Workflow, "LegacyGreeter"));
        assert_eq!((defs[1].kind, defs[1].name.as_str()), (HandlerKind::Signal, "setName"));
        assert_eq!((defs[2].kind, defs[2].name.as_str()), (HandlerKind::Query, "greeting"));
    }

    #[test]
    fn test_selective_reader_prefers_attributes() {
        // Attributes and annotations disagree; the attributes win
        let info: TypeInfo = TypeInfo::new("Both").with_attr(Attribute::new("workflow", Some("FromAttribute"))).with_docs("@Workflow(FromAnnotation)");
        let defs: Vec<HandlerDef> = SelectiveReader::new().read(&info).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "FromAttribute");

        // Without attributes, the annotations are the fallback
        let info: TypeInfo = TypeInfo::new("LegacyOnly").with_docs("@Workflow(FromAnnotation)");
        let defs: Vec<HandlerDef> = SelectiveReader::new().read(&info).unwrap();
        assert_eq!(defs[0].name, "FromAnnotation");
    }
}





/***** CONSTANTS *****/
/// Attribute/annotation names that are suppressed at the global ignore level, to avoid
/// collisions with type-system keywords.
pub const IGNORED_NAMES: [&str; 1] = ["readonly"];

/// The attribute (and annotation) name marking a workflow entry point.
const ATTR_WORKFLOW: &str = "workflow";
/// The attribute (and annotation) name marking an activity entry point.
const ATTR_ACTIVITY: &str = "activity";
/// The attribute (and annotation) name marking a signal handler member.
const ATTR_SIGNAL: &str = "signal";
/// The attribute (and annotation) name marking a query handler member.
const ATTR_QUERY: &str = "query";





/***** AUXILLARY *****/
/// A single structured attribute on a type or member.
#[derive(Clone, Debug)]
pub struct Attribute {
    /// The attribute's name (e.g., `workflow`).
    pub name: String,
    /// The attribute's argument, if it has one (e.g., the registered handler name).
    pub arg:  Option<String>,
}
impl Attribute {
    /// Constructor for the Attribute.
    #[inline]
    pub fn new(name: impl Into<String>, arg: Option<&str>) -> Self { Self { name: name.into(), arg: arg.map(String::from) } }
}



/// The metadata of one member of a user-declared type.
#[derive(Clone, Debug)]
pub struct MemberInfo {
    /// The member's own name.
    pub name:   String,
    /// The structured attributes on the member.
    pub attrs:  Vec<Attribute>,
    /// The member's doc string (scraped by the legacy annotation reader).
    pub docs:   String,
    /// The member's parameter names, in declaration order.
    pub params: Vec<String>,
}
impl MemberInfo {
    /// Constructor for the MemberInfo.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), attrs: vec![], docs: String::new(), params: vec![] } }

    /// Adds a structured attribute to this member.
    #[inline]
    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Replaces this member's doc string.
    #[inline]
    pub fn with_docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = docs.into();
        self
    }

    /// Adds a parameter name to this member.
    #[inline]
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }
}



/// The metadata of a user-declared type.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    /// The type's own name.
    pub name:    String,
    /// The structured attributes on the type itself.
    pub attrs:   Vec<Attribute>,
    /// The type's doc string (scraped by the legacy annotation reader).
    pub docs:    String,
    /// The type's members, in declaration order.
    pub members: Vec<MemberInfo>,
}
impl TypeInfo {
    /// Constructor for the TypeInfo.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), attrs: vec![], docs: String::new(), members: vec![] } }

    /// Adds a structured attribute to this type.
    #[inline]
    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Replaces this type's doc string.
    #[inline]
    pub fn with_docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = docs.into();
        self
    }

    /// Adds a member to this type.
    #[inline]
    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }
}



/// Lets a user-declared type expose its own metadata to the reader.
pub trait Describe {
    /// Returns the metadata of this type.
    fn type_info() -> TypeInfo;
}



/// The kinds of entry points a reader can discover.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandlerKind {
    /// A workflow entry point (the whole type).
    Workflow,
    /// An activity entry point (the whole type).
    Activity,
    /// A signal handler member.
    Signal,
    /// A query handler member.
    Query,
}



/// A discovered entry point: its kind, registered name and parameter metadata.
#[derive(Clone, Debug)]
pub struct HandlerDef {
    /// What kind of entry point this is.
    pub kind:   HandlerKind,
    /// The name the entry point is registered under.
    pub name:   String,
    /// The member carrying the handler, if it is member-scoped.
    pub member: Option<String>,
    /// The handler's parameter names, in declaration order.
    pub params: Vec<String>,
}





/***** HELPER FUNCTIONS *****/
/// Maps an attribute/annotation name to a handler kind, if it is one.
fn kind_of(name: &str) -> Option<HandlerKind> {
    match name {
        ATTR_WORKFLOW => Some(HandlerKind::Workflow),
        ATTR_ACTIVITY => Some(HandlerKind::Activity),
        ATTR_SIGNAL => Some(HandlerKind::Signal),
        ATTR_QUERY => Some(HandlerKind::Query),
        _ => None,
    }
}

/// Validates a freshly collected definition list: at least one handler, no duplicates.
fn check(type_name: &str, defs: Vec<HandlerDef>) -> Result<Vec<HandlerDef>, Error> {
    if defs.is_empty() {
        return Err(Error::NoHandlers { type_name: type_name.into() });
    }
    for (i, def) in defs.iter().enumerate() {
        if defs[..i].iter().any(|other| other.name == def.name) {
            return Err(Error::DuplicateHandler { type_name: type_name.into(), name: def.name.clone() });
        }
    }
    Ok(defs)
}

/// Resolves the registered name of a handler: the attribute argument if given, or else the
/// carrier's own name.
fn resolve_name(type_name: &str, carrier: &str, arg: Option<&str>) -> Result<String, Error> {
    match arg {
        Some(name) if name.is_empty() => Err(Error::EmptyName { type_name: type_name.into(), member: carrier.into() }),
        Some(name) => Ok(name.into()),
        None => Ok(carrier.into()),
    }
}





/***** LIBRARY *****/
/// Maps the metadata of a user-declared type to the entry points it declares.
pub trait Reader: Send + Sync {
    /// Reads the entry points out of the given type metadata.
    ///
    /// # Arguments
    /// - `info`: The [`TypeInfo`] to examine.
    ///
    /// # Returns
    /// The discovered [`HandlerDef`]s: type-scoped ones first, then member-scoped ones in
    /// declaration order.
    ///
    /// # Errors
    /// This function errors if the metadata declares nothing, or declares it inconsistently.
    fn read(&self, info: &TypeInfo) -> Result<Vec<HandlerDef>, Error>;
}



/// The primary reader: examines the structured [`Attribute`] records of a type.
pub struct AttributeReader;
impl Reader for AttributeReader {
    fn read(&self, info: &TypeInfo) -> Result<Vec<HandlerDef>, Error> {
        let mut defs: Vec<HandlerDef> = Vec::new();

        // Type-scoped attributes first
        for attr in &info.attrs {
            if IGNORED_NAMES.contains(&attr.name.as_str()) {
                debug!("Ignoring reserved attribute '{}' on type '{}'", attr.name, info.name);
                continue;
            }
            if let Some(kind) = kind_of(&attr.name) {
                defs.push(HandlerDef { kind, name: resolve_name(&info.name, &info.name, attr.arg.as_deref())?, member: None, params: vec![] });
            }
        }

        // Then the members, in declaration order
        for member in &info.members {
            for attr in &member.attrs {
                if IGNORED_NAMES.contains(&attr.name.as_str()) {
                    debug!("Ignoring reserved attribute '{}' on member '{}::{}'", attr.name, info.name, member.name);
                    continue;
                }
                if let Some(kind) = kind_of(&attr.name) {
                    defs.push(HandlerDef {
                        kind,
                        name: resolve_name(&info.name, &member.name, attr.arg.as_deref())?,
                        member: Some(member.name.clone()),
                        params: member.params.clone(),
                    });
                }
            }
        }

        check(&info.name, defs)
    }
}



/// The legacy reader: scrapes `@Workflow`-style markers out of doc strings. Kept for types that
/// predate the structured attribute records.
pub struct AnnotationReader;
impl AnnotationReader {
    /// Parses one doc string into `(name, argument)` annotation pairs.
    fn annotations(docs: &str) -> Vec<(String, Option<String>)> {
        let mut found: Vec<(String, Option<String>)> = Vec::new();
        for line in docs.lines() {
            let line: &str = line.trim();
            let Some(marker) = line.strip_prefix('@') else { continue };
            match marker.split_once('(') {
                Some((name, rest)) => {
                    let arg: &str = rest.strip_suffix(')').unwrap_or(rest);
                    found.push((name.to_lowercase(), Some(arg.to_string())));
                },
                None => found.push((marker.to_lowercase(), None)),
            }
        }
        found
    }
}
impl Reader for AnnotationReader {
    fn read(&self, info: &TypeInfo) -> Result<Vec<HandlerDef>, Error> {
        let mut defs: Vec<HandlerDef> = Vec::new();

        for (name, arg) in Self::annotations(&info.docs) {
            if IGNORED_NAMES.contains(&name.as_str()) {
                continue;
            }
            if let Some(kind) = kind_of(&name) {
                defs.push(HandlerDef { kind, name: resolve_name(&info.name, &info.name, arg.as_deref())?, member: None, params: vec![] });
            }
        }
        for member in &info.members {
            for (name, arg) in Self::annotations(&member.docs) {
                if IGNORED_NAMES.contains(&name.as_str()) {
                    continue;
                }
                if let Some(kind) = kind_of(&name) {
                    defs.push(HandlerDef {
                        kind,
                        name: resolve_name(&info.name, &member.name, arg.as_deref())?,
                        member: Some(member.name.clone()),
                        params: member.params.clone(),
                    });
                }
            }
        }

        check(&info.name, defs)
    }
}



/// The composed reader: prefers the structured attributes, falls back to the legacy annotations
/// for types that declare nothing through attributes. Engaged by the factory's
/// `legacy_annotations` option.
pub struct SelectiveReader {
    /// The primary reader.
    attributes:  AttributeReader,
    /// The fallback reader.
    annotations: AnnotationReader,
}
impl SelectiveReader {
    /// Constructor for the SelectiveReader.
    #[inline]
    pub fn new() -> Self { Self { attributes: AttributeReader, annotations: AnnotationReader } }
}
impl Reader for SelectiveReader {
    fn read(&self, info: &TypeInfo) -> Result<Vec<HandlerDef>, Error> {
        match self.attributes.read(info) {
            Ok(defs) => Ok(defs),
            Err(Error::NoHandlers { .. }) => self.annotations.read(info),
            Err(err) => Err(err),
        }
    }
}
impl Default for SelectiveReader {
    #[inline]
    fn default() -> Self { Self::new() }
}
