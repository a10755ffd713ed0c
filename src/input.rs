//! Input Sources and Entity Resolution
//!
//! An [`InputSource`] names a document or external entity and optionally
//! carries its content. Content is fetched through the embedder's
//! [`EntityResolver`] first; when it declines, the system identifier is
//! resolved against its base and read from the filesystem.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::core::chars::XmlVersion;
use crate::core::encoding::{self, XmlEncoding};
use crate::error::XmlError;

/// Where document or entity content comes from.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InputSource {
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Base against which a relative `system_id` is resolved.
    pub base_system_id: Option<String>,
    /// Raw bytes, decoded according to BOM and declaration.
    pub bytes: Option<Vec<u8>>,
    /// Already-decoded text; wins over `bytes`.
    pub text: Option<String>,
}

impl InputSource {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        InputSource {
            bytes: Some(bytes.into()),
            ..Default::default()
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        InputSource {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A source to be read from `system_id`.
    pub fn from_system_id(system_id: impl Into<String>) -> Self {
        InputSource {
            system_id: Some(system_id.into()),
            ..Default::default()
        }
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_system_id = Some(base.into());
        self
    }

    fn has_content(&self) -> bool {
        self.text.is_some() || self.bytes.is_some()
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource")
            .field("public_id", &self.public_id)
            .field("system_id", &self.system_id)
            .field("base_system_id", &self.base_system_id)
            .field("bytes", &self.bytes.as_ref().map(Vec::len))
            .field("text", &self.text.as_ref().map(String::len))
            .finish()
    }
}

/// Embedder callback mapping external identifiers to content.
///
/// Return `Ok(None)` to fall back to default resolution.
pub trait EntityResolver: Send + Sync {
    fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
        base_system_id: Option<&str>,
    ) -> Result<Option<InputSource>, XmlError>;
}

impl<F> EntityResolver for F
where
    F: Fn(Option<&str>, Option<&str>, Option<&str>) -> Result<Option<InputSource>, XmlError>
        + Send
        + Sync,
{
    fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
        base_system_id: Option<&str>,
    ) -> Result<Option<InputSource>, XmlError> {
        self(public_id, system_id, base_system_id)
    }
}

/// Decoded content ready for scanning.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub text: Arc<str>,
    /// Absolute identifier of the content, used as base for nested entities.
    pub system_id: Option<Arc<str>>,
    pub public_id: Option<String>,
    pub encoding: XmlEncoding,
    pub version: XmlVersion,
}

/// Resolve `system_id` against `base`.
///
/// Absolute URLs are returned unchanged. Relative identifiers are joined to
/// a URL base, or to the directory of a filesystem base.
pub fn expand_system_id(system_id: &str, base: Option<&str>) -> String {
    if Url::parse(system_id).is_ok() || Path::new(system_id).is_absolute() {
        return system_id.to_string();
    }
    match base {
        Some(base) => match Url::parse(base) {
            Ok(base_url) if !base_url.cannot_be_a_base() => base_url
                .join(system_id)
                .map(String::from)
                .unwrap_or_else(|_| system_id.to_string()),
            _ => Path::new(base)
                .parent()
                .map(|dir| dir.join(system_id))
                .unwrap_or_else(|| PathBuf::from(system_id))
                .to_string_lossy()
                .into_owned(),
        },
        None => system_id.to_string(),
    }
}

/// Read the bytes named by an expanded system identifier.
fn read_system_id(expanded: &str) -> Result<Vec<u8>, XmlError> {
    let path: Cow<'_, Path> = match Url::parse(expanded) {
        Ok(url) if url.scheme() == "file" => Cow::Owned(url.to_file_path().map_err(|_| {
            XmlError::io(
                expanded,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a local file URL"),
            )
        })?),
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => {
            return Err(XmlError::io(
                expanded,
                std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    format!("unsupported URL scheme '{}'", url.scheme()),
                ),
            ))
        }
        _ => Cow::Borrowed(Path::new(expanded)),
    };
    tracing::debug!(path = %path.display(), "reading external source");
    std::fs::read(&path).map_err(|e| XmlError::io(expanded, e))
}

/// Turn a source into scannable text.
///
/// Decodes bytes, normalizes line ends for the sniffed XML version and
/// records the absolute system identifier.
pub fn load(source: InputSource) -> Result<LoadedSource, XmlError> {
    let expanded = source
        .system_id
        .as_deref()
        .map(|id| expand_system_id(id, source.base_system_id.as_deref()));

    let (text, encoding) = match (source.text, source.bytes) {
        (Some(text), _) => {
            let text = text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text);
            (text, XmlEncoding::Utf8)
        }
        (None, Some(bytes)) => encoding::decode(bytes).map_err(XmlError::Encoding)?,
        (None, None) => match &expanded {
            Some(id) => encoding::decode(read_system_id(id)?).map_err(XmlError::Encoding)?,
            None => {
                return Err(XmlError::structural(
                    "input source has no content and no system identifier",
                ))
            }
        },
    };

    let version = encoding::sniff_version(&text);
    let normalized = match version.normalize_line_ends(&text) {
        Cow::Borrowed(_) => None,
        Cow::Owned(normalized) => Some(normalized),
    };
    let text: Arc<str> = Arc::from(normalized.unwrap_or(text));

    Ok(LoadedSource {
        text,
        system_id: expanded.map(Arc::from),
        public_id: source.public_id,
        encoding,
        version,
    })
}

/// Resolves external identifiers for one parse.
#[derive(Clone, Default)]
pub struct Resolution {
    resolver: Option<Arc<dyn EntityResolver>>,
}

impl Resolution {
    pub fn new(resolver: Option<Arc<dyn EntityResolver>>) -> Self {
        Resolution { resolver }
    }

    /// Locate and load an external entity.
    pub fn open(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
        base_system_id: Option<&str>,
    ) -> Result<LoadedSource, XmlError> {
        let resolved = match &self.resolver {
            Some(r) => r.resolve_entity(public_id, system_id, base_system_id)?,
            None => None,
        };

        let source = match resolved {
            Some(mut source) if source.has_content() || source.system_id.is_some() => {
                if source.system_id.is_none() {
                    source.system_id = system_id.map(str::to_string);
                }
                if source.base_system_id.is_none() {
                    source.base_system_id = base_system_id.map(str::to_string);
                }
                source
            }
            _ => {
                let system_id = system_id.ok_or_else(|| {
                    XmlError::structural("external entity has no system identifier")
                })?;
                InputSource {
                    public_id: public_id.map(str::to_string),
                    system_id: Some(system_id.to_string()),
                    base_system_id: base_system_id.map(str::to_string),
                    bytes: None,
                    text: None,
                }
            }
        };

        tracing::debug!(?public_id, ?system_id, "resolving external entity");
        load(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_relative_url() {
        assert_eq!(
            expand_system_id("b.dtd", Some("http://example.com/dir/a.xml")),
            "http://example.com/dir/b.dtd"
        );
    }

    #[test]
    fn test_expand_absolute_unchanged() {
        assert_eq!(
            expand_system_id("file:///x/y.dtd", Some("http://example.com/a.xml")),
            "file:///x/y.dtd"
        );
    }

    #[test]
    fn test_expand_relative_path() {
        let expanded = expand_system_id("b.dtd", Some("dir/a.xml"));
        assert_eq!(Path::new(&expanded), Path::new("dir").join("b.dtd"));
        assert_eq!(expand_system_id("b.dtd", None), "b.dtd");
    }

    #[test]
    fn test_load_normalizes_line_ends() {
        let loaded = load(InputSource::from_bytes(b"<r>\r\na</r>".to_vec())).unwrap();
        assert_eq!(&*loaded.text, "<r>\na</r>");
        assert_eq!(loaded.version, XmlVersion::V1_0);
    }

    #[test]
    fn test_load_strips_text_bom() {
        let loaded = load(InputSource::from_text("\u{feff}<r/>")).unwrap();
        assert_eq!(&*loaded.text, "<r/>");
    }

    #[test]
    fn test_load_without_content_or_id_fails() {
        assert!(matches!(load(InputSource::default()), Err(XmlError::Structural(_))));
    }

    #[test]
    fn test_resolver_supplies_content() {
        let resolver: Arc<dyn EntityResolver> = Arc::new(
            |_: Option<&str>,
             system_id: Option<&str>,
             _: Option<&str>|
             -> Result<Option<InputSource>, XmlError> {
                Ok(match system_id {
                    Some("mem.ent") => Some(InputSource::from_text("hello")),
                    _ => None,
                })
            },
        );
        let resolution = Resolution::new(Some(resolver));
        let loaded = resolution.open(None, Some("mem.ent"), Some("file:///d/doc.xml")).unwrap();
        assert_eq!(&*loaded.text, "hello");
        assert_eq!(loaded.system_id.as_deref(), Some("file:///d/mem.ent"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let resolution = Resolution::default();
        let err = resolution
            .open(None, Some("definitely-missing-file.dtd"), None)
            .unwrap_err();
        assert!(matches!(err, XmlError::Io { .. }));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = Resolution::default()
            .open(None, Some("http://example.com/x.dtd"), None)
            .unwrap_err();
        assert!(matches!(err, XmlError::Io { .. }));
    }
}
