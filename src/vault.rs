use std::{path::Path, sync::Arc};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::{
    config::CorpusConfig,
    error::Result,
    index::{FileIndex, VaultIndex},
    messages::{Message, MessageSink, Severity, report},
};

/// Characters escaped inside one URL path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// One corpus: its documents, its policy and where its diagnostics go.
pub struct Vault {
    name: String,
    index: Arc<dyn FileIndex>,
    config: CorpusConfig,
    sink: Arc<dyn MessageSink>,
}

impl Vault {
    pub fn new(
        name: impl Into<String>,
        index: Arc<dyn FileIndex>,
        config: CorpusConfig,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            config,
            sink,
        }
    }

    /// Index the directory named by `config.path`.
    pub fn open(
        name: impl Into<String>,
        config: CorpusConfig,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self> {
        let index = VaultIndex::open(&config.path)?;
        Ok(Self::new(name, Arc::new(index), config, sink))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    pub fn index(&self) -> &dyn FileIndex {
        self.index.as_ref()
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn strict_definitions(&self) -> bool {
        self.config.strict_on_definition_parse
    }

    pub fn strict_fields(&self) -> bool {
        self.config.strict_on_field_eval
    }

    pub fn sink(&self) -> &dyn MessageSink {
        self.sink.as_ref()
    }

    /// Send a diagnostic for this corpus, also writing it to the log.
    pub fn notify(
        &self,
        severity: Severity,
        text: impl Into<String>,
        details: impl Into<String>,
    ) {
        self.notify_with(severity, text, details, true);
    }

    pub fn notify_with(
        &self,
        severity: Severity,
        text: impl Into<String>,
        details: impl Into<String>,
        use_log: bool,
    ) {
        let message =
            Message::new(text, severity, &self.name).with_details(details);
        report(self.sink.as_ref(), message, use_log);
    }

    /// URL of the rendered page for a corpus-relative document path.
    pub fn render_url(&self, relative: &Path) -> String {
        let encoded: Vec<String> = relative
            .iter()
            .map(|part| {
                utf8_percent_encode(&part.to_string_lossy(), SEGMENT)
                    .to_string()
            })
            .collect();
        format!("/renderer/{}/{}", self.name, encoded.join("/"))
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("name", &self.name)
            .field("root", &self.index.root())
            .field("config", &self.config)
            .finish()
    }
}
