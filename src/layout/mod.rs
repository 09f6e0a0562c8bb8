//! Repository layouts
//!
//! A layout describes where a module's artifacts live inside a repository:
//! - `maven-2-default`, `ivy-default` and `gradle-default` are built in
//! - custom layouts come from `[[layouts]]` in the configuration
//!
//! Parsing a path against its repository's layout yields a `ModuleInfo`,
//! which decides release vs integration handling, cache expirability and
//! latest-version matching.

mod pattern;
pub mod version;

pub use pattern::{IntegrationRegexes, LayoutPattern, Token, TokenValues};
pub use version::{compare_versions, MavenVersion};

use crate::config::schema::LayoutConfig;
use crate::error::{DepotError, DepotResult};
use crate::resource::split_checksum_path;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Name prefix of derived Maven metadata files
pub const MAVEN_METADATA_PREFIX: &str = "maven-metadata";

/// Placeholder for the latest release version
pub const RELEASE_PLACEHOLDER: &str = "[RELEASE]";

/// Placeholder for the latest integration version
pub const INTEGRATION_PLACEHOLDER: &str = "[INTEGRATION]";

/// File integration revision of a non-unique snapshot
pub const NON_UNIQUE_REVISION: &str = "SNAPSHOT";

/// Whether a file name is Maven metadata (`maven-metadata.xml`,
/// `maven-metadata-local.xml`, ...)
pub fn is_metadata_name(name: &str) -> bool {
    name.starts_with(MAVEN_METADATA_PREFIX) && name.ends_with(".xml")
}

/// Module/version coordinate of an artifact path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub organization: String,
    pub module: String,
    pub base_revision: String,
    pub folder_integration_revision: String,
    pub file_integration_revision: String,
    pub classifier: String,
    pub ext: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ModuleInfo {
    fn from_tokens(mut values: TokenValues, file_name: &str) -> Option<Self> {
        let mut take = |token: Token| values.remove(&token).unwrap_or_default();

        let org_path = take(Token::OrgPath);
        let mut organization = take(Token::Org);
        if organization.is_empty() {
            organization = org_path.replace('/', ".");
        }

        let mut info = Self {
            organization,
            module: take(Token::Module),
            base_revision: take(Token::BaseRev),
            folder_integration_revision: take(Token::FolderItegRev),
            file_integration_revision: take(Token::FileItegRev),
            classifier: take(Token::Classifier),
            ext: take(Token::Ext),
            kind: take(Token::Type),
        };
        if info.ext.is_empty() {
            if let Some((_, ext)) = file_name.rsplit_once('.') {
                info.ext = ext.to_string();
            }
        }

        (!info.module.is_empty() && !info.base_revision.is_empty()).then_some(info)
    }

    /// Integration (snapshot) artifact
    pub fn is_integration(&self) -> bool {
        !self.folder_integration_revision.is_empty() || !self.file_integration_revision.is_empty()
    }

    /// The integration revision that identifies this file
    pub fn integration_revision(&self) -> &str {
        if self.file_integration_revision.is_empty() {
            &self.folder_integration_revision
        } else {
            &self.file_integration_revision
        }
    }

    /// `baseRev` or `baseRev-integRev`, the string compared between versions
    pub fn version_string(&self) -> String {
        match self.integration_revision() {
            "" => self.base_revision.clone(),
            integ => format!("{}-{}", self.base_revision, integ),
        }
    }

    /// Non-unique snapshot request (`1.0-SNAPSHOT/a-1.0-SNAPSHOT.jar`)
    pub fn is_non_unique(&self) -> bool {
        self.file_integration_revision == NON_UNIQUE_REVISION
    }

    /// Version is one of the latest-version placeholders
    pub fn has_placeholder(&self) -> bool {
        [
            &self.base_revision,
            &self.folder_integration_revision,
            &self.file_integration_revision,
        ]
        .iter()
        .any(|v| v.contains(RELEASE_PLACEHOLDER) || v.contains(INTEGRATION_PLACEHOLDER))
    }

    /// Same module and artifact kind, any version
    pub fn same_artifact(&self, other: &ModuleInfo) -> bool {
        self.organization == other.organization
            && self.module == other.module
            && self.classifier == other.classifier
            && self.ext == other.ext
            && self.kind == other.kind
    }
}

/// Release/integration classification of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Release,
    Integration,
    /// Not an artifact of this layout
    Unknown,
}

/// A compiled repository layout
#[derive(Debug, Clone)]
pub struct RepoLayout {
    name: String,
    artifact: LayoutPattern,
    descriptor: Option<LayoutPattern>,
}

impl RepoLayout {
    pub fn from_config(config: &LayoutConfig) -> DepotResult<Self> {
        if config.name.trim().is_empty() {
            return Err(DepotError::RepositoryConfig(
                "layout name must not be empty".to_string(),
            ));
        }
        let integration = IntegrationRegexes {
            folder: config.folder_integration_revision_regexp.clone(),
            file: config.file_integration_revision_regexp.clone(),
        };
        let descriptor = match &config.descriptor_path_pattern {
            Some(raw) if !raw.trim().is_empty() => {
                Some(LayoutPattern::new(raw, integration.clone())?)
            }
            _ => None,
        };

        Ok(Self {
            name: config.name.clone(),
            artifact: LayoutPattern::new(&config.artifact_path_pattern, integration)?,
            descriptor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Separate descriptor pattern (Ivy/Gradle `ivy-*.xml`)
    pub fn descriptor(&self) -> Option<&LayoutPattern> {
        self.descriptor.as_ref()
    }

    /// Parse a repository-relative path into its module coordinate
    pub fn parse(&self, path: &str) -> Option<ModuleInfo> {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.artifact
            .match_path(path)
            .and_then(|values| ModuleInfo::from_tokens(values, name))
            .or_else(|| {
                self.descriptor
                    .as_ref()?
                    .match_path(path)
                    .and_then(|values| ModuleInfo::from_tokens(values, name))
            })
    }

    /// Classify a file path. Checksum sidecars follow their target; metadata
    /// files follow the folder they sit in.
    pub fn version_kind(&self, path: &str) -> VersionKind {
        let target = split_checksum_path(path).map_or(path, |(target, _)| target);

        if let Some(info) = self.parse(target) {
            return if info.is_integration() {
                VersionKind::Integration
            } else {
                VersionKind::Release
            };
        }

        match target.rsplit_once('/') {
            Some((dir, name)) if is_metadata_name(name) => self.folder_kind(dir),
            _ => VersionKind::Unknown,
        }
    }

    /// Classify a folder path: only integration version folders are
    /// recognised, anything else is `Unknown`
    pub fn folder_kind(&self, dir: &str) -> VersionKind {
        let integration = |pattern: &LayoutPattern| {
            pattern
                .match_folder(dir)
                .and_then(|values| values.get(&Token::FolderItegRev).cloned())
                .is_some_and(|v| !v.is_empty())
        };
        if integration(&self.artifact) || self.descriptor.as_ref().is_some_and(integration) {
            VersionKind::Integration
        } else {
            VersionKind::Unknown
        }
    }
}

/// Maven 2 layout with unique (timestamped) snapshot files
pub fn maven_2_default() -> LayoutConfig {
    LayoutConfig {
        name: "maven-2-default".to_string(),
        artifact_path_pattern: "[orgPath]/[module]/[baseRev](-[folderItegRev])/[module]-[baseRev](-[fileItegRev])(-[classifier]).[ext]".to_string(),
        descriptor_path_pattern: None,
        folder_integration_revision_regexp: "SNAPSHOT".to_string(),
        file_integration_revision_regexp: "SNAPSHOT|(?:(?:[0-9]{8}.[0-9]{6})-(?:[0-9]+))"
            .to_string(),
    }
}

/// Default Ivy layout
pub fn ivy_default() -> LayoutConfig {
    LayoutConfig {
        name: "ivy-default".to_string(),
        artifact_path_pattern: "[org]/[module]/[baseRev](-[folderItegRev])/[type]s/[module](-[classifier])-[baseRev](-[fileItegRev]).[ext]".to_string(),
        descriptor_path_pattern: Some(
            "[org]/[module]/[baseRev](-[folderItegRev])/[type]s/ivy-[baseRev](-[fileItegRev]).xml"
                .to_string(),
        ),
        folder_integration_revision_regexp: "\\d{14}".to_string(),
        file_integration_revision_regexp: "\\d{14}".to_string(),
    }
}

/// Default Gradle cache layout
pub fn gradle_default() -> LayoutConfig {
    LayoutConfig {
        name: "gradle-default".to_string(),
        artifact_path_pattern: "[org]/[module]/[baseRev](-[folderItegRev])/[module]-[baseRev](-[fileItegRev])(-[classifier]).[ext]".to_string(),
        descriptor_path_pattern: Some(
            "[org]/[module]/ivy-[baseRev](-[fileItegRev]).xml".to_string(),
        ),
        folder_integration_revision_regexp: "\\d{14}".to_string(),
        file_integration_revision_regexp: "\\d{14}".to_string(),
    }
}

/// Layouts by name
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: HashMap<String, Arc<RepoLayout>>,
}

impl LayoutRegistry {
    /// Built-in layouts only
    pub fn builtin() -> DepotResult<Self> {
        Self::from_config(&[])
    }

    /// Built-in layouts plus `custom`; a custom layout may replace a built-in
    pub fn from_config(custom: &[LayoutConfig]) -> DepotResult<Self> {
        let mut layouts = HashMap::new();
        for config in [maven_2_default(), ivy_default(), gradle_default()]
            .iter()
            .chain(custom)
        {
            let layout = RepoLayout::from_config(config)?;
            layouts.insert(layout.name.clone(), Arc::new(layout));
        }
        Ok(Self { layouts })
    }

    pub fn get(&self, name: &str) -> DepotResult<Arc<RepoLayout>> {
        self.layouts
            .get(name)
            .cloned()
            .ok_or_else(|| DepotError::UnknownLayout(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layouts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
