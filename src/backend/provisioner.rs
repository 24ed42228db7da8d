use std::{collections::HashMap, fmt::Display};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    config::{BackendsConfig, ConfigError, check_template},
    mapi::{FolderId, MapiError},
};

/// What kind of content a backend root holds, derived from its container
/// class.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    Mail,
    Calendar,
    Contacts,
    Tasks,
    Notes,
    Journal,
    Fallback,
}

impl ContainerRole {
    pub const ALL: [ContainerRole; 7] = [
        Self::Mail,
        Self::Calendar,
        Self::Contacts,
        Self::Tasks,
        Self::Notes,
        Self::Journal,
        Self::Fallback,
    ];

    /// Matches the class and its dotted subclasses, so `IPF.Note.Custom`
    /// still holds mail.
    pub fn from_container_class(class: &str) -> Self {
        let is = |base: &str| {
            class.eq_ignore_ascii_case(base)
                || class
                    .get(..=base.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&format!("{base}.")))
        };
        if is("IPF.Note") {
            Self::Mail
        } else if is("IPF.Appointment") {
            Self::Calendar
        } else if is("IPF.Contact") {
            Self::Contacts
        } else if is("IPF.Task") {
            Self::Tasks
        } else if is("IPF.StickyNote") {
            Self::Notes
        } else if is("IPF.Journal") {
            Self::Journal
        } else {
            Self::Fallback
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Calendar => "calendar",
            Self::Contacts => "contacts",
            Self::Tasks => "tasks",
            Self::Notes => "notes",
            Self::Journal => "journal",
            Self::Fallback => "fallback",
        }
    }
}

impl Display for ContainerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hands out the backend URI a new backend root gets provisioned at.
pub trait Provisioner: Send + Sync {
    fn backend_uri(
        &self,
        owner: &str,
        role: ContainerRole,
        fid: FolderId,
    ) -> Result<String, MapiError>;
}

/// Builds URIs from per-role templates. `{owner}`, `{role}` and `{fid}` are
/// substituted; the result always ends with a slash. Every template must
/// contain `{fid}`, so no two roots share a URI.
#[derive(Debug, Clone)]
pub struct TemplateProvisioner {
    templates: HashMap<ContainerRole, String>,
    fallback: String,
}

impl TemplateProvisioner {
    pub fn new(fallback: impl Into<String>) -> Result<Self, ConfigError> {
        let fallback = fallback.into();
        check_template(ContainerRole::Fallback, &fallback)?;
        Ok(Self {
            templates: HashMap::new(),
            fallback,
        })
    }

    pub fn with_template(
        mut self,
        role: ContainerRole,
        template: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let template = template.into();
        check_template(role, &template)?;
        self.templates.insert(role, template);
        Ok(self)
    }

    pub fn from_config(config: &BackendsConfig) -> Result<Self, ConfigError> {
        ContainerRole::ALL
            .into_iter()
            .filter_map(|role| config.template(role).map(|template| (role, template)))
            .try_fold(Self::new(config.fallback())?, |provisioner, (role, template)| {
                provisioner.with_template(role, template)
            })
    }
}

impl Provisioner for TemplateProvisioner {
    fn backend_uri(
        &self,
        owner: &str,
        role: ContainerRole,
        fid: FolderId,
    ) -> Result<String, MapiError> {
        if owner.is_empty() || owner.contains('/') {
            return Err(MapiError::InvalidParameter);
        }
        let template = self.templates.get(&role).unwrap_or(&self.fallback);
        let mut uri = template
            .replace("{owner}", owner)
            .replace("{role}", role.as_str())
            .replace("{fid}", &format!("{:x}", u64::from(fid)));
        if !uri.ends_with('/') {
            uri.push('/');
        }
        trace!("provisioned {uri} for {role} folder {fid} of {owner}");
        Ok(uri)
    }
}
