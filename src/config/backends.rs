use serde::Deserialize;

use crate::{backend::ContainerRole, config::ConfigError};

/// Fails unless `template` yields a distinct URI per folder.
pub(crate) fn check_template(role: ContainerRole, template: &str) -> Result<(), ConfigError> {
    if template.contains("{fid}") {
        Ok(())
    } else {
        Err(ConfigError::SharedTemplate {
            role,
            template: template.to_string(),
        })
    }
}

/// URI templates new backend roots get provisioned from, one per container
/// role with a shared fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "fallback")]
    fallback: String,
    mail: Option<String>,
    calendar: Option<String>,
    contacts: Option<String>,
    tasks: Option<String>,
    notes: Option<String>,
    journal: Option<String>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            fallback: fallback(),
            mail: None,
            calendar: None,
            contacts: None,
            tasks: None,
            notes: None,
            journal: None,
        }
    }
}

impl BackendsConfig {
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn template(&self, role: ContainerRole) -> Option<&str> {
        match role {
            ContainerRole::Mail => self.mail.as_deref(),
            ContainerRole::Calendar => self.calendar.as_deref(),
            ContainerRole::Contacts => self.contacts.as_deref(),
            ContainerRole::Tasks => self.tasks.as_deref(),
            ContainerRole::Notes => self.notes.as_deref(),
            ContainerRole::Journal => self.journal.as_deref(),
            ContainerRole::Fallback => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_template(ContainerRole::Fallback, &self.fallback)?;
        for role in ContainerRole::ALL {
            if let Some(template) = self.template(role) {
                check_template(role, template)?;
            }
        }
        Ok(())
    }
}

fn fallback() -> String {
    "memory://{owner}/{role}/{fid}/".to_string()
}
