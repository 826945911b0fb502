//! Role configuration and prompt assembly.
//!
//! The service does not run LLMs; it hands the host client a prompt per
//! role and keeps the per-role configuration (focus categories,
//! strictness) that shapes those prompts.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{ElenchusError, Result};
use crate::core::issues::IssueCategory;
use crate::core::session::Role;

/// How aggressively a role challenges the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Lenient,
    #[default]
    Balanced,
    Strict,
}

/// Per-role configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleConfig {
    /// Categories the role concentrates on; empty means all five.
    pub focus_categories: Vec<IssueCategory>,
    /// Challenge aggressiveness.
    pub strictness: Strictness,
    /// Require explicit evidence for every raised issue.
    pub require_evidence: bool,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            focus_categories: Vec::new(),
            strictness: Strictness::Balanced,
            require_evidence: true,
        }
    }
}

/// Summary of one role's configuration for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSummary {
    /// The role described.
    pub role: Role,
    /// Active configuration.
    pub config: RoleConfig,
    /// One-line description of the role's duty.
    pub description: String,
}

/// Registry of role configurations, mutable through `update_role_config`.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    verifier: RwLock<RoleConfig>,
    critic: RwLock<RoleConfig>,
    arbiter: RwLock<RoleConfig>,
}

impl RoleRegistry {
    /// Create a registry with default configurations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current configuration for a role.
    pub fn config(&self, role: Role) -> RoleConfig {
        match role {
            Role::Verifier => self.verifier.read().clone(),
            Role::Critic => self.critic.read().clone(),
            Role::Arbiter => self.arbiter.read().clone(),
        }
    }

    /// Replace a role's configuration.
    pub fn update(&self, role: Role, config: RoleConfig) -> Result<()> {
        if config.focus_categories.len() > IssueCategory::ALL.len() {
            return Err(ElenchusError::validation_field(
                "Duplicate focus categories",
                "focusCategories",
            ));
        }
        match role {
            Role::Verifier => *self.verifier.write() = config,
            Role::Critic => *self.critic.write() = config,
            Role::Arbiter => *self.arbiter.write() = config,
        }
        Ok(())
    }

    /// Summaries for all roles.
    pub fn summaries(&self) -> Vec<RoleSummary> {
        [Role::Verifier, Role::Critic, Role::Arbiter]
            .into_iter()
            .map(|role| RoleSummary {
                role,
                config: self.config(role),
                description: describe(role).to_string(),
            })
            .collect()
    }

    /// Assemble the prompt for a role with the session's requirements
    /// folded in.
    pub fn prompt(&self, role: Role, requirements: &str) -> String {
        let config = self.config(role);
        let focus = if config.focus_categories.is_empty() {
            IssueCategory::ALL
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            config
                .focus_categories
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let duty = match role {
            Role::Verifier => {
                "Examine the code and raise concrete issues. Each issue needs an id \
                 (e.g. SEC-01), a category, a severity, a summary, and a file:line \
                 location. Cover edge cases (empty, null, boundary, overflow) and \
                 state explicitly when an area is clean."
            }
            Role::Critic => {
                "Adjudicate each raised issue: VALID, INVALID, or PARTIAL, with \
                 reasoning grounded in the code. Challenge weak evidence and \
                 resolve issues whose verdict settles them."
            }
            Role::Arbiter => {
                "Break the deadlock between Verifier and Critic. Weigh both \
                 positions and issue a binding decision per disputed issue."
            }
        };
        let pressure = match config.strictness {
            Strictness::Lenient => "Prefer accepting reasonable code over nitpicking.",
            Strictness::Balanced => "Balance thoroughness against noise.",
            Strictness::Strict => "Treat every unproven assumption as a finding.",
        };
        let evidence = if config.require_evidence {
            "Every claim must cite the code it is grounded in."
        } else {
            "Evidence citations are encouraged but optional."
        };

        format!(
            "Role: {}\nFocus categories: {focus}\n\n{duty}\n{pressure}\n{evidence}\n\n\
             Requirements under review:\n{requirements}\n",
            role.as_str()
        )
    }
}

fn describe(role: Role) -> &'static str {
    match role {
        Role::Verifier => "Raises issues in the code under review",
        Role::Critic => "Adjudicates raised issues",
        Role::Arbiter => "Breaks deadlocks with binding decisions",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let registry = RoleRegistry::new();
        let config = registry.config(Role::Verifier);
        assert!(config.focus_categories.is_empty());
        assert_eq!(config.strictness, Strictness::Balanced);
    }

    #[test]
    fn test_update_and_prompt() {
        let registry = RoleRegistry::new();
        registry
            .update(
                Role::Verifier,
                RoleConfig {
                    focus_categories: vec![IssueCategory::Security],
                    strictness: Strictness::Strict,
                    require_evidence: true,
                },
            )
            .unwrap();

        let prompt = registry.prompt(Role::Verifier, "must validate inputs");
        assert!(prompt.contains("Focus categories: SECURITY"));
        assert!(prompt.contains("must validate inputs"));
        assert!(prompt.contains("unproven assumption"));
    }

    #[test]
    fn test_prompt_defaults_to_all_categories() {
        let registry = RoleRegistry::new();
        let prompt = registry.prompt(Role::Critic, "reqs");
        for category in IssueCategory::ALL {
            assert!(prompt.contains(category.as_str()));
        }
    }

    #[test]
    fn test_summaries_cover_all_roles() {
        let registry = RoleRegistry::new();
        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].role, Role::Verifier);
    }
}
