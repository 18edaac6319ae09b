//! Project-scoped RBAC: resources, actions, policies, and roles.

use serde::{Deserialize, Serialize};

/// Name of the built-in role granted full access.
pub const BUILTIN_ROLE_ADMIN: &str = "Admin";
/// Name of the built-in role for day-to-day operations.
pub const BUILTIN_ROLE_EDITOR: &str = "Editor";
/// Name of the built-in read-only role.
pub const BUILTIN_ROLE_VIEWER: &str = "Viewer";

/// Resource kinds a policy can grant access to. `All` is the wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRBACResource {
    All,
    Application,
    Deployment,
    DeploymentChain,
    Event,
    Piped,
    Project,
    ApiKey,
    Insight,
}

/// Actions a policy can grant. `All` is the wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRBACAction {
    All,
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// A grant over a set of resources crossed with a set of actions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRBACPolicy {
    pub resources: Vec<ProjectRBACResource>,
    pub actions: Vec<ProjectRBACAction>,
}

impl ProjectRBACPolicy {
    /// A policy grants `(resource, action)` when the resource matches or the
    /// policy lists the resource wildcard, and likewise for the action.
    #[must_use]
    pub fn has_permission(&self, resource: ProjectRBACResource, action: ProjectRBACAction) -> bool {
        let resource_granted = self
            .resources
            .iter()
            .any(|r| *r == resource || *r == ProjectRBACResource::All);
        let action_granted = self
            .actions
            .iter()
            .any(|a| *a == action || *a == ProjectRBACAction::All);
        resource_granted && action_granted
    }
}

/// A named bundle of policies. Built-in roles are immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRBACRole {
    pub name: String,
    #[serde(default)]
    pub policies: Vec<ProjectRBACPolicy>,
    #[serde(default)]
    pub is_builtin: bool,
}

impl ProjectRBACRole {
    /// A role grants `(resource, action)` when any of its policies does.
    #[must_use]
    pub fn has_permission(&self, resource: ProjectRBACResource, action: ProjectRBACAction) -> bool {
        self.policies
            .iter()
            .any(|policy| policy.has_permission(resource, action))
    }
}

/// Whether `name` is one of the three reserved built-in role names.
#[must_use]
pub fn is_builtin_role_name(name: &str) -> bool {
    name == BUILTIN_ROLE_ADMIN || name == BUILTIN_ROLE_EDITOR || name == BUILTIN_ROLE_VIEWER
}

/// The three built-in roles with their fixed policies.
#[must_use]
pub fn builtin_rbac_roles() -> Vec<ProjectRBACRole> {
    use ProjectRBACAction as Action;
    use ProjectRBACResource as Resource;

    vec![
        ProjectRBACRole {
            name: BUILTIN_ROLE_ADMIN.to_string(),
            policies: vec![ProjectRBACPolicy {
                resources: vec![Resource::All],
                actions: vec![Action::All],
            }],
            is_builtin: true,
        },
        ProjectRBACRole {
            name: BUILTIN_ROLE_EDITOR.to_string(),
            policies: vec![
                ProjectRBACPolicy {
                    resources: vec![Resource::Application, Resource::Deployment],
                    actions: vec![Action::All],
                },
                ProjectRBACPolicy {
                    resources: vec![Resource::Piped],
                    actions: vec![Action::Get, Action::List],
                },
                ProjectRBACPolicy {
                    resources: vec![Resource::Project, Resource::Insight],
                    actions: vec![Action::Get],
                },
                ProjectRBACPolicy {
                    resources: vec![Resource::Event],
                    actions: vec![Action::List],
                },
            ],
            is_builtin: true,
        },
        ProjectRBACRole {
            name: BUILTIN_ROLE_VIEWER.to_string(),
            policies: vec![
                ProjectRBACPolicy {
                    resources: vec![Resource::Application, Resource::Deployment, Resource::Piped],
                    actions: vec![Action::Get, Action::List],
                },
                ProjectRBACPolicy {
                    resources: vec![Resource::Project, Resource::Insight],
                    actions: vec![Action::Get],
                },
                ProjectRBACPolicy {
                    resources: vec![Resource::Event],
                    actions: vec![Action::List],
                },
            ],
            is_builtin: true,
        },
    ]
}

/// Project-scoped role claim carried inside session tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub project_id: String,
    #[serde(default)]
    pub project_rbac_roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectRBACAction as Action;
    use ProjectRBACResource as Resource;

    fn policy(resources: Vec<Resource>, actions: Vec<Action>) -> ProjectRBACPolicy {
        ProjectRBACPolicy { resources, actions }
    }

    #[test]
    fn policy_requires_both_sides_to_match() {
        let p = policy(vec![Resource::Application], vec![Action::Get]);
        assert!(p.has_permission(Resource::Application, Action::Get));
        assert!(!p.has_permission(Resource::Application, Action::Delete));
        assert!(!p.has_permission(Resource::Deployment, Action::Get));
    }

    #[test]
    fn policy_wildcards_match_everything_on_their_side() {
        let resources = [
            Resource::All,
            Resource::Application,
            Resource::Deployment,
            Resource::DeploymentChain,
            Resource::Event,
            Resource::Piped,
            Resource::Project,
            Resource::ApiKey,
            Resource::Insight,
        ];
        let actions = [
            Action::All,
            Action::Get,
            Action::List,
            Action::Create,
            Action::Update,
            Action::Delete,
        ];

        let all = policy(vec![Resource::All], vec![Action::All]);
        for resource in resources {
            for action in actions {
                assert!(all.has_permission(resource, action));
            }
        }

        let resource_wildcard = policy(vec![Resource::All], vec![Action::Get]);
        for resource in resources {
            assert!(resource_wildcard.has_permission(resource, Action::Get));
            assert!(!resource_wildcard.has_permission(resource, Action::Delete));
        }

        let action_wildcard = policy(vec![Resource::Piped], vec![Action::All]);
        for action in actions {
            assert!(action_wildcard.has_permission(Resource::Piped, action));
            assert!(!action_wildcard.has_permission(Resource::Event, action));
        }
    }

    #[test]
    fn role_grants_when_any_policy_grants() {
        let role = ProjectRBACRole {
            name: "custom".to_string(),
            policies: vec![
                policy(vec![Resource::Application], vec![Action::Get]),
                policy(vec![Resource::Event], vec![Action::List]),
            ],
            is_builtin: false,
        };
        assert!(role.has_permission(Resource::Application, Action::Get));
        assert!(role.has_permission(Resource::Event, Action::List));
        assert!(!role.has_permission(Resource::Event, Action::Get));
    }

    #[test]
    fn builtin_admin_grants_everything() {
        let roles = builtin_rbac_roles();
        let admin = &roles[0];
        assert_eq!(admin.name, BUILTIN_ROLE_ADMIN);
        assert!(admin.is_builtin);
        assert!(admin.has_permission(Resource::ApiKey, Action::Delete));
        assert!(admin.has_permission(Resource::Insight, Action::Create));
    }

    #[test]
    fn builtin_editor_matches_fixed_policies() {
        let roles = builtin_rbac_roles();
        let editor = &roles[1];
        assert_eq!(editor.name, BUILTIN_ROLE_EDITOR);
        assert!(editor.has_permission(Resource::Application, Action::Delete));
        assert!(editor.has_permission(Resource::Deployment, Action::Create));
        assert!(editor.has_permission(Resource::Piped, Action::List));
        assert!(!editor.has_permission(Resource::Piped, Action::Update));
        assert!(editor.has_permission(Resource::Project, Action::Get));
        assert!(!editor.has_permission(Resource::Project, Action::Update));
        assert!(editor.has_permission(Resource::Event, Action::List));
        assert!(!editor.has_permission(Resource::Event, Action::Get));
        assert!(!editor.has_permission(Resource::ApiKey, Action::Get));
    }

    #[test]
    fn builtin_viewer_is_read_only() {
        let roles = builtin_rbac_roles();
        let viewer = &roles[2];
        assert_eq!(viewer.name, BUILTIN_ROLE_VIEWER);
        assert!(viewer.has_permission(Resource::Application, Action::Get));
        assert!(viewer.has_permission(Resource::Deployment, Action::List));
        assert!(viewer.has_permission(Resource::Piped, Action::Get));
        assert!(!viewer.has_permission(Resource::Application, Action::Update));
        assert!(!viewer.has_permission(Resource::Deployment, Action::Delete));
        assert!(viewer.has_permission(Resource::Insight, Action::Get));
        assert!(viewer.has_permission(Resource::Event, Action::List));
        assert!(!viewer.has_permission(Resource::Event, Action::Get));
    }

    #[test]
    fn builtin_role_names_are_reserved() {
        assert!(is_builtin_role_name("Admin"));
        assert!(is_builtin_role_name("Editor"));
        assert!(is_builtin_role_name("Viewer"));
        assert!(!is_builtin_role_name("admin"));
        assert!(!is_builtin_role_name("Operator"));
    }

    #[test]
    fn role_claim_serializes_with_wire_names() {
        let role = Role {
            project_id: "p1".to_string(),
            project_rbac_roles: vec![BUILTIN_ROLE_ADMIN.to_string()],
        };
        let value = serde_json::to_value(&role).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"projectId": "p1", "projectRbacRoles": ["Admin"]})
        );
    }
}
