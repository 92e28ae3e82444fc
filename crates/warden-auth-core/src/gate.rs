//! Authorization gate
//!
//! Two stages run for every call:
//!
//! 1. **Authenticate.** Public methods skip this. Everything else needs an
//!    `Authorization: Bearer <access token>` header. The token is validated
//!    and its jti checked against the blacklist. A blacklist lookup that
//!    fails lets the request through: access tokens are short-lived.
//! 2. **Authorize.** The method is looked up in [`METHOD_PERMISSIONS`].
//!    `SUPER_ADMIN` bypasses the lookup. Unmapped methods are denied.
//!    An empty permission means "authenticated only".
//!
//! The [`Principal`] is built from token claims alone.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use warden_types::Principal;

use crate::cache::AuthCache;
use crate::observability::{GateDecision, SharedMetrics};
use crate::token::TokenIssuer;
use crate::AuthError;

/// Methods callable without credentials
pub const PUBLIC_METHODS: &[&str] = &[
    "/iam.v1.AuthService/Login",
    "/iam.v1.AuthService/RefreshToken",
    "/iam.v1.AuthService/ForgotPassword",
    "/iam.v1.AuthService/VerifyResetOTP",
    "/iam.v1.AuthService/ResetPassword",
    "/iam.v1.AuthService/Logout",
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
    "/health",
    "/ready",
    "/metrics",
];

/// Prefix of server reflection methods, all public
pub const REFLECTION_PREFIX: &str = "/grpc.reflection.";

/// Method → required permission code; `""` means authenticated only
pub static METHOD_PERMISSIONS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        // Auth
        ("/iam.v1.AuthService/GetCurrentUser", ""),
        ("/iam.v1.AuthService/UpdatePassword", ""),
        ("/iam.v1.AuthService/Enable2FA", ""),
        ("/iam.v1.AuthService/Verify2FA", ""),
        ("/iam.v1.AuthService/Disable2FA", ""),
        // User
        ("/iam.v1.UserService/CreateUser", "iam.user.account.create"),
        ("/iam.v1.UserService/GetUser", "iam.user.account.view"),
        ("/iam.v1.UserService/GetUserDetail", "iam.user.account.view"),
        ("/iam.v1.UserService/UpdateUser", "iam.user.account.update"),
        ("/iam.v1.UserService/UpdateUserDetail", "iam.user.account.update"),
        ("/iam.v1.UserService/DeleteUser", "iam.user.account.delete"),
        ("/iam.v1.UserService/ListUsers", "iam.user.account.view"),
        ("/iam.v1.UserService/ExportUsers", "iam.user.account.export"),
        ("/iam.v1.UserService/ImportUsers", "iam.user.account.import"),
        ("/iam.v1.UserService/DownloadTemplate", "iam.user.account.view"),
        ("/iam.v1.UserService/AssignUserRoles", "iam.rbac.role.update"),
        ("/iam.v1.UserService/RemoveUserRoles", "iam.rbac.role.update"),
        ("/iam.v1.UserService/AssignUserPermissions", "iam.rbac.permission.update"),
        ("/iam.v1.UserService/RemoveUserPermissions", "iam.rbac.permission.update"),
        ("/iam.v1.UserService/GetUserRolesAndPermissions", "iam.user.account.view"),
        // Role
        ("/iam.v1.RoleService/CreateRole", "iam.rbac.role.create"),
        ("/iam.v1.RoleService/GetRole", "iam.rbac.role.view"),
        ("/iam.v1.RoleService/UpdateRole", "iam.rbac.role.update"),
        ("/iam.v1.RoleService/DeleteRole", "iam.rbac.role.delete"),
        ("/iam.v1.RoleService/ListRoles", "iam.rbac.role.view"),
        ("/iam.v1.RoleService/ExportRoles", "iam.rbac.role.export"),
        ("/iam.v1.RoleService/ImportRoles", "iam.rbac.role.import"),
        ("/iam.v1.RoleService/DownloadRoleTemplate", "iam.rbac.role.view"),
        ("/iam.v1.RoleService/AssignRolePermissions", "iam.rbac.role.update"),
        ("/iam.v1.RoleService/RemoveRolePermissions", "iam.rbac.role.update"),
        ("/iam.v1.RoleService/GetRolePermissions", "iam.rbac.role.view"),
        // Permission
        ("/iam.v1.PermissionService/CreatePermission", "iam.rbac.permission.create"),
        ("/iam.v1.PermissionService/GetPermission", "iam.rbac.permission.view"),
        ("/iam.v1.PermissionService/UpdatePermission", "iam.rbac.permission.update"),
        ("/iam.v1.PermissionService/DeletePermission", "iam.rbac.permission.delete"),
        ("/iam.v1.PermissionService/ListPermissions", "iam.rbac.permission.view"),
        ("/iam.v1.PermissionService/ExportPermissions", "iam.rbac.permission.export"),
        ("/iam.v1.PermissionService/ImportPermissions", "iam.rbac.permission.import"),
        ("/iam.v1.PermissionService/DownloadPermissionTemplate", "iam.rbac.permission.view"),
        ("/iam.v1.PermissionService/GetPermissionsByService", "iam.rbac.permission.view"),
        // Company
        ("/iam.v1.CompanyService/CreateCompany", "iam.organization.company.create"),
        ("/iam.v1.CompanyService/GetCompany", "iam.organization.company.view"),
        ("/iam.v1.CompanyService/UpdateCompany", "iam.organization.company.update"),
        ("/iam.v1.CompanyService/DeleteCompany", "iam.organization.company.delete"),
        ("/iam.v1.CompanyService/ListCompanies", "iam.organization.company.view"),
        ("/iam.v1.CompanyService/ExportCompanies", "iam.organization.company.export"),
        ("/iam.v1.CompanyService/ImportCompanies", "iam.organization.company.import"),
        ("/iam.v1.CompanyService/DownloadCompanyTemplate", "iam.organization.company.view"),
        // Division
        ("/iam.v1.DivisionService/CreateDivision", "iam.organization.division.create"),
        ("/iam.v1.DivisionService/GetDivision", "iam.organization.division.view"),
        ("/iam.v1.DivisionService/UpdateDivision", "iam.organization.division.update"),
        ("/iam.v1.DivisionService/DeleteDivision", "iam.organization.division.delete"),
        ("/iam.v1.DivisionService/ListDivisions", "iam.organization.division.view"),
        ("/iam.v1.DivisionService/ExportDivisions", "iam.organization.division.export"),
        ("/iam.v1.DivisionService/ImportDivisions", "iam.organization.division.import"),
        ("/iam.v1.DivisionService/DownloadDivisionTemplate", "iam.organization.division.view"),
        // Department
        ("/iam.v1.DepartmentService/CreateDepartment", "iam.organization.department.create"),
        ("/iam.v1.DepartmentService/GetDepartment", "iam.organization.department.view"),
        ("/iam.v1.DepartmentService/UpdateDepartment", "iam.organization.department.update"),
        ("/iam.v1.DepartmentService/DeleteDepartment", "iam.organization.department.delete"),
        ("/iam.v1.DepartmentService/ListDepartments", "iam.organization.department.view"),
        ("/iam.v1.DepartmentService/ExportDepartments", "iam.organization.department.export"),
        ("/iam.v1.DepartmentService/ImportDepartments", "iam.organization.department.import"),
        ("/iam.v1.DepartmentService/DownloadDepartmentTemplate", "iam.organization.department.view"),
        // Section
        ("/iam.v1.SectionService/CreateSection", "iam.organization.section.create"),
        ("/iam.v1.SectionService/GetSection", "iam.organization.section.view"),
        ("/iam.v1.SectionService/UpdateSection", "iam.organization.section.update"),
        ("/iam.v1.SectionService/DeleteSection", "iam.organization.section.delete"),
        ("/iam.v1.SectionService/ListSections", "iam.organization.section.view"),
        ("/iam.v1.SectionService/ExportSections", "iam.organization.section.export"),
        ("/iam.v1.SectionService/ImportSections", "iam.organization.section.import"),
        ("/iam.v1.SectionService/DownloadSectionTemplate", "iam.organization.section.view"),
        // Organization
        ("/iam.v1.OrganizationService/GetOrganizationTree", "iam.organization.company.view"),
        // Session
        ("/iam.v1.SessionService/GetCurrentSession", ""),
        ("/iam.v1.SessionService/RevokeSession", "iam.session.session.delete"),
        ("/iam.v1.SessionService/ListActiveSessions", "iam.session.session.view"),
        // Audit
        ("/iam.v1.AuditService/GetAuditLog", "iam.audit.log.view"),
        ("/iam.v1.AuditService/ListAuditLogs", "iam.audit.log.view"),
        ("/iam.v1.AuditService/ExportAuditLogs", "iam.audit.log.export"),
        ("/iam.v1.AuditService/GetAuditSummary", "iam.audit.log.view"),
        // Menu
        ("/iam.v1.MenuService/CreateMenu", "iam.menu.menu.create"),
        ("/iam.v1.MenuService/GetMenu", "iam.menu.menu.view"),
        ("/iam.v1.MenuService/UpdateMenu", "iam.menu.menu.update"),
        ("/iam.v1.MenuService/DeleteMenu", "iam.menu.menu.delete"),
        ("/iam.v1.MenuService/ListMenus", "iam.menu.menu.view"),
        ("/iam.v1.MenuService/ExportMenus", "iam.menu.menu.export"),
        ("/iam.v1.MenuService/ImportMenus", "iam.menu.menu.import"),
        ("/iam.v1.MenuService/DownloadMenuTemplate", "iam.menu.menu.view"),
        ("/iam.v1.MenuService/GetMenuTree", ""),
        ("/iam.v1.MenuService/GetFullMenuTree", "iam.menu.menu.view"),
        ("/iam.v1.MenuService/AssignMenuPermissions", "iam.menu.menu.update"),
        ("/iam.v1.MenuService/RemoveMenuPermissions", "iam.menu.menu.update"),
        ("/iam.v1.MenuService/GetMenuPermissions", "iam.menu.menu.view"),
        ("/iam.v1.MenuService/ReorderMenus", "iam.menu.menu.update"),
    ])
});

/// True if `method` needs no credentials
pub fn is_public_method(method: &str) -> bool {
    PUBLIC_METHODS.contains(&method) || method.starts_with(REFLECTION_PREFIX)
}

/// Permission required by `method`; `None` if the method is unmapped
pub fn required_permission(method: &str) -> Option<&'static str> {
    METHOD_PERMISSIONS.get(method).copied()
}

/// Extract the token from an `Authorization` header value
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or_else(|| AuthError::Unauthenticated("missing authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::Unauthenticated("invalid authorization format".into()))?;
    if token.is_empty() {
        return Err(AuthError::Unauthenticated("empty token".into()));
    }
    Ok(token)
}

/// Result of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Public method; no principal
    Public,
    Granted(Principal),
}

impl Access {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Public => None,
            Self::Granted(p) => Some(p),
        }
    }
}

/// Authenticates and authorizes calls by method name
#[derive(Clone)]
pub struct AuthorizationGate {
    issuer: Arc<TokenIssuer>,
    cache: Option<AuthCache>,
    metrics: SharedMetrics,
}

impl AuthorizationGate {
    pub fn new(issuer: Arc<TokenIssuer>, metrics: SharedMetrics) -> Self {
        Self {
            issuer,
            cache: None,
            metrics,
        }
    }

    /// Check access tokens against the blacklist in `cache`
    #[must_use]
    pub fn with_cache(mut self, cache: AuthCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run both stages for `method` with the raw `Authorization` header
    #[tracing::instrument(skip(self, authorization), level = "debug")]
    pub async fn check(&self, method: &str, authorization: Option<&str>) -> Result<Access, AuthError> {
        let label = metric_label(method);

        if is_public_method(method) {
            self.metrics.record_gate_decision(label, GateDecision::Public);
            return Ok(Access::Public);
        }

        let principal = match self.authenticate(authorization).await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(method, error = %e, "Authentication failed");
                self.metrics.record_gate_decision(label, GateDecision::Unauthenticated);
                return Err(e);
            }
        };

        match self.authorize(method, &principal) {
            Ok(()) => {
                self.metrics.record_gate_decision(label, GateDecision::Allowed);
                Ok(Access::Granted(principal))
            }
            Err(e) => {
                self.metrics.record_gate_decision(label, GateDecision::Denied);
                Err(e)
            }
        }
    }

    /// Stage one: bearer token to principal
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = parse_bearer(authorization)?;
        let claims = self.issuer.validate_access(token)?;

        if let Some(cache) = &self.cache {
            match cache.is_blacklisted(&claims.jti).await {
                Ok(true) => return Err(AuthError::TokenRevoked),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Blacklist check unavailable, allowing request");
                }
            }
        }

        Ok(claims.into_principal())
    }

    /// Stage two: permission table lookup
    pub fn authorize(&self, method: &str, principal: &Principal) -> Result<(), AuthError> {
        if principal.is_super_admin() {
            return Ok(());
        }

        let Some(required) = required_permission(method) else {
            tracing::warn!(method, user_id = %principal.user_id, "Unmapped method denied");
            return Err(AuthError::PermissionDenied("access denied".into()));
        };

        if required.is_empty() || principal.has_permission(required) {
            return Ok(());
        }

        tracing::debug!(
            method,
            required,
            user_id = %principal.user_id,
            "Permission denied"
        );
        Err(AuthError::PermissionDenied(required.to_string()))
    }
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("blacklist", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

// Unknown paths share one label to bound metric cardinality
fn metric_label(method: &str) -> &str {
    if is_public_method(method) || METHOD_PERMISSIONS.contains_key(method) {
        method
    } else {
        "unmapped"
    }
}
