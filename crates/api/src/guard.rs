//! Route guard
//!
//! Pure evaluator deciding, per navigation, whether to render the requested
//! content or redirect. Checks run in a fixed precedence order and the first
//! match wins:
//!
//! 1. public route → render
//! 2. no session → login (carrying the attempted path)
//! 3. session on an auth-only route → forward past the auth form
//! 4. email not verified → login with a verify notice
//! 5. subscription-gated route while expired → subscription page
//! 6. no organization → organization setup
//! 7. organization but welcome unseen → welcome page
//! 8. role requirement unmet → dashboard with an access-denied notice
//! 9. render
//!
//! Profile and organization lookups feed in through `ProfileLookup`; a failed
//! lookup degrades to the permissive setup path rather than locking the user
//! out.

use serde::Serialize;
use uuid::Uuid;

use crewdesk_shared::{UserProfile, UserRole};

/// Result of loading the caller's profile row
#[derive(Debug, Clone)]
pub enum ProfileLookup {
    Found(UserProfile),
    NotFound,
    /// The lookup itself errored; treated as needs-setup, never a lock-out
    Failed,
}

/// The authenticated session as the guard sees it
#[derive(Debug, Clone)]
pub struct GuardSession {
    pub user_id: Uuid,
    pub email_verified: bool,
}

/// User-visible reason attached to a policy redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardNotice {
    VerifyEmail,
    TrialExpired,
    AccessDenied,
}

/// Guard decision for a navigation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuardOutcome {
    Render,
    Redirect {
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        notice: Option<GuardNotice>,
    },
}

impl GuardOutcome {
    fn redirect(to: &str) -> Self {
        Self::Redirect {
            to: to.to_string(),
            return_to: None,
            notice: None,
        }
    }

    fn redirect_with_notice(to: &str, notice: GuardNotice) -> Self {
        Self::Redirect {
            to: to.to_string(),
            return_to: None,
            notice: Some(notice),
        }
    }
}

/// A path prefix that only users holding one of the listed roles may enter
#[derive(Debug, Clone)]
pub struct RoleRule {
    pub prefix: String,
    pub roles: Vec<UserRole>,
}

/// Static route classification the guard evaluates against
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    /// Rendered for everyone, session or not
    pub public_paths: Vec<String>,
    /// Auth forms; a signed-in user gets forwarded past them
    pub auth_paths: Vec<String>,
    /// Prefixes that require a live trial or paid subscription
    pub subscription_paths: Vec<String>,
    /// Where expired users manage their subscription
    pub subscription_page: String,
    pub role_rules: Vec<RoleRule>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/".to_string(),
                "/login".to_string(),
                "/register".to_string(),
                "/pricing".to_string(),
                "/health".to_string(),
            ],
            auth_paths: vec!["/login".to_string(), "/register".to_string()],
            subscription_paths: vec![
                "/dashboard".to_string(),
                "/hr".to_string(),
                "/finance".to_string(),
                "/reports".to_string(),
            ],
            subscription_page: "/subscription".to_string(),
            role_rules: vec![RoleRule {
                prefix: "/settings/organization".to_string(),
                roles: vec![UserRole::SuperAdmin, UserRole::Admin],
            }],
        }
    }
}

impl RoutePolicy {
    fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| {
            if p == "/" {
                path == "/"
            } else {
                path_matches(p, path)
            }
        })
    }

    fn is_auth_route(&self, path: &str) -> bool {
        self.auth_paths.iter().any(|p| path_matches(p, path))
    }

    fn requires_subscription(&self, path: &str) -> bool {
        self.subscription_paths.iter().any(|p| path_matches(p, path))
    }

    fn required_roles(&self, path: &str) -> Option<&[UserRole]> {
        self.role_rules
            .iter()
            .find(|rule| path_matches(&rule.prefix, path))
            .map(|rule| rule.roles.as_slice())
    }
}

/// Prefix match on path segments: "/hr" matches "/hr" and "/hr/employees",
/// never "/hrx"
fn path_matches(prefix: &str, path: &str) -> bool {
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Everything the guard needs to decide one navigation
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub path: String,
    pub session: Option<GuardSession>,
    pub profile: ProfileLookup,
    /// True when the trial has lapsed and no paid subscription covers the org
    pub subscription_expired: bool,
}

/// Evaluate the guard for one navigation
pub fn evaluate(ctx: &GuardContext, policy: &RoutePolicy) -> GuardOutcome {
    // 1. Public routes render unconditionally
    if policy.is_public(&ctx.path) && !(ctx.session.is_some() && policy.is_auth_route(&ctx.path)) {
        return GuardOutcome::Render;
    }

    // 2. No session: to login, remembering where the user was headed
    let Some(session) = &ctx.session else {
        return GuardOutcome::Redirect {
            to: "/login".to_string(),
            return_to: Some(ctx.path.clone()),
            notice: None,
        };
    };

    // 3. Signed in but on an auth form: forward by profile completeness
    if policy.is_auth_route(&ctx.path) {
        return GuardOutcome::redirect(forward_destination(&ctx.profile));
    }

    // 4. Unverified email gates everything non-public
    if !effective_email_verified(session, &ctx.profile) {
        return GuardOutcome::redirect_with_notice("/login", GuardNotice::VerifyEmail);
    }

    // 5. Expired subscription gates the product surface, but never the
    //    subscription-management page itself
    if policy.requires_subscription(&ctx.path)
        && ctx.subscription_expired
        && !path_matches(&policy.subscription_page, &ctx.path)
    {
        return GuardOutcome::redirect_with_notice(
            &policy.subscription_page,
            GuardNotice::TrialExpired,
        );
    }

    // 6. No organization: into setup
    if !has_organization(&ctx.profile) {
        if path_matches("/organizations", &ctx.path) {
            return GuardOutcome::Render;
        }
        return GuardOutcome::redirect("/organizations");
    }

    // 7. Welcome page takes precedence over the product surface
    if !has_seen_welcome(&ctx.profile) && !path_matches("/welcome", &ctx.path) {
        return GuardOutcome::redirect("/welcome");
    }

    // 8. Role requirements
    if let Some(required) = policy.required_roles(&ctx.path) {
        let holds_role = match &ctx.profile {
            ProfileLookup::Found(profile) => required.contains(&profile.role),
            _ => false,
        };
        if !holds_role {
            return GuardOutcome::redirect_with_notice("/dashboard", GuardNotice::AccessDenied);
        }
    }

    // 9. Render
    GuardOutcome::Render
}

/// Where a signed-in user lands when skipping an auth form
fn forward_destination(profile: &ProfileLookup) -> &'static str {
    match profile {
        ProfileLookup::Found(p) if p.org_id.is_none() => "/organizations",
        ProfileLookup::Found(p) if !p.has_seen_welcome => "/welcome",
        ProfileLookup::Found(_) => "/dashboard",
        ProfileLookup::NotFound => "/organizations",
        ProfileLookup::Failed => {
            tracing::warn!("Profile lookup failed; forwarding into setup");
            "/organizations"
        }
    }
}

/// The profile row is the final word on verification when present
fn effective_email_verified(session: &GuardSession, profile: &ProfileLookup) -> bool {
    match profile {
        ProfileLookup::Found(p) => p.email_verified,
        _ => session.email_verified,
    }
}

fn has_organization(profile: &ProfileLookup) -> bool {
    match profile {
        ProfileLookup::Found(p) => p.org_id.is_some(),
        ProfileLookup::NotFound => false,
        ProfileLookup::Failed => {
            // Permissive setup: continue as verified-with-no-organization
            tracing::warn!("Profile lookup failed; degrading to setup flow");
            false
        }
    }
}

fn has_seen_welcome(profile: &ProfileLookup) -> bool {
    match profile {
        ProfileLookup::Found(p) => p.has_seen_welcome,
        _ => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn profile(org_id: Option<Uuid>, role: UserRole, has_seen_welcome: bool) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            org_id,
            email: "user@example.com".to_string(),
            role,
            has_seen_welcome,
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn member() -> ProfileLookup {
        ProfileLookup::Found(profile(Some(Uuid::new_v4()), UserRole::Employee, true))
    }

    fn session() -> GuardSession {
        GuardSession {
            user_id: Uuid::new_v4(),
            email_verified: true,
        }
    }

    fn ctx(path: &str, session: Option<GuardSession>, profile: ProfileLookup) -> GuardContext {
        GuardContext {
            path: path.to_string(),
            session,
            profile,
            subscription_expired: false,
        }
    }

    fn redirect_to(outcome: &GuardOutcome) -> Option<&str> {
        match outcome {
            GuardOutcome::Redirect { to, .. } => Some(to.as_str()),
            GuardOutcome::Render => None,
        }
    }

    // =========================================================================
    // Step 1: public routes render for everyone
    // =========================================================================
    #[test]
    fn test_public_route_renders_without_session() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(&ctx("/pricing", None, ProfileLookup::NotFound), &policy);
        assert_eq!(outcome, GuardOutcome::Render);

        let outcome = evaluate(&ctx("/", None, ProfileLookup::NotFound), &policy);
        assert_eq!(outcome, GuardOutcome::Render);
    }

    // =========================================================================
    // Step 2: missing session redirects to login with the return path
    // =========================================================================
    #[test]
    fn test_no_session_redirects_to_login_with_return_path() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(
            &ctx("/hr/employees", None, ProfileLookup::NotFound),
            &policy,
        );
        assert_eq!(
            outcome,
            GuardOutcome::Redirect {
                to: "/login".to_string(),
                return_to: Some("/hr/employees".to_string()),
                notice: None,
            }
        );
    }

    // =========================================================================
    // Step 3: signed-in users are forwarded past auth forms
    // =========================================================================
    #[test]
    fn test_auth_route_forwards_complete_profile_to_dashboard() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(&ctx("/login", Some(session()), member()), &policy);
        assert_eq!(redirect_to(&outcome), Some("/dashboard"));
    }

    #[test]
    fn test_auth_route_forwards_orgless_profile_to_setup() {
        let policy = RoutePolicy::default();
        let lookup = ProfileLookup::Found(profile(None, UserRole::Employee, false));
        let outcome = evaluate(&ctx("/register", Some(session()), lookup), &policy);
        assert_eq!(redirect_to(&outcome), Some("/organizations"));
    }

    #[test]
    fn test_auth_route_forwards_unwelcomed_profile_to_welcome() {
        let policy = RoutePolicy::default();
        let lookup = ProfileLookup::Found(profile(Some(Uuid::new_v4()), UserRole::Admin, false));
        let outcome = evaluate(&ctx("/login", Some(session()), lookup), &policy);
        assert_eq!(redirect_to(&outcome), Some("/welcome"));
    }

    // =========================================================================
    // Step 4: unverified email bounces to login with a notice
    // =========================================================================
    #[test]
    fn test_unverified_email_redirects_with_notice() {
        let policy = RoutePolicy::default();
        let mut p = profile(Some(Uuid::new_v4()), UserRole::Employee, true);
        p.email_verified = false;
        let outcome = evaluate(
            &ctx("/dashboard", Some(session()), ProfileLookup::Found(p)),
            &policy,
        );
        assert_eq!(
            outcome,
            GuardOutcome::Redirect {
                to: "/login".to_string(),
                return_to: None,
                notice: Some(GuardNotice::VerifyEmail),
            }
        );
    }

    // =========================================================================
    // Step 5: expired subscription gates product routes, not the billing page
    // =========================================================================
    #[test]
    fn test_expired_subscription_redirects_to_subscription_page() {
        let policy = RoutePolicy::default();
        let mut context = ctx("/dashboard", Some(session()), member());
        context.subscription_expired = true;
        let outcome = evaluate(&context, &policy);
        assert_eq!(
            outcome,
            GuardOutcome::Redirect {
                to: "/subscription".to_string(),
                return_to: None,
                notice: Some(GuardNotice::TrialExpired),
            }
        );
    }

    #[test]
    fn test_expired_subscription_still_reaches_ungated_routes() {
        let policy = RoutePolicy::default();
        let mut context = ctx("/subscription", Some(session()), member());
        context.subscription_expired = true;
        assert_eq!(evaluate(&context, &policy), GuardOutcome::Render);
    }

    // =========================================================================
    // Step 6: no organization always means setup (scenario: verified email,
    // no org, navigating to /dashboard)
    // =========================================================================
    #[test]
    fn test_verified_user_without_org_redirected_to_setup() {
        let policy = RoutePolicy::default();
        let lookup = ProfileLookup::Found(profile(None, UserRole::Employee, false));
        let outcome = evaluate(&ctx("/dashboard", Some(session()), lookup), &policy);
        assert_eq!(redirect_to(&outcome), Some("/organizations"));
    }

    #[test]
    fn test_missing_profile_redirected_to_setup() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(
            &ctx("/hr", Some(session()), ProfileLookup::NotFound),
            &policy,
        );
        assert_eq!(redirect_to(&outcome), Some("/organizations"));
    }

    #[test]
    fn test_setup_route_renders_for_orgless_user() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(
            &ctx("/organizations", Some(session()), ProfileLookup::NotFound),
            &policy,
        );
        assert_eq!(outcome, GuardOutcome::Render);
    }

    // =========================================================================
    // Failed lookup degrades to setup, never a lock-out
    // =========================================================================
    #[test]
    fn test_failed_lookup_degrades_to_setup() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(
            &ctx("/dashboard", Some(session()), ProfileLookup::Failed),
            &policy,
        );
        assert_eq!(redirect_to(&outcome), Some("/organizations"));

        let outcome = evaluate(
            &ctx("/organizations", Some(session()), ProfileLookup::Failed),
            &policy,
        );
        assert_eq!(outcome, GuardOutcome::Render);
    }

    // =========================================================================
    // Step 7: welcome takes precedence over the dashboard
    // =========================================================================
    #[test]
    fn test_welcome_precedes_dashboard() {
        let policy = RoutePolicy::default();
        let lookup = ProfileLookup::Found(profile(Some(Uuid::new_v4()), UserRole::Employee, false));
        let outcome = evaluate(&ctx("/dashboard", Some(session()), lookup), &policy);
        assert_eq!(redirect_to(&outcome), Some("/welcome"));
    }

    #[test]
    fn test_welcome_page_itself_renders() {
        let policy = RoutePolicy::default();
        let lookup = ProfileLookup::Found(profile(Some(Uuid::new_v4()), UserRole::Employee, false));
        let outcome = evaluate(&ctx("/welcome", Some(session()), lookup), &policy);
        assert_eq!(outcome, GuardOutcome::Render);
    }

    // =========================================================================
    // Step 8: role rules
    // =========================================================================
    #[test]
    fn test_role_rule_denies_employee() {
        let policy = RoutePolicy::default();
        let outcome = evaluate(
            &ctx("/settings/organization", Some(session()), member()),
            &policy,
        );
        assert_eq!(
            outcome,
            GuardOutcome::Redirect {
                to: "/dashboard".to_string(),
                return_to: None,
                notice: Some(GuardNotice::AccessDenied),
            }
        );
    }

    #[test]
    fn test_role_rule_admits_admin() {
        let policy = RoutePolicy::default();
        let lookup = ProfileLookup::Found(profile(Some(Uuid::new_v4()), UserRole::Admin, true));
        let outcome = evaluate(
            &ctx("/settings/organization", Some(session()), lookup),
            &policy,
        );
        assert_eq!(outcome, GuardOutcome::Render);
    }

    // =========================================================================
    // Step 9: the happy path renders
    // =========================================================================
    #[test]
    fn test_complete_member_renders_product_routes() {
        let policy = RoutePolicy::default();
        for path in ["/dashboard", "/hr/employees", "/finance/payroll"] {
            let outcome = evaluate(&ctx(path, Some(session()), member()), &policy);
            assert_eq!(outcome, GuardOutcome::Render, "path {path} should render");
        }
    }

    // =========================================================================
    // Path matching is segment-aware
    // =========================================================================
    #[test]
    fn test_path_matching_respects_segments() {
        assert!(path_matches("/hr", "/hr"));
        assert!(path_matches("/hr", "/hr/employees"));
        assert!(!path_matches("/hr", "/hrx"));
        assert!(!path_matches("/hr", "/h"));
    }

    // =========================================================================
    // Outcome serialization shape
    // =========================================================================
    #[test]
    fn test_outcome_serialization() {
        let rendered = serde_json::to_value(GuardOutcome::Render).unwrap();
        assert_eq!(rendered, serde_json::json!({"action": "render"}));

        let redirected = serde_json::to_value(GuardOutcome::Redirect {
            to: "/subscription".to_string(),
            return_to: None,
            notice: Some(GuardNotice::TrialExpired),
        })
        .unwrap();
        assert_eq!(
            redirected,
            serde_json::json!({
                "action": "redirect",
                "to": "/subscription",
                "notice": "trial_expired",
            })
        );
    }
}
